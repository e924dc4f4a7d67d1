use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{CacheEntry, CacheStore, NewCacheEntry, RawCacheEntry};
use crate::cache::error::StoreError;
use crate::cache::fingerprint::Fingerprint;

const KEY_PREFIX: &str = "resume_parse";
/// Upper bound on any single hot tier round trip. A slow hot tier must not
/// make the cache slower than the primary it fronts.
const HOT_OP_TIMEOUT: Duration = Duration::from_millis(250);
/// Written over a key by every mutation. Reads treat it as a miss and
/// backfills cannot replace it.
const TOMBSTONE: &str = "~";
const TOMBSTONE_TTL: Duration = Duration::from_secs(30);
/// Backfills are dropped when the primary read is older than this, so a
/// backfill always lands while a tombstone written after that read is live.
const BACKFILL_WINDOW: Duration = Duration::from_secs(10);

pub fn hot_key(fingerprint: &Fingerprint) -> String {
    format!("{KEY_PREFIX}:{fingerprint}")
}

/// Key/value tier with per-key expiry.
#[async_trait]
pub trait HotTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` under every key, replacing what is there.
    async fn set(&self, keys: &[String], value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Writes only when the key is absent. Returns whether it wrote.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;
}

/// Redis behind a reconnecting, multiplexed connection shared by all calls.
#[derive(Clone)]
pub struct RedisHotTier {
    conn: ConnectionManager,
}

impl RedisHotTier {
    pub async fn connect(client: redis::Client) -> Result<Self, StoreError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl HotTier for RedisHotTier {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(raw)
    }

    async fn set(&self, keys: &[String], value: &str, ttl: Duration) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("PX")
                .arg(millis(ttl))
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl))
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }
}

/// Hot tier over a durable primary store.
///
/// The primary is the source of truth: scans are answered by it, and reads
/// that miss the hot tier copy the primary's answer back with a
/// write-if-absent. Every mutation tombstones the affected keys, so a copy
/// read before a delete or replace can never be written back after it.
/// Read-side hot tier failures are logged and ignored. Mutations fail when
/// their tombstone cannot be written, since a servable copy may remain.
pub struct TieredCacheStore {
    primary: Arc<dyn CacheStore>,
    hot: Arc<dyn HotTier>,
    ttl: Duration,
}

impl TieredCacheStore {
    pub fn new(primary: Arc<dyn CacheStore>, hot: Arc<dyn HotTier>, ttl: Duration) -> Self {
        Self { primary, hot, ttl }
    }

    async fn with_timeout<T, F>(op: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(HOT_OP_TIMEOUT, op)
            .await
            .map_err(|_| StoreError::Unavailable("hot tier operation timed out".to_string()))?
    }

    async fn hot_get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, StoreError> {
        let raw = Self::with_timeout(self.hot.get(&hot_key(fingerprint))).await?;
        match raw.as_deref() {
            None | Some(TOMBSTONE) => Ok(None),
            Some(payload) => Ok(Some(serde_json::from_str(payload)?)),
        }
    }

    async fn tombstone(&self, fingerprints: &[Fingerprint]) -> Result<(), StoreError> {
        let keys: Vec<String> = fingerprints.iter().map(hot_key).collect();
        Self::with_timeout(self.hot.set(&keys, TOMBSTONE, TOMBSTONE_TTL)).await
    }

    /// Copies an entry read from the primary at `read_at` into the hot tier.
    async fn backfill(&self, entry: &CacheEntry, read_at: Instant) -> Result<(), StoreError> {
        if read_at.elapsed() > BACKFILL_WINDOW {
            debug!(fingerprint = %entry.fingerprint, "Primary read too old to backfill");
            return Ok(());
        }
        let payload = serde_json::to_string(entry)?;
        let written = Self::with_timeout(self.hot.set_if_absent(
            &hot_key(&entry.fingerprint),
            &payload,
            self.ttl,
        ))
        .await?;
        if !written {
            debug!(fingerprint = %entry.fingerprint, "Backfill skipped, key recently changed");
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for TieredCacheStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, StoreError> {
        match self.hot_get(fingerprint).await {
            Ok(Some(entry)) => {
                debug!(%fingerprint, "Hot tier hit");
                return Ok(Some(entry));
            }
            Ok(None) => {}
            Err(e) => warn!(%fingerprint, "Hot tier read failed, using primary: {e}"),
        }

        let read_at = Instant::now();
        let entry = self.primary.get(fingerprint).await?;
        if let Some(entry) = &entry {
            if let Err(e) = self.backfill(entry, read_at).await {
                warn!(%fingerprint, "Hot tier backfill failed: {e}");
            }
        }
        Ok(entry)
    }

    async fn put(&self, entry: NewCacheEntry) -> Result<CacheEntry, StoreError> {
        let stored = self.primary.put(entry).await?;
        self.tombstone(std::slice::from_ref(&stored.fingerprint))
            .await
            .inspect_err(|e| {
                warn!(fingerprint = %stored.fingerprint, "Hot tier tombstone after write failed: {e}")
            })?;
        Ok(stored)
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        // Tombstone first: if the hot tier is down, nothing has changed yet.
        self.tombstone(std::slice::from_ref(fingerprint)).await?;
        self.primary.delete(fingerprint).await
    }

    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<Vec<Fingerprint>, StoreError> {
        let known = self.primary.fingerprints_for_owner(owner_id).await?;
        self.tombstone(&known).await?;

        let removed = self.primary.delete_by_owner(owner_id).await?;

        // Rows the owner created between the listing and the delete.
        let known: HashSet<&Fingerprint> = known.iter().collect();
        let late: Vec<Fingerprint> = removed
            .iter()
            .filter(|fp| !known.contains(fp))
            .cloned()
            .collect();
        self.tombstone(&late).await?;
        Ok(removed)
    }

    async fn fingerprints_for_owner(&self, owner_id: Uuid) -> Result<Vec<Fingerprint>, StoreError> {
        self.primary.fingerprints_for_owner(owner_id).await
    }

    async fn scan(
        &self,
        after: Option<&Fingerprint>,
        limit: usize,
    ) -> Result<Vec<RawCacheEntry>, StoreError> {
        self.primary.scan(after, limit).await
    }

    async fn record_hit(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.primary.record_hit(fingerprint).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::cache::fingerprint::fingerprint;
    use crate::cache::store::MemoryCacheStore;
    use crate::models::resume::{ContactInfo, ParsedResume};

    /// In-process hot tier. Expiry is not modelled.
    #[derive(Default)]
    struct FakeHotTier {
        keys: Mutex<HashMap<String, String>>,
        down: AtomicBool,
    }

    impl FakeHotTier {
        fn check(&self) -> Result<(), StoreError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection refused".to_string()));
            }
            Ok(())
        }

        fn raw(&self, fp: &Fingerprint) -> Option<String> {
            self.keys.lock().unwrap().get(&hot_key(fp)).cloned()
        }
    }

    #[async_trait]
    impl HotTier for FakeHotTier {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.check()?;
            Ok(self.keys.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, keys: &[String], value: &str, _ttl: Duration) -> Result<(), StoreError> {
            self.check()?;
            let mut map = self.keys.lock().unwrap();
            for key in keys {
                map.insert(key.clone(), value.to_string());
            }
            Ok(())
        }

        async fn set_if_absent(
            &self,
            key: &str,
            value: &str,
            _ttl: Duration,
        ) -> Result<bool, StoreError> {
            self.check()?;
            let mut map = self.keys.lock().unwrap();
            if map.contains_key(key) {
                return Ok(false);
            }
            map.insert(key.to_string(), value.to_string());
            Ok(true)
        }
    }

    struct Fixture {
        primary: Arc<MemoryCacheStore>,
        hot: Arc<FakeHotTier>,
        store: TieredCacheStore,
    }

    fn fixture() -> Fixture {
        let primary = Arc::new(MemoryCacheStore::new());
        let hot = Arc::new(FakeHotTier::default());
        let store = TieredCacheStore::new(primary.clone(), hot.clone(), Duration::from_secs(60));
        Fixture {
            primary,
            hot,
            store,
        }
    }

    fn entry(fp: &Fingerprint, owner: Uuid, email: &str) -> NewCacheEntry {
        NewCacheEntry {
            fingerprint: fp.clone(),
            owner_id: owner,
            result: ParsedResume::with_contact(ContactInfo {
                email: Some(email.to_string()),
                ..Default::default()
            }),
        }
    }

    fn email_of(entry: &CacheEntry) -> Option<&str> {
        entry.result.contact.as_ref().and_then(|c| c.email.as_deref())
    }

    #[test]
    fn test_hot_key_is_namespaced() {
        let fp = fingerprint(b"abc");
        assert_eq!(hot_key(&fp), format!("resume_parse:{}", fp.as_str()));
    }

    #[tokio::test]
    async fn test_primary_read_is_backfilled_and_served_hot() {
        let f = fixture();
        let fp = fingerprint(b"resume");
        f.primary.put(entry(&fp, Uuid::new_v4(), "jane@x.com")).await.unwrap();

        assert!(f.store.get(&fp).await.unwrap().is_some());
        assert!(f.hot.raw(&fp).is_some_and(|raw| raw != TOMBSTONE));

        // Served from the hot tier without touching the primary.
        f.primary.delete(&fp).await.unwrap();
        assert!(f.store.get(&fp).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_wins_over_backfill_of_earlier_read() {
        let f = fixture();
        let fp = fingerprint(b"resume");
        f.store.put(entry(&fp, Uuid::new_v4(), "jane@x.com")).await.unwrap();

        // A reader fetched the row from the primary just before the delete...
        let read_at = Instant::now();
        let stale = f.primary.get(&fp).await.unwrap().unwrap();
        assert!(f.store.delete(&fp).await.unwrap());
        // ...and only gets to copy it into the hot tier afterwards.
        f.store.backfill(&stale, read_at).await.unwrap();

        assert_eq!(f.hot.raw(&fp).as_deref(), Some(TOMBSTONE));
        assert_eq!(f.store.get(&fp).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_is_visible_despite_earlier_hot_copy() {
        let f = fixture();
        let fp = fingerprint(b"resume");
        let owner = Uuid::new_v4();
        f.primary.put(entry(&fp, owner, "old@x.com")).await.unwrap();
        f.store.get(&fp).await.unwrap();

        f.store.put(entry(&fp, owner, "new@x.com")).await.unwrap();

        let current = f.store.get(&fp).await.unwrap().unwrap();
        assert_eq!(email_of(&current), Some("new@x.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_primary_read_is_not_backfilled() {
        let f = fixture();
        let fp = fingerprint(b"resume");
        f.primary.put(entry(&fp, Uuid::new_v4(), "jane@x.com")).await.unwrap();

        let read_at = Instant::now();
        let stale = f.primary.get(&fp).await.unwrap().unwrap();
        tokio::time::advance(BACKFILL_WINDOW + Duration::from_secs(1)).await;
        f.store.backfill(&stale, read_at).await.unwrap();

        assert_eq!(f.hot.raw(&fp), None);
    }

    #[tokio::test]
    async fn test_invalidation_fails_while_hot_tier_is_down() {
        let f = fixture();
        let fp = fingerprint(b"resume");
        let owner = Uuid::new_v4();
        f.store.put(entry(&fp, owner, "jane@x.com")).await.unwrap();
        f.hot.down.store(true, Ordering::SeqCst);

        assert!(f.store.delete(&fp).await.is_err());
        assert!(f.store.delete_by_owner(owner).await.is_err());
        // Nothing was removed, so a retry can still reach every copy.
        assert_eq!(f.primary.len().await, 1);

        f.hot.down.store(false, Ordering::SeqCst);
        assert_eq!(f.store.delete_by_owner(owner).await.unwrap(), vec![fp.clone()]);
        assert_eq!(f.store.get(&fp).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_owner_purge_tombstones_hot_copies() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let (a, b) = (fingerprint(b"one"), fingerprint(b"two"));
        for fp in [&a, &b] {
            f.primary.put(entry(fp, owner, "jane@x.com")).await.unwrap();
            f.store.get(fp).await.unwrap();
        }

        let mut removed = f.store.delete_by_owner(owner).await.unwrap();
        removed.sort();
        let mut expected = vec![a.clone(), b.clone()];
        expected.sort();
        assert_eq!(removed, expected);
        assert_eq!(f.store.get(&a).await.unwrap(), None);
        assert_eq!(f.store.get(&b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hot_read_outage_falls_back_to_primary() {
        let f = fixture();
        let fp = fingerprint(b"resume");
        f.primary.put(entry(&fp, Uuid::new_v4(), "jane@x.com")).await.unwrap();
        f.hot.down.store(true, Ordering::SeqCst);

        assert!(f.store.get(&fp).await.unwrap().is_some());
    }
}
