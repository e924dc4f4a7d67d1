use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CacheEntry, CacheStore, NewCacheEntry, RawCacheEntry};
use crate::cache::error::StoreError;
use crate::cache::fingerprint::Fingerprint;

#[derive(Debug, Clone)]
struct StoredEntry {
    owner_id: Uuid,
    result: Value,
    hit_count: i64,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    last_used_at: Option<chrono::DateTime<Utc>>,
}

/// Process-local store. Results are kept as JSON, like the Postgres table,
/// so malformed payloads behave the same way in both backends.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<BTreeMap<Fingerprint, StoredEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Writes a raw value without going through `put`, e.g. to seed rows a
    /// newer parser would no longer produce.
    pub async fn insert_raw(&self, fingerprint: Fingerprint, owner_id: Uuid, result: Value) {
        let now = Utc::now();
        self.entries.write().await.insert(
            fingerprint,
            StoredEntry {
                owner_id,
                result,
                hit_count: 0,
                created_at: now,
                updated_at: now,
                last_used_at: None,
            },
        );
    }
}

fn decode(fingerprint: &Fingerprint, stored: &StoredEntry) -> Result<CacheEntry, StoreError> {
    Ok(CacheEntry {
        fingerprint: fingerprint.clone(),
        owner_id: stored.owner_id,
        result: serde_json::from_value(stored.result.clone())?,
        hit_count: stored.hit_count,
        created_at: stored.created_at,
        updated_at: stored.updated_at,
        last_used_at: stored.last_used_at,
    })
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, StoreError> {
        let entries = self.entries.read().await;
        entries
            .get(fingerprint)
            .map(|stored| decode(fingerprint, stored))
            .transpose()
    }

    async fn put(&self, entry: NewCacheEntry) -> Result<CacheEntry, StoreError> {
        let result = serde_json::to_value(&entry.result)?;
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let stored = entries
            .entry(entry.fingerprint.clone())
            .and_modify(|existing| {
                existing.result = result.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| StoredEntry {
                owner_id: entry.owner_id,
                result: result.clone(),
                hit_count: 0,
                created_at: now,
                updated_at: now,
                last_used_at: None,
            });
        decode(&entry.fingerprint, stored)
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        Ok(self.entries.write().await.remove(fingerprint).is_some())
    }

    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<Vec<Fingerprint>, StoreError> {
        let mut entries = self.entries.write().await;
        let doomed: Vec<Fingerprint> = entries
            .iter()
            .filter(|(_, stored)| stored.owner_id == owner_id)
            .map(|(fp, _)| fp.clone())
            .collect();
        for fp in &doomed {
            entries.remove(fp);
        }
        Ok(doomed)
    }

    async fn fingerprints_for_owner(&self, owner_id: Uuid) -> Result<Vec<Fingerprint>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, stored)| stored.owner_id == owner_id)
            .map(|(fp, _)| fp.clone())
            .collect())
    }

    async fn scan(
        &self,
        after: Option<&Fingerprint>,
        limit: usize,
    ) -> Result<Vec<RawCacheEntry>, StoreError> {
        let entries = self.entries.read().await;
        let lower = match after {
            Some(fp) => Bound::Excluded(fp.clone()),
            None => Bound::Unbounded,
        };
        Ok(entries
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(fp, stored)| RawCacheEntry {
                fingerprint: fp.clone(),
                owner_id: stored.owner_id,
                result: stored.result.clone(),
            })
            .collect())
    }

    async fn record_hit(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        if let Some(stored) = self.entries.write().await.get_mut(fingerprint) {
            stored.hit_count += 1;
            stored.last_used_at = Some(Utc::now());
        }
        Ok(())
    }
}
