//! Cache Manager: the read-through entry point used by the upload handlers.
//!
//! `get_or_compute` collapses concurrent requests for the same fingerprint
//! into a single computation. The computation runs on its own task, so it
//! finishes (and fills the cache) even if every waiting request goes away.
//! Its map slot is released only after the store write, so a caller arriving
//! in between either joins the computation or finds the stored entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::error::{CacheError, ComputeError, ReadError, StoreError};
use crate::cache::fingerprint::{fingerprint, Fingerprint};
use crate::cache::quality::QualityGate;
use crate::cache::store::{CacheEntry, CacheStore, NewCacheEntry};
use crate::models::resume::ParsedResume;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound on a single compute call. Expiry counts as a compute failure.
    pub compute_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            compute_timeout: Duration::from_secs(90),
        }
    }
}

/// Where a result handed to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    /// Served from the store without computing.
    Hit,
    /// This caller started the computation.
    Computed,
    /// This caller waited on a computation another request started.
    Joined,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheOutcome {
    pub fingerprint: Fingerprint,
    pub result: ParsedResume,
    pub source: CacheSource,
    /// Whether the result is (now) in the store. False when the result failed
    /// the quality gate or the write was lost to a store outage.
    pub stored: bool,
}

impl CacheOutcome {
    pub fn cache_hit(&self) -> bool {
        self.source == CacheSource::Hit
    }
}

#[derive(Debug, Clone)]
struct Filled {
    result: ParsedResume,
    stored: bool,
    from_cache: bool,
}

type InFlight = Shared<BoxFuture<'static, Result<Filled, ComputeError>>>;
type InFlightMap = Arc<Mutex<HashMap<Fingerprint, InFlight>>>;

/// When each owner was last purged, in purge order. Fills compare against
/// the epoch they started at so a purge cannot be undone by a late write.
#[derive(Debug, Default)]
struct PurgeLog {
    epoch: u64,
    last_purge: HashMap<Uuid, u64>,
}

impl PurgeLog {
    fn record(&mut self, owner_id: Uuid) {
        self.epoch += 1;
        self.last_purge.insert(owner_id, self.epoch);
    }

    fn purged_since(&self, owner_id: Uuid, epoch: u64) -> bool {
        self.last_purge
            .get(&owner_id)
            .is_some_and(|&purged| purged > epoch)
    }
}

type SharedPurgeLog = Arc<Mutex<PurgeLog>>;

pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    gate: Arc<dyn QualityGate>,
    config: ManagerConfig,
    in_flight: InFlightMap,
    purges: SharedPurgeLog,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, gate: Arc<dyn QualityGate>, config: ManagerConfig) -> Self {
        Self {
            store,
            gate,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            purges: Arc::default(),
        }
    }

    /// Looks up a servable entry. Entries failing the quality gate, or that no
    /// longer decode, are reported as absent but left in place for the sweep.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, StoreError> {
        match self.store.get(fingerprint).await {
            Ok(Some(entry)) if self.gate.is_valid(&entry.result) => Ok(Some(entry)),
            Ok(Some(_)) => {
                debug!(%fingerprint, gate = self.gate.name(), "Cached entry fails quality gate");
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(StoreError::Serialization(e)) => {
                debug!(%fingerprint, "Cached entry no longer decodes: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ParsedResume>, StoreError> {
        Ok(self.lookup(fingerprint).await?.map(|entry| entry.result))
    }

    /// Returns the cached result for `raw`, or computes, gates and stores it.
    ///
    /// Store failures never fail this call: a broken read is a miss and a
    /// broken write only clears `stored`. Results failing the quality gate
    /// are returned but never stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        raw: Bytes,
        owner_id: Uuid,
        compute: F,
    ) -> Result<CacheOutcome, CacheError>
    where
        F: FnOnce(Bytes) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<ParsedResume>> + Send + 'static,
    {
        if raw.is_empty() {
            return Err(ReadError::Empty.into());
        }
        let fingerprint = fingerprint(&raw);

        match self.get(&fingerprint).await {
            Ok(Some(result)) => {
                if let Err(e) = self.store.record_hit(&fingerprint).await {
                    debug!(%fingerprint, "Failed to record cache hit: {e}");
                }
                info!(%fingerprint, %owner_id, "Resume parse served from cache");
                return Ok(CacheOutcome {
                    fingerprint,
                    result,
                    source: CacheSource::Hit,
                    stored: true,
                });
            }
            Ok(None) => debug!(%fingerprint, "Resume parse cache miss"),
            Err(e) => warn!(%fingerprint, "Cache read failed, computing directly: {e}"),
        }

        let (pending, leader) = self.join_or_start(&fingerprint, raw, owner_id, compute);
        let filled = pending.await?;

        let source = if filled.from_cache {
            CacheSource::Hit
        } else if leader {
            CacheSource::Computed
        } else {
            CacheSource::Joined
        };
        Ok(CacheOutcome {
            fingerprint,
            result: filled.result,
            source,
            stored: filled.stored,
        })
    }

    /// Deletes one entry. Missing entries are not an error.
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        let removed = self.store.delete(fingerprint).await?;
        info!(%fingerprint, removed, "Invalidated resume parse cache entry");
        Ok(removed)
    }

    /// Deletes every entry created by `owner_id` (account data deletion).
    ///
    /// Fills for this owner that are still running when the purge starts
    /// do not leave an entry behind.
    pub async fn invalidate_all_for_owner(&self, owner_id: Uuid) -> Result<usize, StoreError> {
        self.purges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(owner_id);
        let removed = self.store.delete_by_owner(owner_id).await?;
        info!(%owner_id, count = removed.len(), "Purged resume parse cache for owner");
        Ok(removed.len())
    }

    /// Number of computations currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // Check-and-insert happens under one lock acquisition.
    fn join_or_start<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        raw: Bytes,
        owner_id: Uuid,
        compute: F,
    ) -> (InFlight, bool)
    where
        F: FnOnce(Bytes) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<ParsedResume>> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = in_flight.get(fingerprint) {
            debug!(%fingerprint, %owner_id, "Joining in-flight resume parse");
            return (pending.clone(), false);
        }

        let started_at = self.purges.lock().unwrap_or_else(PoisonError::into_inner).epoch;
        let job = FillJob {
            store: self.store.clone(),
            gate: self.gate.clone(),
            purges: self.purges.clone(),
            started_at,
            slot: SlotGuard {
                in_flight: self.in_flight.clone(),
                fingerprint: fingerprint.clone(),
            },
            fingerprint: fingerprint.clone(),
            owner_id,
            timeout: self.config.compute_timeout,
        };
        let task = tokio::spawn(job.run(raw, compute));
        let pending: InFlight = task
            .map(|joined| joined.unwrap_or_else(|e| Err(ComputeError::Aborted(e.to_string()))))
            .boxed()
            .shared();

        in_flight.insert(fingerprint.clone(), pending.clone());
        (pending, true)
    }
}

/// Releases a fingerprint's in-flight slot when the fill task ends,
/// including by panic.
struct SlotGuard {
    in_flight: InFlightMap,
    fingerprint: Fingerprint,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.fingerprint);
    }
}

struct FillJob {
    store: Arc<dyn CacheStore>,
    gate: Arc<dyn QualityGate>,
    purges: SharedPurgeLog,
    /// Purge epoch when the fill was started.
    started_at: u64,
    slot: SlotGuard,
    fingerprint: Fingerprint,
    owner_id: Uuid,
    timeout: Duration,
}

impl FillJob {
    async fn run<F, Fut>(self, raw: Bytes, compute: F) -> Result<Filled, ComputeError>
    where
        F: FnOnce(Bytes) -> Fut,
        Fut: Future<Output = anyhow::Result<ParsedResume>>,
    {
        let FillJob {
            store,
            gate,
            purges,
            started_at,
            slot: _slot,
            fingerprint,
            owner_id,
            timeout,
        } = self;

        // A previous leader may have stored the entry between our miss and
        // taking the slot.
        if let Ok(Some(entry)) = store.get(&fingerprint).await {
            if gate.is_valid(&entry.result) {
                return Ok(Filled {
                    result: entry.result,
                    stored: true,
                    from_cache: true,
                });
            }
        }

        let result = match tokio::time::timeout(timeout, compute(raw)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(%fingerprint, %owner_id, "Resume parse failed: {e:#}");
                return Err(ComputeError::Failed(format!("{e:#}")));
            }
            Err(_) => {
                warn!(%fingerprint, %owner_id, "Resume parse timed out after {timeout:?}");
                return Err(ComputeError::TimedOut(timeout));
            }
        };

        if !gate.is_valid(&result) {
            warn!(
                %fingerprint,
                %owner_id,
                gate = gate.name(),
                "Parse result failed quality gate, not caching"
            );
            return Ok(Filled {
                result,
                stored: false,
                from_cache: false,
            });
        }

        let purged =
            || purges.lock().unwrap_or_else(PoisonError::into_inner).purged_since(owner_id, started_at);
        if purged() {
            info!(%fingerprint, %owner_id, "Owner purged during parse, not caching");
            return Ok(Filled {
                result,
                stored: false,
                from_cache: false,
            });
        }

        let mut stored = match store
            .put(NewCacheEntry {
                fingerprint: fingerprint.clone(),
                owner_id,
                result: result.clone(),
            })
            .await
        {
            Ok(_) => {
                info!(%fingerprint, %owner_id, "Resume parse cached");
                true
            }
            Err(e) => {
                error!(%fingerprint, "Failed to write resume parse cache: {e}");
                false
            }
        };

        // A purge that began while the write was in flight may have missed it.
        if stored && purged() {
            match store.delete(&fingerprint).await {
                Ok(_) => {
                    info!(%fingerprint, %owner_id, "Owner purged during parse, entry removed");
                    stored = false;
                }
                Err(e) => error!(%fingerprint, %owner_id, "Failed to remove entry of purged owner: {e}"),
            }
        }

        Ok(Filled {
            result,
            stored,
            from_cache: false,
        })
    }
}
