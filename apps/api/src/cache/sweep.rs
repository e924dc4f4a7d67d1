//! Sweep Job: evicts cached results that no longer pass the quality gate.
//!
//! Walks the store in fingerprint order, one keyset page at a time, and
//! deletes each failing entry as soon as it is seen. Stopping halfway leaves
//! a consistent store: evictions so far stay evicted and the rest are
//! revisited by the next run.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::error::StoreError;
use crate::cache::quality::{is_valid_value, QualityGate};
use crate::cache::store::CacheStore;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub evicted: usize,
}

pub struct SweepJob {
    store: Arc<dyn CacheStore>,
    gate: Arc<dyn QualityGate>,
    batch_size: usize,
}

impl SweepJob {
    pub fn new(store: Arc<dyn CacheStore>, gate: Arc<dyn QualityGate>, batch_size: usize) -> Self {
        Self {
            store,
            gate,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();
        let mut cursor = None;

        loop {
            let batch = self.store.scan(cursor.as_ref(), self.batch_size).await?;
            let Some(last) = batch.last() else {
                break;
            };
            cursor = Some(last.fingerprint.clone());
            let full_page = batch.len() == self.batch_size;

            for entry in &batch {
                report.scanned += 1;
                if is_valid_value(self.gate.as_ref(), &entry.result) {
                    continue;
                }
                if self.store.delete(&entry.fingerprint).await? {
                    report.evicted += 1;
                    debug!(
                        fingerprint = %entry.fingerprint,
                        owner_id = %entry.owner_id,
                        "Evicted resume parse cache entry"
                    );
                }
            }

            if !full_page {
                break;
            }
        }

        info!(
            gate = self.gate.name(),
            scanned = report.scanned,
            evicted = report.evicted,
            "Resume parse cache sweep finished"
        );
        Ok(report)
    }
}

/// Runs `job` every `every`, starting one period after launch.
/// A failed run is logged and the loop carries on.
pub fn spawn_periodic(job: Arc<SweepJob>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = job.run().await {
                error!("Resume parse cache sweep failed: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fingerprint::fingerprint;
    use crate::cache::quality::ContactQualityGate;
    use crate::cache::store::MemoryCacheStore;
    use crate::models::resume::ParsedResume;
    use serde_json::json;
    use uuid::Uuid;

    async fn seeded_store() -> Arc<MemoryCacheStore> {
        let store = Arc::new(MemoryCacheStore::new());
        let owner = Uuid::new_v4();
        let rows = [
            json!({ "contact": { "name": "Jane Doe", "email": "jane@x.com" } }),
            json!({ "contact": { "links": ["https://jdoe.dev"] } }),
            json!({ "contact": { "name": "", "email": "", "phone": "" } }),
            json!({ "experience": [] }),
            json!(null),
            json!("legacy blob"),
            json!({ "contact": { "phone": "+1 555 0100" } }),
            json!({ "contact": { "phone": 5550100199u64, "links": null } }),
        ];
        for (i, row) in rows.into_iter().enumerate() {
            store.insert_raw(fingerprint(&[i as u8]), owner, row).await;
        }
        store
    }

    fn job(store: Arc<MemoryCacheStore>, batch_size: usize) -> SweepJob {
        SweepJob::new(store, Arc::new(ContactQualityGate), batch_size)
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_failing_entries() {
        let store = seeded_store().await;
        let report = job(store.clone(), DEFAULT_BATCH_SIZE).run().await.unwrap();

        assert_eq!(report, SweepReport { scanned: 8, evicted: 4 });
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn test_small_batches_visit_every_entry() {
        let store = seeded_store().await;
        let report = job(store.clone(), 2).run().await.unwrap();

        assert_eq!(report, SweepReport { scanned: 8, evicted: 4 });
    }

    #[tokio::test]
    async fn test_second_sweep_evicts_nothing() {
        let store = seeded_store().await;
        let sweep = job(store.clone(), 3);

        sweep.run().await.unwrap();
        let second = sweep.run().await.unwrap();

        assert_eq!(second, SweepReport { scanned: 4, evicted: 0 });
    }

    #[tokio::test]
    async fn test_empty_store() {
        let report = job(Arc::new(MemoryCacheStore::new()), 10).run().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    /// A stricter gate, as after tightening the rules: entries kept by the
    /// contact gate become evictable.
    struct EmailRequired;

    impl QualityGate for EmailRequired {
        fn is_valid(&self, result: &ParsedResume) -> bool {
            result
                .contact
                .as_ref()
                .and_then(|c| c.email.as_deref())
                .is_some_and(|e| e.contains('@'))
        }

        fn name(&self) -> &'static str {
            "email_required"
        }
    }

    #[tokio::test]
    async fn test_stricter_gate_evicts_previously_kept_entries() {
        let store = seeded_store().await;
        job(store.clone(), DEFAULT_BATCH_SIZE).run().await.unwrap();

        let strict = SweepJob::new(store.clone(), Arc::new(EmailRequired), DEFAULT_BATCH_SIZE);
        let report = strict.run().await.unwrap();

        assert_eq!(report, SweepReport { scanned: 4, evicted: 3 });
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweep_runs_after_each_interval() {
        let store = seeded_store().await;
        let handle = spawn_periodic(Arc::new(job(store.clone(), 10)), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len().await, 8);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.len().await, 4);

        handle.abort();
    }
}
