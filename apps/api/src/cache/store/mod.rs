//! Cache Store: durable fingerprint → entry mapping.
//!
//! Every mutation is a whole-entry create, replace or delete. Backends:
//! - `PgCacheStore`: the durable table, used in production.
//! - `MemoryCacheStore`: process-local, for single-instance runs and tests.
//! - `TieredCacheStore`: a Redis hot tier in front of another store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::cache::error::StoreError;
use crate::cache::fingerprint::Fingerprint;
use crate::models::resume::ParsedResume;

pub mod memory;
pub mod postgres;
pub mod tiered;

pub use memory::MemoryCacheStore;
pub use postgres::PgCacheStore;
pub use tiered::TieredCacheStore;

/// A decoded cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub owner_id: Uuid,
    pub result: ParsedResume,
    pub hit_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// An entry exactly as persisted. The sweep works on these so that rows
/// which no longer decode are still visible (and evictable).
#[derive(Debug, Clone)]
pub struct RawCacheEntry {
    pub fingerprint: Fingerprint,
    pub owner_id: Uuid,
    pub result: Value,
}

/// Input to `CacheStore::put`.
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub fingerprint: Fingerprint,
    pub owner_id: Uuid,
    pub result: ParsedResume,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Physical lookup. Quality is not checked here.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, StoreError>;

    /// Creates the entry, or replaces `result` wholesale and refreshes
    /// `updated_at`. `owner_id` and `created_at` keep their first values.
    async fn put(&self, entry: NewCacheEntry) -> Result<CacheEntry, StoreError>;

    /// Returns whether an entry was removed. Deleting a missing key is fine.
    async fn delete(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError>;

    /// Removes every entry created by `owner_id`, returning their keys.
    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<Vec<Fingerprint>, StoreError>;

    /// Keys of every entry created by `owner_id`, without removing them.
    async fn fingerprints_for_owner(&self, owner_id: Uuid) -> Result<Vec<Fingerprint>, StoreError>;

    /// Keyset page ordered by fingerprint, starting strictly after `after`.
    async fn scan(
        &self,
        after: Option<&Fingerprint>,
        limit: usize,
    ) -> Result<Vec<RawCacheEntry>, StoreError>;

    /// Bumps hit metadata. Callers treat failures as non-fatal.
    async fn record_hit(&self, fingerprint: &Fingerprint) -> Result<(), StoreError>;
}
