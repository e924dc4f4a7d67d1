//! Content-addressed cache for resume parse results.
//!
//! Uploads are keyed by a SHA-256 fingerprint of their bytes, so re-uploading
//! the same file never re-runs the expensive parse. Results that fail the
//! quality gate are never served, never stored, and are purged by the sweep.

pub mod error;
pub mod fingerprint;
pub mod manager;
pub mod quality;
pub mod store;
pub mod sweep;

pub use error::{CacheError, ComputeError, ReadError, StoreError};
pub use fingerprint::{fingerprint, Fingerprint};
pub use manager::{CacheManager, CacheOutcome, CacheSource, ManagerConfig};
pub use quality::{ContactQualityGate, QualityGate};
pub use store::{CacheEntry, CacheStore, MemoryCacheStore, PgCacheStore, TieredCacheStore};
pub use sweep::{SweepJob, SweepReport};
