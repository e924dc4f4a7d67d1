use std::time::Duration;

use thiserror::Error;

/// The raw upload could not be read or hashed.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("input is empty")]
    Empty,

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// The compute collaborator failed for one in-flight computation.
///
/// Cloneable because a single failure is handed to every caller that joined
/// the same computation.
#[derive(Debug, Clone, Error)]
pub enum ComputeError {
    #[error("compute failed: {0}")]
    Failed(String),

    #[error("compute timed out after {0:?}")]
    TimedOut(Duration),

    #[error("compute task aborted: {0}")]
    Aborted(String),
}

/// The cache store could not be reached or returned something unusable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Errors that reach callers of `CacheManager::get_or_compute`.
/// Store failures never appear here: the manager absorbs them.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}
