use std::sync::Arc;

use crate::cache::{CacheManager, SweepJob};
use crate::parser::ResumeParser;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Built once at startup and shared; there is no global cache instance.
    pub cache: Arc<CacheManager>,
    pub sweep: Arc<SweepJob>,
    /// Pluggable compute collaborator. Default: LlmResumeParser.
    pub parser: Arc<dyn ResumeParser>,
}
