pub mod health;
pub mod resumes;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resume parse cache
        .route("/api/v1/resumes/parse", post(resumes::handle_parse))
        .route(
            "/api/v1/resumes/cache/:fingerprint",
            get(resumes::handle_get_cached).delete(resumes::handle_invalidate),
        )
        .route(
            "/api/v1/users/:owner_id/resume-cache",
            delete(resumes::handle_purge_owner),
        )
        // Admin
        .route("/api/v1/admin/cache/sweep", post(resumes::handle_sweep))
        .with_state(state)
}
