use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parse_cache_api::cache::store::tiered::RedisHotTier;
use parse_cache_api::cache::sweep::spawn_periodic;
use parse_cache_api::cache::{
    CacheManager, CacheStore, ContactQualityGate, ManagerConfig, MemoryCacheStore, PgCacheStore,
    QualityGate, SweepJob, TieredCacheStore,
};
use parse_cache_api::config::{CacheBackend, Config};
use parse_cache_api::db::{create_pool, ensure_schema};
use parse_cache_api::llm_client::{self, LlmClient};
use parse_cache_api::parser::LlmResumeParser;
use parse_cache_api::routes::build_router;
use parse_cache_api::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting parse cache API v{}", env!("CARGO_PKG_VERSION"));

    let store = build_store(&config).await?;
    let gate: Arc<dyn QualityGate> = Arc::new(ContactQualityGate);

    let cache = Arc::new(CacheManager::new(
        store.clone(),
        gate.clone(),
        ManagerConfig {
            compute_timeout: config.parse_timeout,
        },
    ));

    let sweep = Arc::new(SweepJob::new(store, gate, config.sweep_batch_size));
    if config.sweep_interval.is_zero() {
        info!("Background cache sweep disabled");
    } else {
        spawn_periodic(sweep.clone(), config.sweep_interval);
        info!("Background cache sweep every {:?}", config.sweep_interval);
    }

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.parse_timeout)?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let state = AppState {
        cache,
        sweep,
        parser: Arc::new(LlmResumeParser::new(llm)),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Durable backend per `CACHE_BACKEND`, fronted by Redis when `REDIS_URL` is set.
async fn build_store(config: &Config) -> Result<Arc<dyn CacheStore>> {
    let primary: Arc<dyn CacheStore> = match config.cache_backend {
        CacheBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres cache backend")?;
            let pool = create_pool(url).await?;
            ensure_schema(&pool).await?;
            Arc::new(PgCacheStore::new(pool))
        }
        CacheBackend::Memory => {
            info!("Using in-memory cache store; entries are lost on restart");
            Arc::new(MemoryCacheStore::new())
        }
    };

    match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            let hot = RedisHotTier::connect(client)
                .await
                .context("Failed to connect to Redis hot tier")?;
            info!("Redis hot tier enabled (ttl {:?})", config.resume_parse_ttl);
            Ok(Arc::new(TieredCacheStore::new(
                primary,
                Arc::new(hot),
                config.resume_parse_ttl,
            )))
        }
        None => Ok(primary),
    }
}
