use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Where cache entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Postgres,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(CacheBackend::Postgres),
            "memory" => Ok(CacheBackend::Memory),
            other => bail!("CACHE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_backend: CacheBackend,
    /// Required for the Postgres backend.
    pub database_url: Option<String>,
    /// Enables the Redis hot tier when set.
    pub redis_url: Option<String>,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// TTL of hot-tier copies.
    pub resume_parse_ttl: Duration,
    /// Deadline for one resume parse, including LLM retries.
    pub parse_timeout: Duration,
    pub sweep_batch_size: usize,
    /// Zero disables the background sweep.
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let cache_backend: CacheBackend = env_or("CACHE_BACKEND", "postgres")?;
        let database_url = optional_env("DATABASE_URL");
        if cache_backend == CacheBackend::Postgres && database_url.is_none() {
            bail!("Required environment variable 'DATABASE_URL' is not set (CACHE_BACKEND=postgres)");
        }

        Ok(Config {
            cache_backend,
            database_url,
            redis_url: optional_env("REDIS_URL"),
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", "8080")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            resume_parse_ttl: Duration::from_secs(env_or("RESUME_PARSE_TTL_SECS", "604800")?),
            parse_timeout: Duration::from_secs(env_or("PARSE_TIMEOUT_SECS", "90")?),
            sweep_batch_size: env_or("SWEEP_BATCH_SIZE", "500")?,
            sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", "3600")?),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    parse_setting(key, &raw)
}

fn parse_setting<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{key} has an invalid value '{raw}': {e}"))
}
