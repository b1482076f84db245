use once_cell::sync::Lazy;
use std::{env, str::FromStr};
use thiserror::Error;
use tracing::warn;

pub static SUPABASE_BUCKET: Lazy<String> =
    Lazy::new(|| env::var("SUPABASE_BUCKET").unwrap_or_else(|_| "listing-images".to_string()));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Supabase,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown backend `{0}`")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "memory" | "demo" => Ok(BackendKind::Memory),
            "supabase" => Ok(BackendKind::Supabase),
            _ => Err(UnknownBackend(input.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub backend: BackendKind,
    pub body_limit: usize,
    pub redis_url: Option<String>,
    pub idempotency_ttl_secs: u64,
    pub metrics_key: Option<String>,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a local `.env` file.
    pub fn from_env() -> Self {
        let backend = match env::var("LISTING_DESK_BACKEND") {
            Ok(raw) => raw.parse::<BackendKind>().unwrap_or_else(|err| {
                warn!(
                    target = "listing_desk.api",
                    "LISTING_DESK_BACKEND: {err}; using in-memory backend"
                );
                BackendKind::Memory
            }),
            Err(_) if env::var("SUPABASE_URL").is_ok() => BackendKind::Supabase,
            Err(_) => BackendKind::Memory,
        };
        Self {
            port: parse_env("PORT").unwrap_or(8000),
            backend,
            body_limit: parse_env::<usize>("REQUEST_MAX_BYTES")
                .filter(|v| *v > 0)
                .unwrap_or(25 * 1024 * 1024),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            idempotency_ttl_secs: parse_env("IDEMPOTENCY_TTL_SECS").unwrap_or(3600),
            metrics_key: env::var("METRICS_KEY").ok(),
        }
    }
}

pub fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}
