use thiserror::Error;

use crate::cache::KvError;

/// Failures while bootstrapping or talking to external backends.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("database unreachable: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("cache backend error: {0}")]
    Cache(#[from] KvError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("`{key}` is not configured")]
    Missing { key: &'static str },
}

impl InfraError {
    pub fn missing(key: &'static str) -> Self {
        Self::Missing { key }
    }
}
