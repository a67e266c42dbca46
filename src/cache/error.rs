use thiserror::Error;

use crate::application::repos::RepoError;

/// Errors a cached read can surface.
///
/// Backend outages and corrupt entries are absorbed by the cache; only a
/// failing authoritative store reaches the caller.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("entity store failed: {0}")]
    Store(#[from] RepoError),
}
