use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::board::BoardError, cache::CacheError, config::LoadError,
    infra::error::InfraError,
};

/// Flattened view of an error and its `source()` chain.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    /// Messages joined outermost first, e.g. `a: b: c`.
    pub fn chain(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration")]
    Config(#[from] LoadError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit status for the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Infra(InfraError::Missing { .. }) => 2,
            AppError::NotFound(_) | AppError::Board(BoardError::NotFound { .. }) => 3,
            _ => 1,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::RepoError;

    #[test]
    fn report_walks_source_chain() {
        let error = AppError::from(LoadError::Invalid {
            key: "cache.backend",
            reason: "expected `memory` or `redis`".to_string(),
        });
        let report = error.report();

        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0], "failed to load configuration");
        assert!(report.chain().contains("cache.backend"));
    }

    #[test]
    fn exit_codes_by_category() {
        assert_eq!(AppError::not_found("topic 7").exit_code(), 3);
        assert_eq!(
            AppError::from(InfraError::missing("database.url")).exit_code(),
            2
        );
        assert_eq!(
            AppError::from(CacheError::from(RepoError::Timeout)).exit_code(),
            1
        );
    }
}
