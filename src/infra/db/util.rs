use sqlx::error::{DatabaseError, ErrorKind};

use crate::application::repos::RepoError;

/// `invalid_text_representation`
const SQLSTATE_INVALID_TEXT: &str = "22P02";
/// `query_canceled`, raised by `statement_timeout`
const SQLSTATE_QUERY_CANCELED: &str = "57014";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => map_database_error(db.as_ref()),
        other => RepoError::from_persistence(other),
    }
}

fn map_database_error(db: &dyn DatabaseError) -> RepoError {
    match db.kind() {
        ErrorKind::UniqueViolation => RepoError::Duplicate {
            constraint: db.constraint().unwrap_or("unknown").to_string(),
        },
        ErrorKind::ForeignKeyViolation
        | ErrorKind::NotNullViolation
        | ErrorKind::CheckViolation => RepoError::InvalidInput {
            message: db.message().to_string(),
        },
        _ => match db.code().as_deref() {
            Some(SQLSTATE_QUERY_CANCELED) => RepoError::Timeout,
            Some(SQLSTATE_INVALID_TEXT) => RepoError::InvalidInput {
                message: db.message().to_string(),
            },
            _ => RepoError::from_persistence(db.message()),
        },
    }
}
