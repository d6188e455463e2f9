use thiserror::Error;

use super::translate::TranslationError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("translation error: {0}")]
    Translation(#[from] TranslationError),
    #[error("{0} not found")]
    NotFound(&'static str),
}
