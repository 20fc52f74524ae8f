// weiser-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeiserError {
    // --- DOMAIN ERRORS (descriptor validation, compilation, analysis) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- INFRASTRUCTURE ERRORS (IO, parsing, connections, queries) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- GENERIC / APPLICATION ERRORS ---
    #[error("Internal Error: {0}")]
    InternalError(String),

    #[error("Run cancelled")]
    Cancelled,
}

// Manual implementation to avoid duplicate enum variant but keep ergonomics
impl From<std::io::Error> for WeiserError {
    fn from(err: std::io::Error) -> Self {
        WeiserError::Infrastructure(InfrastructureError::Io(err))
    }
}
