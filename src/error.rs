use thiserror::Error;

use crate::store::StoreError;
use crate::subprocess::ProcessError;
use crate::validation::ContiguityViolation;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Validation(#[from] ContiguityViolation),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
