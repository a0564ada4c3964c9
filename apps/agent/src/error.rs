//! Startup and runtime errors for the agent binary.

use mandi_db::DbError;
use mandi_sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Could not determine app data directory")]
    NoDataDir,

    #[error("Could not prepare data directory: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type AgentResult<T> = Result<T, AgentError>;
