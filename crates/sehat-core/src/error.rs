//! Error types for Sehat.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Network failure, timeout or auth rejection from the remote model.
    #[error("Remote reasoner unavailable: {0}")]
    RemoteUnavailable(String),

    /// Remote response could not be parsed into the stage schema.
    #[error("Remote reasoner returned malformed output: {0}")]
    RemoteMalformed(String),

    #[error("Pipeline deadline exceeded")]
    PipelineTimeout,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Knowledge error: {0}")]
    Knowledge(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
