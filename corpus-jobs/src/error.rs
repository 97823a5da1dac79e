//! Application-wide error types.

use thiserror::Error;

use crate::jobs::{DependencyError, QueueError};

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Job {job_id} cannot be restarted: {reason}")]
    RestartNotAllowed { job_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn restart_not_allowed(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RestartNotAllowed {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
