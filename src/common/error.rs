use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Pose unavailable: {reason}")]
    PoseUnavailable { reason: String },

    #[error("Navigation engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    #[error("Motion driver failure: {reason}")]
    MotionFailure { reason: String },

    #[error("Map service error: {reason}")]
    MapService { reason: String },

    #[error("{what} acquisition timed out after {timeout:?}")]
    AcquisitionTimeout { what: String, timeout: Duration },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Infrastructure error: {0}")]
    InfrastructureError(String),
}

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Event journal error: {0}")]
    EventJournal(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] anyhow::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;
pub type ApplicationResult<T> = Result<T, ApplicationError>;
