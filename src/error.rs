//! Error taxonomy of the analytics pipeline.

use crate::models::FormId;
use crate::validate::Rejection;
use thiserror::Error;

/// The response store could not durably accept a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to persist response: {0}")]
pub struct PersistenceError(pub String);

/// The store could not be read (forms or responses).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to read from store: {0}")]
pub struct DataAccessError(pub String);

/// Delivery to a single viewer failed. Logged, never escalated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Viewer disconnected")]
    Disconnected,

    #[error("Viewer is lagging, update dropped")]
    Lagging,

    #[allow(dead_code)] // Raised by socket-backed viewers
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors surfaced to callers of the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Form not found: {0}")]
    FormNotFound(FormId),

    #[error("Submission rejected: {0}")]
    Rejected(Rejection),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
}
