//! Typed error taxonomy for the coordination core.
//!
//! Components surface one of these kinds; callers (the ORPAR controller,
//! the webhook surface) decide whether to retry or escalate. Nothing in
//! this crate leaks a backend-specific exception past a repository call.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MxfError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("cyclic dependency: {0}")]
    CyclicDependency(String),

    #[error("invalid relationship: {0}")]
    InvalidRelationship(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("sandbox failure: {0}")]
    SandboxFailure(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// The closed kind set from spec §7, independent of the human-readable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    InvalidTransition,
    InvalidDependency,
    CyclicDependency,
    InvalidRelationship,
    ProviderUnavailable,
    Timeout,
    SandboxFailure,
    StorageFailure,
    Conflict,
}

impl MxfError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MxfError::NotFound(_) => ErrorKind::NotFound,
            MxfError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            MxfError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            MxfError::InvalidDependency(_) => ErrorKind::InvalidDependency,
            MxfError::CyclicDependency(_) => ErrorKind::CyclicDependency,
            MxfError::InvalidRelationship(_) => ErrorKind::InvalidRelationship,
            MxfError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            MxfError::Timeout(_) => ErrorKind::Timeout,
            MxfError::SandboxFailure(_) => ErrorKind::SandboxFailure,
            MxfError::StorageFailure(_) => ErrorKind::StorageFailure,
            MxfError::Conflict(_) => ErrorKind::Conflict,
        }
    }

    /// HTTP status per spec §7's mapping table.
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidRequest
            | ErrorKind::InvalidTransition
            | ErrorKind::InvalidDependency
            | ErrorKind::CyclicDependency
            | ErrorKind::InvalidRelationship => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::ProviderUnavailable => 503,
            ErrorKind::Timeout => 504,
            ErrorKind::SandboxFailure | ErrorKind::StorageFailure => 500,
        }
    }
}

pub type MxfResult<T> = Result<T, MxfError>;
