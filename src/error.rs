//! Error types and handling for the expiring-document toolkit

use std::{io, result::Result as StdResult};

use thiserror::Error;
use tokio::task::JoinError;

/// Custom result type for pdfgate operations
pub type Result<T> = StdResult<T, Error>;

/// Core error type for pdfgate operations
#[derive(Error, Debug)]
#[non_exhaustive]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("PDF structure error: {0}")]
    StructureError(#[from] StructureError),

    #[error("PDF error: {0}")]
    PdfError(#[from] lopdf::Error),

    #[error("Gate error: {0}")]
    GateError(#[from] GateError),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Document already protected: {0}")]
    AlreadyProtected(String),

    #[error("Concurrency error: {0}")]
    ConcurrencyError(String),
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Error::ConcurrencyError(err.to_string())
    }
}

// -------------------- Sub-Error Categories --------------------

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StructureError {
    #[error("Missing required object: {0}")]
    MissingObject(String),

    #[error("Invalid page tree: {0}")]
    InvalidPageTree(String),

    #[error("Corrupted structure: {0}")]
    Corrupted(String),
}

/// Failures observed while the gate runs inside a host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    /// A host primitive is absent. Consumed by fallback logic, never shown.
    #[error("Host capability missing: {0}")]
    CapabilityMissing(&'static str),

    #[error("Clock or timestamp failure: {0}")]
    ClockOrParseFailure(String),

    #[error("Unexpected runtime error: {0}")]
    UnexpectedRuntime(String),
}

impl GateError {
    pub fn is_capability_missing(&self) -> bool {
        matches!(self, GateError::CapabilityMissing(_))
    }

    /// Message body shown to the user, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            GateError::CapabilityMissing(name) => name,
            GateError::ClockOrParseFailure(msg) | GateError::UnexpectedRuntime(msg) => msg,
        }
    }
}
