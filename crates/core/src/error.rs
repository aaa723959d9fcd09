//! Error types for resumetest
//!
//! Test outcomes are never errors: a failing test is recorded on the test
//! itself. Everything in here is a problem with registration, the durable
//! store, or the platform.

use thiserror::Error;

use crate::platform::{PlatformError, PropertyError};

/// Result type alias using the resumetest Error
pub type Result<T> = std::result::Result<T, Error>;

/// resumetest error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Out of memory while registering {0}")]
    OutOfMemory(&'static str),

    #[error("Invalid title: {0}")]
    InvalidTitle(String),

    #[error("Duplicate {kind}: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Unknown suite index {0}")]
    UnknownSuite(usize),

    #[error("Registration is closed once a run has started")]
    RegistrationClosed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Context of {size} bytes exceeds the maximum of {max} bytes")]
    ContextTooLarge { size: usize, max: usize },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Configuration parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Configuration write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the durable saved-state record
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to read saved state: {0}")]
    Read(PropertyError),

    #[error("failed to write saved state: {0}")]
    Write(PropertyError),

    #[error("failed to clear saved state: {0}")]
    Clear(PropertyError),

    #[error("saved state is corrupt: {0}")]
    Corrupt(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Registration failed; nothing has run.
    Configuration,
    /// The durable store could not be read or written.
    Persistence,
    /// The reset primitive refused, or an invalid reset was requested.
    Platform,
    Other,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::OutOfMemory(_)
            | Error::InvalidTitle(_)
            | Error::DuplicateName { .. }
            | Error::UnknownSuite(_)
            | Error::RegistrationClosed => ErrorCategory::Configuration,
            Error::Persistence(_) | Error::ContextTooLarge { .. } => ErrorCategory::Persistence,
            Error::Platform(_) | Error::InvalidArgument(_) => ErrorCategory::Platform,
            _ => ErrorCategory::Other,
        }
    }
}
