//! Error types for decklens.

use thiserror::Error;

use crate::models::FileSlot;

/// Result type alias using decklens's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for decklens operations.
///
/// Variants fall into three groups: client-side validation (never reaches the
/// network), submission and transport failures, and job failures reported by
/// the processing server.
#[derive(Error, Debug)]
pub enum Error {
    /// File extension does not match the slot it was offered to
    #[error("Invalid {slot} file \"{file_name}\": expected a .{expected} file")]
    InvalidFile {
        slot: FileSlot,
        file_name: String,
        expected: &'static str,
    },

    /// File exceeds the configured upload limit
    #[error("{slot} file \"{file_name}\" is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge {
        slot: FileSlot,
        file_name: String,
        size: u64,
        limit: u64,
    },

    /// A required file has not been selected
    #[error("Please select a {0} file")]
    MissingFile(FileSlot),

    /// Tag prefix is empty after sanitization
    #[error("Please enter a tag prefix")]
    EmptyTagPrefix,

    /// A submission is already in flight
    #[error("A deck is already being processed")]
    Busy,

    /// Server answered with a non-success status
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Submission succeeded but no job identifier came back
    #[error("Server did not return a job identifier")]
    MissingJobId,

    /// Job reported failure or could not be tracked
    #[error("Job error: {0}")]
    Job(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors raised before any network traffic.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidFile { .. }
                | Error::FileTooLarge { .. }
                | Error::MissingFile(_)
                | Error::EmptyTagPrefix
                | Error::Busy
                | Error::InvalidInput(_)
        )
    }

    /// Transient errors are retried by the polling loop instead of ending it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Request(_) | Error::Serialization(_) | Error::Server { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Serialization(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}
