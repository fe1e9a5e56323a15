//! Error types for the mod loading library

use std::io;
use thiserror::Error;

/// Result type alias for mod loading operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mod loading operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid storage container format or corrupted blob
    #[error("Invalid storage format: {0}")]
    InvalidStorage(String),

    /// Malformed patch file
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// File not found in a storage container
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Invalid UTF-8 in a stored path
    #[error("Invalid UTF-8 in path")]
    InvalidUtf8,
}

impl Error {
    /// Create a new InvalidStorage error
    pub fn invalid_storage<S: Into<String>>(msg: S) -> Self {
        Error::InvalidStorage(msg.into())
    }

    /// Create a new InvalidPatch error
    pub fn invalid_patch<S: Into<String>>(msg: S) -> Self {
        Error::InvalidPatch(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::invalid_patch("truncated record");
        assert_eq!(err.to_string(), "Invalid patch: truncated record");

        let err = Error::FileNotFound("/data/test.bin".to_string());
        assert_eq!(err.to_string(), "File not found: /data/test.bin");
    }
}
