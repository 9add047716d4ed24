//! Error types
//!
//! Defines domain-specific error types for each layer of the share server.
//! The `Display` text of every variant is what the client sees on the
//! control channel, so keep it short and human readable.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Path sandbox errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("No path given.")]
    EmptyPath,

    #[error("Invalid char in given path, aborted.")]
    InvalidCharacters,

    #[error("No such file or directory.")]
    NotFound,

    #[error("Path outside sharing folder, aborted.")]
    OutsideSandbox,
}

/// Storage (filesystem) errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Data channel and framing errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Truncated frame: expected {expected} bytes, received {received}")]
    TruncatedFrame { expected: usize, received: usize },

    #[error("Data connection closed")]
    ConnectionClosed,

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("No data connection arrived within {0} seconds")]
    DataChannelTimeout(u64),

    #[error("No available port for data connection")]
    NoAvailablePort,

    #[error("Failed to bind data listener on {0}: {1}")]
    PortBindingFailed(SocketAddr, #[source] io::Error),

    #[error("Transfer failed: {0}")]
    Io(#[from] io::Error),
}

/// General server error that encompasses all error types
#[derive(Debug, Error)]
pub enum FtpServerError {
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_errors_render_client_text() {
        assert_eq!(SandboxError::EmptyPath.to_string(), "No path given.");
        assert_eq!(
            SandboxError::OutsideSandbox.to_string(),
            "Path outside sharing folder, aborted."
        );
    }

    #[test]
    fn timeout_is_distinct_from_io() {
        let err = TransferError::DataChannelTimeout(5);
        assert_eq!(
            err.to_string(),
            "No data connection arrived within 5 seconds"
        );
    }

    #[test]
    fn umbrella_wraps_layers() {
        let err: FtpServerError = SandboxError::NotFound.into();
        assert!(matches!(err, FtpServerError::Sandbox(SandboxError::NotFound)));
    }
}
