//! Error types for the rendering pipeline

use crate::request::ImageFormat;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a document
///
/// Only [`Error::Io`] is fatal. Every other variant is recovered inside the
/// pipeline (next backend, skipped format, whole-document capture, preview).
#[derive(Error, Debug)]
pub enum Error {
    /// A backend is not installed or cannot be started
    #[error("Backend '{backend}' unavailable: {reason}")]
    BackendUnavailable { backend: &'static str, reason: String },

    /// Failed to start a backend session
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load the document into the backend
    #[error("Failed to load document: {0}")]
    LoadError(String),

    /// Failed to render content
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Failed to execute JavaScript
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The backend cannot produce the requested output type
    #[error("Backend '{backend}' cannot produce {format}")]
    FormatUnsupported {
        backend: &'static str,
        format: ImageFormat,
    },

    /// Section discovery failed
    #[error("Section partitioning failed: {0}")]
    Partition(String),

    /// The output directory could not be created
    #[error("Failed to create output directory {}: {source}", path.display())]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// An output file could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error must reach the caller instead of being recovered.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_io_is_fatal() {
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        assert!(io.is_fatal());
        assert!(!Error::Timeout(10).is_fatal());
        assert!(!Error::Partition("bad selector".into()).is_fatal());
        let dir = Error::DirectoryCreate {
            path: PathBuf::from("/nope"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!dir.is_fatal());
    }

    #[test]
    fn messages_name_the_backend() {
        let err = Error::FormatUnsupported {
            backend: "wkhtmltox",
            format: ImageFormat::Webp,
        };
        assert_eq!(err.to_string(), "Backend 'wkhtmltox' cannot produce webp");
    }
}
