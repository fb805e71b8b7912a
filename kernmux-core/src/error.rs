//! Error types for kernmux-core

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::session::SessionKey;

/// Top-level error type for kernmux-core
#[derive(Error, Debug)]
pub enum MuxError {
    #[error("Binding failed: {0}")]
    Binding(#[from] BindingError),

    #[error("Processing failed: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Kernel or document construction failed while creating a session.
///
/// A session is never registered when this is returned.
#[derive(Error, Debug)]
pub enum BindingError {
    #[error("kernel: {0}")]
    Kernel(#[from] KernelError),

    #[error("document: {0}")]
    Document(#[from] DocumentError),
}

/// Errors from the kernel manager, port allocation, or a live kernel
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("No free ports in range {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("Kernel failed to start: {0}")]
    StartFailed(String),

    #[error("Failed to send to kernel {kernel_id}: {reason}")]
    SendFailed { kernel_id: String, reason: String },

    #[error("Kernel {0} has shut down")]
    Closed(String),
}

/// Errors from document storage
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document not found: {0}")]
    NotFound(PathBuf),

    #[error("Document path escapes the store root: {0}")]
    InvalidPath(PathBuf),

    #[error("Failed to read document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Inconsistent document {path}: worksheet references missing cell {cell_id}")]
    Inconsistent { path: PathBuf, cell_id: String },
}

/// Error raised by a single processor
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("{0}")]
    Failed(String),
}

/// A processor aborted the chain; the message was dropped
#[derive(Error, Debug)]
#[error("processor '{processor}' failed: {source}")]
pub struct ProcessingError {
    pub processor: String,
    #[source]
    pub source: ProcessorError,
}

/// Errors related to session lookup and use
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    UnknownSession(SessionKey),

    #[error("Session {0} is closed")]
    Closed(SessionKey),
}

/// Errors from a client connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection is closed")]
    Closed,

    #[error("Failed to send: {0}")]
    SendFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_exhausted_names_range() {
        let error = KernelError::PortsExhausted {
            start: 50000,
            end: 50001,
        };
        assert!(error.to_string().contains("50000-50001"));
    }

    #[test]
    fn processing_error_names_processor() {
        let error = ProcessingError {
            processor: "drop_types".to_string(),
            source: ProcessorError::Failed("boom".to_string()),
        };
        let text = error.to_string();
        assert!(text.contains("drop_types"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn unknown_session_displays_key() {
        let error = SessionError::UnknownSession(SessionKey::from("abc"));
        assert!(error.to_string().contains("abc"));
    }

    #[test]
    fn binding_error_converts_from_kernel_error() {
        let error: BindingError = KernelError::StartFailed("no python".to_string()).into();
        assert!(matches!(error, BindingError::Kernel(_)));

        let mux: MuxError = error.into();
        assert!(matches!(mux, MuxError::Binding(BindingError::Kernel(_))));
    }

    #[test]
    fn binding_error_converts_from_document_error() {
        let error: BindingError = DocumentError::NotFound(PathBuf::from("a.json")).into();
        assert!(error.to_string().contains("a.json"));
    }
}
