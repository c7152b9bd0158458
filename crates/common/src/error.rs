//! Error types shared across capsync crates.

use std::path::PathBuf;

/// Top-level error type for capsync operations.
#[derive(Debug, thiserror::Error)]
pub enum CapsyncError {
    #[error("Recording is already in progress")]
    AlreadyInProgress,

    #[error("No recording in progress (session is {state})")]
    NotRecording { state: String },

    #[error("Backend failed to start recording: {message}")]
    BackendStartFailed { message: String },

    #[error("Could not resolve capture geometry: {message}")]
    GeometryResolutionFailed { message: String },

    #[error("Cursor capture failed: {message}")]
    CursorCaptureFailed { message: String },

    #[error("Worker process exited")]
    WorkerExited,

    #[error("Worker is not ready")]
    WorkerNotReady,

    #[error("Request timeout: {request} (after {timeout_ms}ms)")]
    RequestTimeout { request: String, timeout_ms: u64 },

    #[error("Worker request {request} failed: {message}")]
    WorkerRequestFailed { request: String, message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CapsyncError.
pub type CapsyncResult<T> = Result<T, CapsyncError>;

impl CapsyncError {
    pub fn not_recording(state: impl std::fmt::Display) -> Self {
        Self::NotRecording {
            state: state.to_string(),
        }
    }

    pub fn backend_start(msg: impl Into<String>) -> Self {
        Self::BackendStartFailed {
            message: msg.into(),
        }
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::GeometryResolutionFailed {
            message: msg.into(),
        }
    }

    pub fn cursor_capture(msg: impl Into<String>) -> Self {
        Self::CursorCaptureFailed {
            message: msg.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol {
            message: msg.into(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: msg.into(),
        }
    }

    pub fn request_timeout(request: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request: request.into(),
            timeout_ms,
        }
    }

    pub fn worker_request(request: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::WorkerRequestFailed {
            request: request.into(),
            message: msg.into(),
        }
    }
}
