//! # Pipeline Error Handling
//!
//! This module provides the error taxonomy for the acquisition-upload-poll
//! pipeline, together with classification traits that let each component
//! decide locally whether to retry, drop, or give up.
//!
//! ## Architecture
//!
//! - **Error Types**: One enum, [`PipelineError`], with a variant per failure class
//! - **Error Traits**: [`Retryable`], [`HasSeverity`]
//! - **Error Context**: Timestamp, severity and free-form metadata
//!
//! ## Error Classification
//!
//! | Variant | Handling |
//! |---------|----------|
//! | `TransientNetwork` | retried (bounded in the uploader, next tick in the poller) |
//! | `PermanentUpload` | frame dropped, reported once, pipeline continues |
//! | `CameraUnavailable` | session cannot start; returned to the caller |
//! | `SessionCancelled` | clean teardown signal, never reported as a failure |
//!
//! ## Usage
//!
//! ```rust
//! use ppg_link::error::{PipelineError, Retryable};
//!
//! let error = PipelineError::transient_network("upload_frame", "connection reset")
//!     .with_status(503)
//!     .with_metadata("sequence", "42");
//!
//! assert!(error.is_retryable());
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Debug-level errors that don't affect operation
    Debug,
    /// Warnings that may indicate potential issues
    Warning,
    /// Errors that affect operation but can be recovered from
    Error,
    /// Fatal errors that end the session
    Fatal,
}

/// Metadata about when and where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// When the error occurred
    pub timestamp: SystemTime,
    /// Error severity level
    pub severity: ErrorSeverity,
    /// Additional metadata as key-value pairs
    pub metadata: std::collections::HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            severity: ErrorSeverity::Error,
            metadata: std::collections::HashMap::new(),
        }
    }
}

impl ErrorContext {
    /// Create a new error context
    pub fn new() -> Self {
        Self::default()
    }

    fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Base error type for the pipeline
#[derive(Debug)]
pub enum PipelineError {
    /// Configuration validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// The camera could not be opened or started
    CameraUnavailable {
        camera: String,
        reason: String,
        context: ErrorContext,
    },
    /// Network failure that may succeed on a later attempt
    TransientNetwork {
        operation: String,
        reason: String,
        status: Option<u16>,
        source: Option<Box<dyn StdError + Send + Sync>>,
        context: ErrorContext,
    },
    /// A frame upload failed for good
    PermanentUpload {
        sequence: u64,
        attempts: u32,
        reason: String,
        context: ErrorContext,
    },
    /// The backend answered with something we could not understand
    Protocol {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// A frame could not be encoded for transport
    Encoding {
        sequence: u64,
        source: ppg_encode::EncodeError,
        context: ErrorContext,
    },
    /// Invalid state transitions
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// The session is shutting down; not a failure
    SessionCancelled,
}

impl PipelineError {
    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    /// Create a camera-unavailable error
    pub fn camera_unavailable(camera: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CameraUnavailable {
            camera: camera.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Fatal),
        }
    }

    /// Create a transient network error
    pub fn transient_network(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientNetwork {
            operation: operation.into(),
            reason: reason.into(),
            status: None,
            source: None,
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    /// Create a permanent upload error
    pub fn permanent_upload(sequence: u64, attempts: u32, reason: impl Into<String>) -> Self {
        Self::PermanentUpload {
            sequence,
            attempts,
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a protocol error
    pub fn protocol(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Protocol {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    /// Create an encoding error
    pub fn encoding(sequence: u64, source: ppg_encode::EncodeError) -> Self {
        Self::Encoding {
            sequence,
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create a state error
    pub fn state(
        current_state: impl Into<String>,
        attempted_operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
            context: ErrorContext::new(),
        }
    }

    /// Attach an HTTP status to a network error. No-op on other variants.
    pub fn with_status(mut self, code: u16) -> Self {
        if let Self::TransientNetwork { status, .. } = &mut self {
            *status = Some(code);
        }
        self
    }

    /// Attach an underlying cause to a network error. No-op on other variants.
    pub fn with_source(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        if let Self::TransientNetwork { source, .. } = &mut self {
            *source = Some(Box::new(cause));
        }
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(ctx) = self.context_mut() {
            ctx.metadata.insert(key.into(), value.into());
        }
        self
    }

    /// Get the error context. `SessionCancelled` carries none.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Config { context, .. }
            | Self::CameraUnavailable { context, .. }
            | Self::TransientNetwork { context, .. }
            | Self::PermanentUpload { context, .. }
            | Self::Protocol { context, .. }
            | Self::Encoding { context, .. }
            | Self::State { context, .. }
            | Self::Io { context, .. } => Some(context),
            Self::SessionCancelled => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Self::Config { context, .. }
            | Self::CameraUnavailable { context, .. }
            | Self::TransientNetwork { context, .. }
            | Self::PermanentUpload { context, .. }
            | Self::Protocol { context, .. }
            | Self::Encoding { context, .. }
            | Self::State { context, .. }
            | Self::Io { context, .. } => Some(context),
            Self::SessionCancelled => None,
        }
    }

    /// HTTP status carried by a network error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransientNetwork { status, .. } => *status,
            _ => None,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::CameraUnavailable { .. } => "camera_unavailable",
            Self::TransientNetwork { .. } => "transient_network",
            Self::PermanentUpload { .. } => "permanent_upload",
            Self::Protocol { .. } => "protocol",
            Self::Encoding { .. } => "encoding",
            Self::State { .. } => "state",
            Self::Io { .. } => "io",
            Self::SessionCancelled => "session_cancelled",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config {
                field,
                value,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Configuration error in '{}': {} (value: {})",
                    field, reason, value
                )
            }
            PipelineError::CameraUnavailable { camera, reason, .. } => {
                write!(f, "Camera '{}' unavailable: {}", camera, reason)
            }
            PipelineError::TransientNetwork {
                operation,
                reason,
                status,
                ..
            } => match status {
                Some(code) => write!(
                    f,
                    "Network error during {} (HTTP {}): {}",
                    operation, code, reason
                ),
                None => write!(f, "Network error during {}: {}", operation, reason),
            },
            PipelineError::PermanentUpload {
                sequence,
                attempts,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Frame {} dropped after {} attempt(s): {}",
                    sequence, attempts, reason
                )
            }
            PipelineError::Protocol {
                operation, reason, ..
            } => {
                write!(f, "Protocol error during {}: {}", operation, reason)
            }
            PipelineError::Encoding {
                sequence, source, ..
            } => {
                write!(f, "Failed to encode frame {}: {}", sequence, source)
            }
            PipelineError::State {
                current_state,
                attempted_operation,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Invalid state transition from '{}' when attempting '{}': {}",
                    current_state, attempted_operation, reason
                )
            }
            PipelineError::Io {
                operation, source, ..
            } => {
                write!(f, "I/O error during {}: {}", operation, source)
            }
            PipelineError::SessionCancelled => write!(f, "Session cancelled"),
        }
    }
}

impl StdError for PipelineError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Encoding { source, .. } => Some(source),
            Self::TransientNetwork {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Trait for errors that can be retried
pub trait Retryable {
    /// Check if this error can be retried
    fn is_retryable(&self) -> bool;
}

impl Retryable for PipelineError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. } | Self::Protocol { .. })
    }
}

/// Trait for errors with severity levels
pub trait HasSeverity {
    /// Get the severity level of this error
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for PipelineError {
    fn severity(&self) -> ErrorSeverity {
        self.context()
            .map(|ctx| ctx.severity)
            .unwrap_or(ErrorSeverity::Debug)
    }
}

/// Error classification utilities
pub mod classify {
    use super::*;

    /// HTTP statuses worth another attempt: server errors, request timeout, rate limiting.
    pub fn is_retryable_status(status: u16) -> bool {
        status >= 500 || status == 408 || status == 429
    }

    /// Whether another attempt is worthwhile. An HTTP status, when present,
    /// decides; otherwise the error's own retryability does.
    pub fn should_retry(error: &PipelineError) -> bool {
        match error.status() {
            Some(status) => is_retryable_status(status),
            None => error.is_retryable(),
        }
    }

    /// Check if an error is the teardown signal
    pub fn is_cancellation(error: &PipelineError) -> bool {
        matches!(error, PipelineError::SessionCancelled)
    }

    /// Check if an error ends the session
    pub fn is_fatal(error: &PipelineError) -> bool {
        matches!(
            error,
            PipelineError::Config { .. } | PipelineError::CameraUnavailable { .. }
        ) || error.severity() == ErrorSeverity::Fatal
    }
}

/// Error conversion implementations
impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        Self::protocol("decode_json", error.to_string())
    }
}
