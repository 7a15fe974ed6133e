//! # Decode Error Types
//!
//! Error taxonomy shared by every backend and by the dispatcher.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single backend's reason for not producing a session.
///
/// Collected by the dispatcher and carried inside
/// [`DecodeError::NoDecoderAvailable`] for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    /// Registered backend name (e.g. `"raw"`, `"ffmpeg"`).
    pub backend: String,
    /// Human-readable failure reason.
    pub reason: String,
}

impl BackendFailure {
    pub fn new(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.reason)
    }
}

struct FailureList<'a>(&'a [BackendFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no backends registered");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

/// Errors that can occur while opening or reading an audio stream.
#[derive(Error, Debug)]
pub enum DecodeError {
    // ========================================================================
    // Per-backend errors
    // ========================================================================
    /// The backend cannot handle this file (unsupported codec, malformed
    /// header, file not found).
    #[error("[{backend}] failed to open: {reason}")]
    OpenFailed { backend: String, reason: String },

    /// The stream broke while reading blocks.
    #[error("[{backend}] decoding failed: {reason}")]
    DecodeFailed { backend: String, reason: String },

    /// The backend was expected to work but its runtime dependency is
    /// missing (e.g. the external binary vanished between lookup and exec).
    #[error("[{backend}] backend unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    // ========================================================================
    // Dispatcher errors
    // ========================================================================
    /// Every candidate backend was unavailable or failed to open the file.
    #[error("no decoder available for {}: {}", path.display(), FailureList(failures))]
    NoDecoderAvailable {
        path: PathBuf,
        failures: Vec<BackendFailure>,
    },

    // ========================================================================
    // Generic errors
    // ========================================================================
    /// Decode configuration is invalid.
    #[error("Invalid decode configuration: {0}")]
    InvalidConfig(String),

    /// I/O error outside of any backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub fn open_failed(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        DecodeError::OpenFailed {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn decode_failed(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        DecodeError::DecodeFailed {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        DecodeError::BackendUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error happened while acquiring a stream, so the
    /// dispatcher may try the next backend.
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            DecodeError::OpenFailed { .. } | DecodeError::BackendUnavailable { .. }
        )
    }

    /// Returns `true` for the aggregate "nothing could open this" error.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, DecodeError::NoDecoderAvailable { .. })
    }

    /// Name of the backend that raised this error, if any.
    pub fn backend(&self) -> Option<&str> {
        match self {
            DecodeError::OpenFailed { backend, .. }
            | DecodeError::DecodeFailed { backend, .. }
            | DecodeError::BackendUnavailable { backend, .. } => Some(backend),
            _ => None,
        }
    }

    /// Compact reason string without the backend prefix, used when the
    /// dispatcher records a failure.
    pub(crate) fn reason(&self) -> String {
        match self {
            DecodeError::OpenFailed { reason, .. } => reason.clone(),
            DecodeError::DecodeFailed { reason, .. } => format!("decode failed: {}", reason),
            DecodeError::BackendUnavailable { reason, .. } => format!("unavailable: {}", reason),
            other => other.to_string(),
        }
    }
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;
