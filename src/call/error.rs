// Call error types and result aliases

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::CallPhase;

/// Result type for call operations
pub type CallResult<T> = Result<T, CallError>;

/// Failure reported by a device backend before classification.
///
/// Native backends surface `std::io::Error`s (v4l, ALSA, ...); bridged
/// platforms report a named failure such as `NotAllowedError`.
#[derive(Debug, Error)]
pub enum DeviceFailure {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{name}: {message}")]
    Named { name: String, message: String },
}

impl DeviceFailure {
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Named {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Local media acquisition failures.
///
/// Closed set: every device failure is folded into one of these by
/// [`MediaError::classify`], the only place that inspects backend errors.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MediaError {
    /// The user declined camera/microphone access
    #[error("camera or microphone access was denied")]
    PermissionDenied,

    /// No camera or microphone is present
    #[error("no camera or microphone was found")]
    NoDeviceFound,

    /// The platform cannot capture audio/video at all
    #[error("this platform does not support camera or microphone capture")]
    Unsupported,

    /// Anything else, message kept verbatim for diagnostics
    #[error("media error: {0}")]
    Unknown(String),
}

impl MediaError {
    /// Fold a backend failure into the media error taxonomy.
    pub fn classify(failure: &DeviceFailure) -> Self {
        match failure {
            DeviceFailure::Io(err) => match err.kind() {
                std::io::ErrorKind::PermissionDenied => MediaError::PermissionDenied,
                std::io::ErrorKind::NotFound => MediaError::NoDeviceFound,
                std::io::ErrorKind::Unsupported => MediaError::Unsupported,
                _ => MediaError::Unknown(err.to_string()),
            },
            DeviceFailure::Named { name, message } => match name.as_str() {
                "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
                    MediaError::PermissionDenied
                }
                "NotFoundError" | "DevicesNotFoundError" | "OverconstrainedError" => {
                    MediaError::NoDeviceFound
                }
                "NotSupportedError" | "TypeError" => MediaError::Unsupported,
                _ if message.is_empty() => MediaError::Unknown(name.clone()),
                _ => MediaError::Unknown(message.clone()),
            },
        }
    }

    /// Whether restarting the pipeline could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MediaError::Unknown(_))
    }
}

/// Why the connection ended up in the `failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FailureReason {
    #[error(transparent)]
    Media(#[from] MediaError),

    /// The peer connection could not be established or was lost for good
    #[error("connection failed: {0}")]
    Transport(String),
}

impl FailureReason {
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureReason::Media(err) => err.is_retryable(),
            FailureReason::Transport(_) => true,
        }
    }
}

/// Errors returned by the session connection manager and its components
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("cannot {operation} while the call is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: CallPhase,
    },

    #[error("retry is not available for this failure")]
    RetryUnavailable,

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("feedback for this session was already recorded")]
    FeedbackAlreadyRecorded,

    #[error("incoming call was already answered")]
    AlreadyAnswered,

    #[error("call attempt was torn down")]
    Cancelled,

    #[error("feedback store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CallError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub(crate) fn invalid_phase(operation: &'static str, phase: CallPhase) -> Self {
        Self::InvalidPhase { operation, phase }
    }
}
