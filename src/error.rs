//! Error types for capture sessions, template loading and searching
//!
//! Every failure the engine can report is a variant of [`ScoutError`]. Each
//! variant carries enough context to build a user-facing message, a stable
//! negative integer code for the boundary API, an [`ErrorCategory`] for
//! grouping, and a remediation hint.
//!
//! Input problems during a search (stale handle, bad ROI, undecodable source)
//! never surface here: they resolve to a not-found result instead.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result type alias for engine operations
pub type ScoutResult<T> = Result<T, ScoutError>;

/// High-level error category for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Target not found (process, window, template file)
    NotFound,
    /// Invalid parameters or unusable input
    InvalidInput,
    /// Backend or platform capability not available
    Unavailable,
    /// Operation timed out
    Timeout,
    /// Another session lifecycle operation is in flight
    Busy,
    /// I/O or OS-level failure
    SystemError,
    /// Decoding, encoding or conversion failure
    ProcessingError,
}

/// Comprehensive error type for the capture and search engine
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    /// Template path is empty, missing or unreadable
    #[error("Template path '{}' is invalid: {reason}", path.display())]
    TemplatePathInvalid {
        /// Path that was requested
        path:   PathBuf,
        /// Why it could not be read
        reason: String,
    },

    /// Template file exists but could not be decoded
    #[error("Failed to decode template '{}': {reason}", path.display())]
    TemplateDecodeFailed {
        /// Path that was decoded
        path:   PathBuf,
        /// Decoder message
        reason: String,
    },

    /// Template decoded to an image with no pixels
    #[error("Template '{}' is an empty image", path.display())]
    TemplateEmpty {
        /// Path that was decoded
        path: PathBuf,
    },

    /// No process matches the target descriptor
    #[error("No process matches target {target}")]
    ProcessNotFound {
        /// Human-readable target description
        target: String,
    },

    /// Matching processes exist but none owns a visible window
    #[error("No visible window found for target {target}")]
    WindowNotFound {
        /// Human-readable target description
        target: String,
    },

    /// Target window was closed during capture
    #[error("Target window was closed or became invalid during capture")]
    WindowClosed,

    /// A session start or stop is already in progress
    #[error("Capture session is busy ({phase})")]
    SessionBusy {
        /// Phase the session was in when the call arrived
        phase: String,
    },

    /// A session start was cancelled by a concurrent stop
    #[error("Capture session start was cancelled")]
    SessionCancelled,

    /// One step of the capture resource pipeline failed
    #[error("Capture initialization failed at '{stage}': {reason}")]
    CaptureInitFailed {
        /// Pipeline step that failed
        stage:  &'static str,
        /// Underlying failure
        reason: String,
    },

    /// Capture operation timed out
    #[error("Capture operation timed out after {duration_ms}ms")]
    CaptureTimeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// Requested backend is not available
    #[error("Capture backend '{backend}' is not available on this platform")]
    BackendNotAvailable {
        /// Backend name
        backend: String,
    },

    /// Invalid parameter provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Name of the invalid parameter
        parameter: String,
        /// Reason why it's invalid
        reason:    String,
    },

    /// Pixel data could not be interpreted or converted
    #[error("Image processing error: {0}")]
    ImageError(String),

    /// Image encoding failed
    #[error("Failed to encode image as {format}: {reason}")]
    EncodingFailed {
        /// Image format that failed
        format: String,
        /// Reason for encoding failure
        reason: String,
    },

    /// I/O error occurred
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ScoutError {
    /// Creates an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        ScoutError::InvalidParameter {
            parameter: parameter.into(),
            reason:    reason.into(),
        }
    }

    /// Creates a capture pipeline failure for the given step
    pub fn init_failed(stage: &'static str, reason: impl std::fmt::Display) -> Self {
        ScoutError::CaptureInitFailed {
            stage,
            reason: reason.to_string(),
        }
    }

    /// Stable negative code reported across the boundary API
    ///
    /// Template-load failures use `-1` (bad path), `-2` (decode failure) and
    /// `-3` (empty image), so `LoadTemplate` can return the code in place of a
    /// handle.
    ///
    /// # Examples
    ///
    /// ```
    /// use screenscout::error::ScoutError;
    ///
    /// let error = ScoutError::TemplateEmpty { path: "blank.png".into() };
    /// assert_eq!(error.code(), -3);
    /// ```
    pub fn code(&self) -> i32 {
        match self {
            ScoutError::TemplatePathInvalid { .. } => -1,
            ScoutError::TemplateDecodeFailed { .. } => -2,
            ScoutError::TemplateEmpty { .. } => -3,
            ScoutError::ProcessNotFound { .. } => -10,
            ScoutError::WindowNotFound { .. } => -11,
            ScoutError::WindowClosed => -12,
            ScoutError::SessionBusy { .. } => -20,
            ScoutError::SessionCancelled => -21,
            ScoutError::CaptureInitFailed { .. } => -30,
            ScoutError::CaptureTimeout { .. } => -31,
            ScoutError::BackendNotAvailable { .. } => -32,
            ScoutError::InvalidParameter { .. } => -40,
            ScoutError::ImageError(_) => -41,
            ScoutError::EncodingFailed { .. } => -42,
            ScoutError::IoError(_) => -50,
        }
    }

    /// Category used for grouping and structured reports
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScoutError::TemplatePathInvalid { .. }
            | ScoutError::ProcessNotFound { .. }
            | ScoutError::WindowNotFound { .. }
            | ScoutError::WindowClosed => ErrorCategory::NotFound,
            ScoutError::InvalidParameter { .. } => ErrorCategory::InvalidInput,
            ScoutError::BackendNotAvailable { .. } | ScoutError::CaptureInitFailed { .. } => {
                ErrorCategory::Unavailable
            }
            ScoutError::CaptureTimeout { .. } => ErrorCategory::Timeout,
            ScoutError::SessionBusy { .. } | ScoutError::SessionCancelled => ErrorCategory::Busy,
            ScoutError::IoError(_) => ErrorCategory::SystemError,
            ScoutError::TemplateDecodeFailed { .. }
            | ScoutError::TemplateEmpty { .. }
            | ScoutError::ImageError(_)
            | ScoutError::EncodingFailed { .. } => ErrorCategory::ProcessingError,
        }
    }

    /// Whether retrying the same operation may succeed
    ///
    /// Capture loops use this to decide between backing off and giving up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScoutError::CaptureTimeout { .. }
                | ScoutError::SessionBusy { .. }
                | ScoutError::SessionCancelled
                | ScoutError::ImageError(_)
        )
    }

    /// Returns an actionable remediation hint for this error
    pub fn remediation_hint(&self) -> &str {
        match self {
            ScoutError::TemplatePathInvalid { .. } => {
                "Check that the template path exists and is readable by the current user."
            }
            ScoutError::TemplateDecodeFailed { .. } => {
                "The template file could not be decoded. Use a PNG, JPEG, BMP or WebP image."
            }
            ScoutError::TemplateEmpty { .. } => {
                "The template image has zero width or height. Crop a non-empty reference image."
            }
            ScoutError::ProcessNotFound { .. } => {
                "No running process matched. Check the executable name (e.g. 'notepad.exe') or \
                 the process id."
            }
            ScoutError::WindowNotFound { .. } => {
                "The process is running but has no visible top-level window. Restore or un-minimize \
                 the application window and retry."
            }
            ScoutError::WindowClosed => {
                "The target window was closed or destroyed. Start a new capture session once the \
                 window is open again."
            }
            ScoutError::SessionBusy { .. } => {
                "Another start or stop is in progress. Wait for it to finish before retrying."
            }
            ScoutError::SessionCancelled => {
                "The session start was cancelled by a stop request. Start the session again."
            }
            ScoutError::CaptureInitFailed { .. } => {
                "The capture resource could not be created. Try the poll capture mode, which does \
                 not depend on Windows Graphics Capture."
            }
            ScoutError::CaptureTimeout { .. } => {
                "No frame arrived in time. The window may be minimized or not rendering. Increase \
                 SCREENSCOUT_FIRST_FRAME_TIMEOUT_MS or retry."
            }
            ScoutError::BackendNotAvailable { .. } => {
                "Window capture is only available on Windows. Static-image search works on every \
                 platform."
            }
            ScoutError::InvalidParameter { .. } => {
                "Check the parameter value against the API documentation."
            }
            ScoutError::ImageError(_) => {
                "Image processing failed. Ensure the pixel buffer dimensions and stride match the \
                 data."
            }
            ScoutError::EncodingFailed { .. } => {
                "Image encoding failed. Try a different frame encoding (BMP or PNG)."
            }
            ScoutError::IoError(_) => {
                "An I/O error occurred. Check file permissions, disk space, and system resources."
            }
        }
    }

    /// Structured form used by the command-line shell
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code:     self.code(),
            category: self.category(),
            message:  self.to_string(),
            hint:     self.remediation_hint().to_string(),
        }
    }
}

/// Serializable summary of a [`ScoutError`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Boundary error code
    pub code:     i32,
    /// Error category
    pub category: ErrorCategory,
    /// Display message
    pub message:  String,
    /// Remediation hint
    pub hint:     String,
}
