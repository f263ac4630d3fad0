//! Error types for the packetizer.
//!
//! Every failure the packetizer can report is a variant of [`PacketizerError`].
//! Errors fall in three groups:
//!
//! - **Fatal**: the session cannot continue (`StreamFormat`, `MissingParameterSet`,
//!   `TooManyErrors`, `Config`, `Worker`)
//! - **Terminal**: the session ends normally (`EndOfStream`, `Cancelled`)
//! - **Recoverable**: handled inside the run loop (`InvalidNaluLength`, `Io`, `Sink`)
//!
//! ```rust
//! use avcflv::PacketizerError;
//!
//! let error = PacketizerError::missing_parameter_set("SPS is empty");
//! assert!(error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for packetizer operations.
pub type Result<T, E = PacketizerError> = std::result::Result<T, E>;

/// Main error type for packetizer operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PacketizerError {
    #[error("Payload marker {marker:?} not found after {bytes_scanned} bytes")]
    StreamFormat {
        marker: String,
        bytes_scanned: u64,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("End of stream: expected {expected} bytes, received {received}")]
    EndOfStream { expected: usize, received: usize },

    #[error("Invalid NAL unit length {length} (max {max})")]
    InvalidNaluLength { length: u32, max: u32 },

    #[error("Missing parameter set: {reason}")]
    MissingParameterSet { reason: String },

    #[error("Source read failed")]
    Io(#[source] std::io::Error),

    #[error("Giving up after {count} consecutive errors")]
    TooManyErrors {
        count: u32,
        #[source]
        last: Box<PacketizerError>,
    },

    #[error("Frame sink failed: {reason}")]
    Sink {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Worker task failed: {reason}")]
    Worker { reason: String },

    #[error("Invalid configuration: {details}")]
    Config { details: String },
}

impl PacketizerError {
    /// Returns whether this error ends the session with a failure.
    pub fn is_fatal(&self) -> bool {
        match self {
            PacketizerError::StreamFormat { .. } => true,
            PacketizerError::MissingParameterSet { .. } => true,
            PacketizerError::TooManyErrors { .. } => true,
            PacketizerError::Worker { .. } => true,
            PacketizerError::Config { .. } => true,
            PacketizerError::EndOfStream { .. } => false,
            PacketizerError::InvalidNaluLength { .. } => false,
            PacketizerError::Io(_) => false,
            PacketizerError::Sink { .. } => false,
            PacketizerError::Timeout { .. } => false,
            PacketizerError::Cancelled => false,
        }
    }

    /// Returns whether the run loop can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PacketizerError::InvalidNaluLength { .. }
                | PacketizerError::Io(_)
                | PacketizerError::Sink { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PacketizerError::StreamFormat { .. } => vec![
                "Check the source is an MP4/3GPP recording",
                "Verify the payload marker in the configuration",
                "Make sure the encoder writes the mdat box before streaming",
            ],
            PacketizerError::EndOfStream { .. } => vec![
                "Check the recorder is still running",
                "Restart the session once the source produces data again",
            ],
            PacketizerError::InvalidNaluLength { .. } => vec![
                "Ensure the encoder emits 4-byte length prefixes",
                "Raise max_nalu_length for high bitrate streams",
            ],
            PacketizerError::MissingParameterSet { .. } => vec![
                "Call set_parameter_sets before the first keyframe",
                "Verify SPS and PPS are non-empty",
            ],
            PacketizerError::Io(_) => {
                vec!["Check the source device or pipe", "Verify read permissions"]
            }
            PacketizerError::TooManyErrors { .. } => vec![
                "Inspect the last error for the root cause",
                "Increase max_consecutive_errors for flaky sources",
            ],
            PacketizerError::Sink { .. } => vec![
                "Check the transport connection",
                "Verify the sink consumes frames fast enough",
            ],
            PacketizerError::Timeout { .. } => vec![
                "Increase stop_grace_ms",
                "Make sure the frame sink is not blocking",
            ],
            PacketizerError::Cancelled => vec!["Start a new session"],
            PacketizerError::Worker { .. } => vec!["Check logs for the worker panic"],
            PacketizerError::Config { .. } => vec![
                "Check configuration values",
                "Compare against PacketizerConfig::default()",
            ],
        }
    }

    /// Helper constructor for stream format errors.
    pub fn stream_format(marker: &[u8], bytes_scanned: u64, source: Option<std::io::Error>) -> Self {
        PacketizerError::StreamFormat {
            marker: String::from_utf8_lossy(marker).into_owned(),
            bytes_scanned,
            source,
        }
    }

    /// Helper constructor for missing parameter set errors.
    pub fn missing_parameter_set(reason: impl Into<String>) -> Self {
        PacketizerError::MissingParameterSet { reason: reason.into() }
    }

    /// Helper constructor for sink errors.
    pub fn sink_failed(reason: impl Into<String>) -> Self {
        PacketizerError::Sink { reason: reason.into(), source: None }
    }

    /// Helper constructor for sink errors with source.
    pub fn sink_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        PacketizerError::Sink { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(details: impl Into<String>) -> Self {
        PacketizerError::Config { details: details.into() }
    }
}

impl From<std::io::Error> for PacketizerError {
    fn from(err: std::io::Error) -> Self {
        PacketizerError::Io(err)
    }
}

impl From<serde_yaml_ng::Error> for PacketizerError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        PacketizerError::Config { details: err.to_string() }
    }
}
