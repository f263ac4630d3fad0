//! Packetizer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{PacketizerError, Result};

/// Largest NAL unit length accepted before the stream is considered out of sync.
pub const MAX_VALID_NALU_LENGTH: u32 = 100_000;

/// Transport MTU used for pass-through diagnostics.
pub const DEFAULT_MTU: usize = 1400;

/// Tunables owned by the packetizer and handed to every session it starts.
///
/// All fields have defaults, so a YAML document only needs the values it changes:
///
/// ```rust
/// use avcflv::PacketizerConfig;
///
/// let config = PacketizerConfig::from_yaml_str("max_nalu_length: 250000\n").unwrap();
/// assert_eq!(config.max_nalu_length, 250_000);
/// assert_eq!(config.payload_marker, "mdat");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketizerConfig {
    /// Declared lengths above this trigger resynchronization
    pub max_nalu_length: u32,

    /// Frames larger than this are passed through unsplit (logged only)
    pub mtu: usize,

    /// Four-byte container marker preceding the NAL stream
    pub payload_marker: String,

    /// How long `stop` waits for the worker to exit
    pub stop_grace_ms: u64,

    /// Consecutive source errors tolerated before the session fails
    pub max_consecutive_errors: u32,

    /// Base delay between retries after a source error
    pub error_backoff_ms: u64,
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        Self {
            max_nalu_length: MAX_VALID_NALU_LENGTH,
            mtu: DEFAULT_MTU,
            payload_marker: "mdat".to_string(),
            stop_grace_ms: 1000,
            max_consecutive_errors: 10,
            error_backoff_ms: 50,
        }
    }
}

impl PacketizerConfig {
    /// Parse and validate a configuration from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: PacketizerConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values describe a usable session
    pub fn validate(&self) -> Result<()> {
        if self.max_nalu_length == 0 || self.max_nalu_length > i32::MAX as u32 {
            return Err(PacketizerError::config_error(format!(
                "max_nalu_length must be in 1..={}, got {}",
                i32::MAX,
                self.max_nalu_length
            )));
        }
        if self.payload_marker.len() != 4 {
            return Err(PacketizerError::config_error(format!(
                "payload_marker must be exactly 4 bytes, got {:?}",
                self.payload_marker
            )));
        }
        if self.max_consecutive_errors == 0 {
            return Err(PacketizerError::config_error("max_consecutive_errors must be at least 1"));
        }
        Ok(())
    }

    /// Marker as raw bytes
    ///
    /// Only meaningful after [`validate`](Self::validate) has accepted the config.
    pub fn marker(&self) -> [u8; 4] {
        let mut marker = [0u8; 4];
        for (dst, src) in marker.iter_mut().zip(self.payload_marker.bytes()) {
            *dst = src;
        }
        marker
    }

    /// Grace period for `stop`
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Backoff before the next attempt after `error_count` consecutive failures
    pub fn backoff(&self, error_count: u32) -> Duration {
        Duration::from_millis(self.error_backoff_ms.saturating_mul(1 << error_count.min(5)))
    }
}
