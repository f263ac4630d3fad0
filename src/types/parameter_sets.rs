//! SPS/PPS pair

use bytes::Bytes;

/// Sequence and picture parameter sets, without length prefixes or start codes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSets {
    /// Sequence parameter set NAL unit
    pub sps: Bytes,
    /// Picture parameter set NAL unit
    pub pps: Bytes,
}

impl ParameterSets {
    /// Create a new parameter set pair
    pub fn new(sps: impl Into<Bytes>, pps: impl Into<Bytes>) -> Self {
        Self { sps: sps.into(), pps: pps.into() }
    }

    /// Both sets present
    pub fn is_complete(&self) -> bool {
        !self.sps.is_empty() && !self.pps.is_empty()
    }
}
