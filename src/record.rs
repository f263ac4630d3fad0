//! AVC decoder configuration record
//!
//! Layout written by [`encode_configuration_record`]:
//!
//! | Bytes | Field |
//! |---|---|
//! | 1 | configurationVersion = 1 |
//! | 1 | AVCProfileIndication = `sps[1]` |
//! | 1 | profile_compatibility = `sps[2]` |
//! | 1 | AVCLevelIndication = `sps[3]` |
//! | 1 | `0xFF`: 6 reserved bits, lengthSizeMinusOne = 3 |
//! | 1 | `0xE1`: 3 reserved bits, numOfSequenceParameterSets = 1 |
//! | 2 | SPS length, big-endian |
//! | n | SPS |
//! | 1 | numOfPictureParameterSets = 1 |
//! | 2 | PPS length, big-endian |
//! | m | PPS |

use bytes::{BufMut, Bytes, BytesMut};

use crate::types::ParameterSets;
use crate::{PacketizerError, Result};

/// configurationVersion
pub const CONFIGURATION_VERSION: u8 = 1;

/// Reserved bits plus lengthSizeMinusOne = 3 (4-byte NAL length prefixes)
pub const LENGTH_SIZE_MINUS_ONE_BYTE: u8 = 0xFF;

/// Reserved bits plus a single SPS
pub const SPS_COUNT_BYTE: u8 = 0xE1;

/// Encode the configuration record for an SPS/PPS pair.
///
/// Both sets are raw NAL units without length prefixes. The SPS must carry at
/// least the header, profile, compatibility and level bytes.
///
/// ```rust
/// use avcflv::record::encode_configuration_record;
///
/// let record = encode_configuration_record(&[0x67, 0x42, 0x00, 0x1E, 0x01], &[0x68, 0xCE, 0x3C, 0x80])
///     .unwrap();
/// assert_eq!(&record[..4], &[0x01, 0x42, 0x00, 0x1E]);
/// ```
pub fn encode_configuration_record(sps: &[u8], pps: &[u8]) -> Result<Bytes> {
    if sps.is_empty() {
        return Err(PacketizerError::missing_parameter_set("SPS is empty"));
    }
    if pps.is_empty() {
        return Err(PacketizerError::missing_parameter_set("PPS is empty"));
    }
    if sps.len() < 4 {
        return Err(PacketizerError::missing_parameter_set(format!(
            "SPS too short for profile/level ({} bytes)",
            sps.len()
        )));
    }
    let sps_len = u16::try_from(sps.len()).map_err(|_| {
        PacketizerError::missing_parameter_set(format!("SPS too large ({} bytes)", sps.len()))
    })?;
    let pps_len = u16::try_from(pps.len()).map_err(|_| {
        PacketizerError::missing_parameter_set(format!("PPS too large ({} bytes)", pps.len()))
    })?;

    let mut record = BytesMut::with_capacity(11 + sps.len() + pps.len());
    record.put_u8(CONFIGURATION_VERSION);
    record.put_u8(sps[1]);
    record.put_u8(sps[2]);
    record.put_u8(sps[3]);
    record.put_u8(LENGTH_SIZE_MINUS_ONE_BYTE);
    record.put_u8(SPS_COUNT_BYTE);
    record.put_u16(sps_len);
    record.put_slice(sps);
    record.put_u8(1);
    record.put_u16(pps_len);
    record.put_slice(pps);

    Ok(record.freeze())
}

impl ParameterSets {
    /// Encode these sets as a configuration record
    pub fn configuration_record(&self) -> Result<Bytes> {
        encode_configuration_record(&self.sps, &self.pps)
    }
}
