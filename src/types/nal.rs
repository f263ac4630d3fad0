//! NAL unit types

use bytes::Bytes;

/// H.264 NAL unit type, taken from the low 5 bits of the NAL header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalType {
    /// Coded slice of a non-IDR picture (type 1)
    NonIdrSlice,
    /// Coded slice of an IDR picture, i.e. a keyframe (type 5)
    IdrSlice,
    /// Sequence parameter set (type 7)
    Sps,
    /// Picture parameter set (type 8)
    Pps,
    /// Any other type value
    Other(u8),
}

impl NalType {
    /// Classify a NAL header byte
    pub fn from_header_byte(byte: u8) -> Self {
        match byte & 0x1F {
            1 => NalType::NonIdrSlice,
            5 => NalType::IdrSlice,
            7 => NalType::Sps,
            8 => NalType::Pps,
            other => NalType::Other(other),
        }
    }

    /// Raw 5-bit type value
    pub fn as_u8(self) -> u8 {
        match self {
            NalType::NonIdrSlice => 1,
            NalType::IdrSlice => 5,
            NalType::Sps => 7,
            NalType::Pps => 8,
            NalType::Other(value) => value,
        }
    }

    /// Slice types the resynchronizer accepts as a NAL start
    pub fn is_slice(self) -> bool {
        matches!(self, NalType::NonIdrSlice | NalType::IdrSlice)
    }
}

/// A length-prefixed NAL unit as read from the capture stream.
///
/// The payload keeps its 4-byte big-endian length prefix, so the NAL header
/// byte always sits at [`NalUnit::HEADER_OFFSET`]. This is the AVCC layout FLV
/// expects for AVC NALU packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    length: u32,
    payload: Bytes,
}

impl NalUnit {
    /// Size of the big-endian length prefix
    pub const PREFIX_SIZE: usize = 4;

    /// Offset of the NAL header byte inside the payload
    pub const HEADER_OFFSET: usize = Self::PREFIX_SIZE;

    /// Wrap a prefixed payload. `payload` must hold at least the prefix.
    pub(crate) fn from_prefixed(payload: Bytes) -> Self {
        debug_assert!(payload.len() >= Self::PREFIX_SIZE);
        let length = (payload.len() - Self::PREFIX_SIZE) as u32;
        Self { length, payload }
    }

    /// Declared length, excluding the prefix
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Prefix plus NAL bytes
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the unit, returning the prefixed payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// NAL header byte, absent for zero-length units
    pub fn header_byte(&self) -> Option<u8> {
        self.payload.get(Self::HEADER_OFFSET).copied()
    }

    /// NAL type; zero-length units report type 0
    pub fn nal_type(&self) -> NalType {
        NalType::from_header_byte(self.header_byte().unwrap_or(0))
    }

    /// Whether this unit is an IDR slice
    pub fn is_keyframe(&self) -> bool {
        self.nal_type() == NalType::IdrSlice
    }

    /// Whether the unit carries no NAL bytes
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nal_type_uses_low_five_bits() {
        assert_eq!(NalType::from_header_byte(0x65), NalType::IdrSlice);
        assert_eq!(NalType::from_header_byte(0x41), NalType::NonIdrSlice);
        assert_eq!(NalType::from_header_byte(0x67), NalType::Sps);
        assert_eq!(NalType::from_header_byte(0x68), NalType::Pps);
        assert_eq!(NalType::from_header_byte(0x06), NalType::Other(6));
        assert_eq!(NalType::from_header_byte(0xE5).as_u8(), 5);
    }

    #[test]
    fn unit_exposes_prefix_and_type() {
        let unit = NalUnit::from_prefixed(Bytes::from_static(&[0, 0, 0, 3, 0x65, 0x88, 0x84]));
        assert_eq!(unit.length(), 3);
        assert_eq!(unit.payload().len(), 7);
        assert!(unit.is_keyframe());
        assert!(!unit.is_empty());
    }

    #[test]
    fn empty_unit_has_type_zero() {
        let unit = NalUnit::from_prefixed(Bytes::from_static(&[0, 0, 0, 0]));
        assert!(unit.is_empty());
        assert_eq!(unit.header_byte(), None);
        assert_eq!(unit.nal_type(), NalType::Other(0));
    }
}
