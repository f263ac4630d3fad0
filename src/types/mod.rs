//! Core types flowing through the packetizer.
//!
//! - [`NalUnit`] is one length-prefixed unit read from the capture stream
//! - [`NalType`] classifies units by their 5-bit type
//! - [`ParameterSets`] holds the SPS/PPS pair used for the configuration record
//! - [`VideoFrame`] is what the framer hands to the sink, with FLV encoding helpers

mod frame;
mod nal;
mod parameter_sets;

pub use frame::{
    AVC_NALU, AVC_SEQUENCE_HEADER, FLV_CODEC_H264, FLV_FRAME_TYPE_INTERFRAME,
    FLV_FRAME_TYPE_KEYFRAME, FLV_TAG_HEADER_SIZE, FLV_TAG_TYPE_VIDEO, VIDEO_TAG_HEADER_SIZE,
    VideoFrame,
};
pub use nal::{NalType, NalUnit};
pub use parameter_sets::ParameterSets;

/// Space separated hex of at most `limit` leading bytes, for trace logs
pub(crate) fn hex_preview(data: &[u8], limit: usize) -> String {
    let mut out = String::with_capacity(limit.min(data.len()) * 3);
    for (i, byte) in data.iter().take(limit).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02X}", byte));
    }
    if data.len() > limit {
        out.push_str(" ...");
    }
    out
}
