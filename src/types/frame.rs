//! Emitted video frames and their FLV encoding

use bytes::{BufMut, Bytes, BytesMut};

/// FLV video codec id for AVC
pub const FLV_CODEC_H264: u8 = 7;

/// FLV frame type for keyframes
pub const FLV_FRAME_TYPE_KEYFRAME: u8 = 1;

/// FLV frame type for inter frames
pub const FLV_FRAME_TYPE_INTERFRAME: u8 = 2;

/// AVC packet type carrying the decoder configuration record
pub const AVC_SEQUENCE_HEADER: u8 = 0;

/// AVC packet type carrying NAL units
pub const AVC_NALU: u8 = 1;

/// FLV tag type for video
pub const FLV_TAG_TYPE_VIDEO: u8 = 9;

/// Bytes preceding `body` in an FLV video tag body
pub const VIDEO_TAG_HEADER_SIZE: usize = 5;

/// Bytes of the generic FLV tag header
pub const FLV_TAG_HEADER_SIZE: usize = 11;

/// One framed video unit, ready for the transport sink.
///
/// Frames are produced in extraction order by the framer; `previous_frame_size`
/// chains each frame to the one before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Body is an AVC decoder configuration record
    pub is_configuration: bool,

    /// Body is an IDR slice
    pub is_keyframe: bool,

    /// Milliseconds since the first frame of the session
    pub timestamp_ms: u32,

    /// Body length of the previous frame in the session (0 for the first)
    pub previous_frame_size: u32,

    /// Composition time offset; streams carry no B-frame reordering info, so always 0
    pub composition_time: i32,

    /// Configuration record, or a NAL unit with its 4-byte length prefix
    pub body: Bytes,
}

impl VideoFrame {
    /// FLV frame type and codec byte
    pub fn flag_byte(&self) -> u8 {
        let frame_type =
            if self.is_keyframe { FLV_FRAME_TYPE_KEYFRAME } else { FLV_FRAME_TYPE_INTERFRAME };
        FLV_CODEC_H264 | (frame_type << 4)
    }

    /// AVC packet type byte
    pub fn packet_type(&self) -> u8 {
        if self.is_configuration { AVC_SEQUENCE_HEADER } else { AVC_NALU }
    }

    /// The 5-byte AVC video tag header: flags, packet type, 24-bit composition time
    pub fn video_tag_header(&self) -> [u8; VIDEO_TAG_HEADER_SIZE] {
        let cts = (self.composition_time as u32).to_be_bytes();
        [self.flag_byte(), self.packet_type(), cts[1], cts[2], cts[3]]
    }

    /// Size of the FLV tag data (video tag header plus body)
    pub fn tag_data_size(&self) -> usize {
        VIDEO_TAG_HEADER_SIZE + self.body.len()
    }

    /// FLV video tag data: header followed by the body
    pub fn tag_body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.tag_data_size());
        buf.put_slice(&self.video_tag_header());
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Complete FLV tag: 11-byte tag header followed by the tag data
    pub fn flv_tag(&self) -> Bytes {
        let data_size = (self.tag_data_size() as u32).to_be_bytes();
        let timestamp = self.timestamp_ms.to_be_bytes();

        let mut buf = BytesMut::with_capacity(FLV_TAG_HEADER_SIZE + self.tag_data_size());
        buf.put_u8(FLV_TAG_TYPE_VIDEO);
        buf.put_slice(&data_size[1..]);
        // lower 24 bits, then the extended high byte
        buf.put_slice(&timestamp[1..]);
        buf.put_u8(timestamp[0]);
        // stream id
        buf.put_slice(&[0, 0, 0]);
        buf.put_slice(&self.video_tag_header());
        buf.put_slice(&self.body);
        buf.freeze()
    }
}
