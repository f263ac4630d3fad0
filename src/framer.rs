//! Frame tagging: timestamps and size chaining

use bytes::Bytes;
use tokio::time::Instant;
use tracing::trace;

use crate::types::{NalUnit, VideoFrame, hex_preview};

/// Turns NAL units and configuration records into [`VideoFrame`]s
///
/// The time base is the instant the first frame is tagged, not the instant the
/// session started, so the first frame always carries timestamp 0.
#[derive(Debug, Clone, Default)]
pub struct FrameTagger {
    time_base: Option<Instant>,
    previous_frame_size: u32,
    frames: u64,
}

impl FrameTagger {
    /// Create a tagger for a new session
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a configuration record. Configuration frames never carry the keyframe flag.
    pub fn configuration(&mut self, record: Bytes) -> VideoFrame {
        self.tag(record, true, false)
    }

    /// Tag a NAL unit, keyframe when it is an IDR slice
    pub fn nal(&mut self, unit: NalUnit) -> VideoFrame {
        let is_keyframe = unit.is_keyframe();
        self.tag(unit.into_payload(), false, is_keyframe)
    }

    /// Tag an arbitrary body at the current time
    pub fn tag(&mut self, body: Bytes, is_configuration: bool, is_keyframe: bool) -> VideoFrame {
        self.tag_at(Instant::now(), body, is_configuration, is_keyframe)
    }

    /// Tag an arbitrary body at `now`
    pub fn tag_at(
        &mut self,
        now: Instant,
        body: Bytes,
        is_configuration: bool,
        is_keyframe: bool,
    ) -> VideoFrame {
        let time_base = *self.time_base.get_or_insert(now);
        // wraps after ~49 days, like the 32-bit FLV timestamp itself
        let timestamp_ms = now.saturating_duration_since(time_base).as_millis() as u32;

        let frame = VideoFrame {
            is_configuration,
            is_keyframe: is_keyframe && !is_configuration,
            timestamp_ms,
            previous_frame_size: self.previous_frame_size,
            composition_time: 0,
            body,
        };

        self.previous_frame_size = frame.body.len() as u32;
        self.frames += 1;

        trace!(
            frame = self.frames,
            timestamp_ms,
            size = frame.body.len(),
            "Video body: {}",
            hex_preview(&frame.body, 64)
        );

        frame
    }

    /// Body size of the last tagged frame
    pub fn previous_frame_size(&self) -> u32 {
        self.previous_frame_size
    }

    /// Frames tagged so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
