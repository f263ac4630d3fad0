//! Frame sink trait for the transport side

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::types::VideoFrame;
use crate::{PacketizerError, Result};

/// Trait for whatever delivers finished frames onward (RTMP publisher, muxer, test probe)
///
/// The packetizer awaits `send` for each frame in extraction order and never
/// retries a failed send.
#[async_trait::async_trait]
pub trait FrameSink: Send + 'static {
    /// Deliver one frame
    ///
    /// Returns:
    /// - `Ok(())` - frame accepted
    /// - `Err(PacketizerError::Cancelled)` - the sink is gone for good; the session ends
    /// - `Err(e)` - this frame failed; the session logs it and continues
    async fn send(&mut self, frame: VideoFrame) -> Result<()>;
}

#[async_trait::async_trait]
impl FrameSink for mpsc::Sender<VideoFrame> {
    async fn send(&mut self, frame: VideoFrame) -> Result<()> {
        mpsc::Sender::send(self, frame).await.map_err(|_| PacketizerError::Cancelled)
    }
}

#[async_trait::async_trait]
impl FrameSink for mpsc::UnboundedSender<VideoFrame> {
    async fn send(&mut self, frame: VideoFrame) -> Result<()> {
        mpsc::UnboundedSender::send(self, frame).map_err(|_| PacketizerError::Cancelled)
    }
}

/// Bounded channel whose sending half is a [`FrameSink`]
///
/// The receiving half is a stream of frames in emission order. Dropping it
/// ends the session with `SinkClosed` at the next frame.
pub fn frame_channel(capacity: usize) -> (mpsc::Sender<VideoFrame>, ReceiverStream<VideoFrame>) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame() -> VideoFrame {
        VideoFrame {
            is_configuration: false,
            is_keyframe: true,
            timestamp_ms: 0,
            previous_frame_size: 0,
            composition_time: 0,
            body: Bytes::from_static(&[0, 0, 0, 1, 0x65]),
        }
    }

    #[tokio::test]
    async fn channel_sink_delivers_frames() {
        let (mut tx, mut rx) = mpsc::channel(4);
        FrameSink::send(&mut tx, frame()).await.unwrap();
        assert_eq!(rx.recv().await, Some(frame()));
    }

    #[tokio::test]
    async fn frame_channel_streams_in_order() {
        use futures::StreamExt;

        let (mut tx, mut frames) = frame_channel(2);
        let mut second = frame();
        second.previous_frame_size = 5;

        FrameSink::send(&mut tx, frame()).await.unwrap();
        FrameSink::send(&mut tx, second.clone()).await.unwrap();
        drop(tx);

        assert_eq!(frames.next().await, Some(frame()));
        assert_eq!(frames.next().await, Some(second));
        assert_eq!(frames.next().await, None);
    }

    #[tokio::test]
    async fn closed_channel_reports_cancelled() {
        let (mut tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let err = FrameSink::send(&mut tx, frame()).await.unwrap_err();
        assert!(matches!(err, PacketizerError::Cancelled));
    }
}
