//! Fault-tolerant H.264 packetizer for live capture streams.
//!
//! `avcflv` turns the length-prefixed NAL stream a hardware recorder writes into
//! an MP4/3GPP `mdat` box into timestamped FLV video frames ready for an RTMP
//! publisher.
//!
//! # Features
//!
//! - **Header skipping**: discards the container header up to the payload marker
//! - **Resynchronization**: recovers framing after corrupted length prefixes
//! - **Configuration record**: emits the AVC decoder configuration once, before the first keyframe
//! - **Cancellable sessions**: stop unwinds even while the source is blocked
//!
//! # Quick Start
//!
//! ```rust
//! use avcflv::{Packetizer, frame_channel};
//! use futures::StreamExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> avcflv::Result<()> {
//! let mut capture = b"ftypisommdat".to_vec();
//! capture.extend_from_slice(&[0x00, 0x00, 0x00, 0x03, 0x65, 0x88, 0x84]);
//!
//! let mut packetizer = Packetizer::with_defaults();
//! packetizer.set_parameter_sets(vec![0x67, 0x42, 0x00, 0x1E], vec![0x68, 0xCE, 0x3C, 0x80]);
//!
//! let (sink, mut frames) = frame_channel(16);
//! packetizer.start(std::io::Cursor::new(capture), sink);
//!
//! let configuration = frames.next().await.unwrap();
//! assert!(configuration.is_configuration);
//! let keyframe = frames.next().await.unwrap();
//! assert!(keyframe.is_keyframe);
//!
//! packetizer.wait().await?;
//! # Ok(())
//! # }
//! ```

// Core types and error handling
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Stream parsing and framing
pub mod bitstream;
pub mod framer;
pub mod record;

// Session architecture
pub mod driver;
pub mod packetizer;
pub mod sink;
pub mod source;

// Core exports
pub use config::PacketizerConfig;
pub use error::*;
pub use types::*;

// Main API exports
pub use driver::{PacketizerState, SessionReport, StopReason};
pub use framer::FrameTagger;
pub use packetizer::Packetizer;
pub use record::encode_configuration_record;
pub use sink::{FrameSink, frame_channel};
pub use source::{BlockingSource, ByteSource};
