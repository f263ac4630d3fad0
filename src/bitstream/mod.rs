//! Length-prefixed NAL stream parsing
//!
//! Reads H.264 NAL units out of a live capture stream with no random access:
//!
//! 1. [`skip_to_payload`] discards the container header up to the payload marker
//! 2. [`NalReader`] extracts 4-byte length-prefixed units
//! 3. [`ResyncWindow`] relocates framing when a declared length is implausible
//!
//! ## Usage Example
//!
//! ```rust
//! use avcflv::bitstream::{NalReader, SourceCursor};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> avcflv::Result<()> {
//! let stream = b"ftypmdat\x00\x00\x00\x02\x65\x88".to_vec();
//! let cursor = SourceCursor::new(std::io::Cursor::new(stream), CancellationToken::new());
//! let mut reader = NalReader::new(cursor, 100_000);
//!
//! reader.skip_header(*b"mdat").await?;
//! let unit = reader.next_unit().await?;
//! assert!(unit.is_keyframe());
//! # Ok(())
//! # }
//! ```

mod header;
mod reader;
mod resync;

pub use header::skip_to_payload;
pub use reader::{NalReader, check_length};
pub use resync::ResyncWindow;

use std::io;
use tokio_util::sync::CancellationToken;

use crate::source::ByteSource;
use crate::{PacketizerError, Result};

/// A byte source paired with the session's cancellation token.
///
/// Every read races the token, so a stop request unwinds even while the
/// source is blocked waiting for the recorder.
pub struct SourceCursor<S> {
    source: S,
    cancel: CancellationToken,
    position: u64,
}

impl<S> SourceCursor<S>
where
    S: ByteSource,
{
    /// Wrap a source
    pub fn new(source: S, cancel: CancellationToken) -> Self {
        Self { source, cancel, position: 0 }
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Return the underlying source
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Read one byte, `None` at end of stream
    pub async fn read_byte(&mut self) -> Result<Option<u8>> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(PacketizerError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PacketizerError::Cancelled),
                result = self.source.read_byte() => result,
            };

            match result {
                Ok(Some(byte)) => {
                    self.position += 1;
                    return Ok(Some(byte));
                }
                Ok(None) => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fill `buf` completely, retrying partial reads
    ///
    /// Fails with `EndOfStream` if the source ends first.
    pub async fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            if self.cancel.is_cancelled() {
                return Err(PacketizerError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PacketizerError::Cancelled),
                result = self.source.read(&mut buf[filled..]) => result,
            };

            match result {
                Ok(0) => {
                    return Err(PacketizerError::EndOfStream {
                        expected: buf.len(),
                        received: filled,
                    });
                }
                Ok(n) => {
                    filled += n;
                    self.position += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}
