//! NAL unit extraction

use bytes::BytesMut;
use tracing::{trace, warn};

use super::{ResyncWindow, SourceCursor, skip_to_payload};
use crate::source::ByteSource;
use crate::types::NalUnit;
use crate::{PacketizerError, Result};

/// Validate a declared NAL length against the sanity bound.
///
/// Lengths above `max_length`, or negative when read as a signed 32-bit
/// value, mean the stream is out of sync.
pub fn check_length(length: u32, max_length: u32) -> Result<()> {
    if length > max_length || (length as i32) < 0 {
        return Err(PacketizerError::InvalidNaluLength { length, max: max_length });
    }
    Ok(())
}

/// Extracts length-prefixed NAL units from a capture stream
pub struct NalReader<S> {
    cursor: SourceCursor<S>,
    max_length: u32,
    resyncs: u64,
}

impl<S> NalReader<S>
where
    S: ByteSource,
{
    /// Create a reader with the given length bound
    pub fn new(cursor: SourceCursor<S>, max_length: u32) -> Self {
        Self { cursor, max_length, resyncs: 0 }
    }

    /// Bytes consumed from the source so far
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Number of successful resynchronizations
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Skip the container header up to and including `marker`
    pub async fn skip_header(&mut self, marker: [u8; 4]) -> Result<u64> {
        skip_to_payload(&mut self.cursor, marker).await
    }

    /// Read the next unit, resynchronizing if its prefix is implausible
    pub async fn next_unit(&mut self) -> Result<NalUnit> {
        let prefix = self.read_prefix().await?;
        match self.read_unit(prefix).await {
            Err(PacketizerError::InvalidNaluLength { length, max }) => {
                warn!(length, max, "Packetizer out of sync, trying to recover");
                self.resync(prefix).await
            }
            result => result,
        }
    }

    /// Read the 4-byte big-endian length prefix
    pub async fn read_prefix(&mut self) -> Result<[u8; 4]> {
        let mut prefix = [0u8; NalUnit::PREFIX_SIZE];
        self.cursor.fill(&mut prefix).await?;
        Ok(prefix)
    }

    /// Read the body announced by `prefix`
    ///
    /// Fails with `InvalidNaluLength` before consuming anything when the
    /// prefix is implausible.
    pub async fn read_unit(&mut self, prefix: [u8; 4]) -> Result<NalUnit> {
        let length = u32::from_be_bytes(prefix);
        check_length(length, self.max_length)?;

        let mut buf = BytesMut::zeroed(NalUnit::PREFIX_SIZE + length as usize);
        buf[..NalUnit::PREFIX_SIZE].copy_from_slice(&prefix);
        self.cursor.fill(&mut buf[NalUnit::PREFIX_SIZE..]).await?;

        trace!(length, "Extracted NAL unit");
        Ok(NalUnit::from_prefixed(buf.freeze()))
    }

    /// Scan byte by byte for the next plausible slice start and read that unit
    ///
    /// Runs until a candidate is found or the source ends.
    pub async fn resync(&mut self, prefix: [u8; 4]) -> Result<NalUnit> {
        let mut window = ResyncWindow::seeded(prefix);
        let mut scanned = 0u64;

        loop {
            let byte = self
                .cursor
                .read_byte()
                .await?
                .ok_or(PacketizerError::EndOfStream { expected: 1, received: 0 })?;
            scanned += 1;

            let Some(length) = window.push(byte, self.max_length) else {
                continue;
            };

            self.resyncs += 1;
            warn!(length, scanned, "A NAL unit may have been found in the bit stream");

            // window holds the prefix and the header byte; the rest follows in the stream
            let mut buf = BytesMut::zeroed(NalUnit::PREFIX_SIZE + length as usize);
            let window_bytes = window.bytes();
            buf[..window_bytes.len()].copy_from_slice(window_bytes);
            self.cursor.fill(&mut buf[window_bytes.len()..]).await?;

            return Ok(NalUnit::from_prefixed(buf.freeze()));
        }
    }
}
