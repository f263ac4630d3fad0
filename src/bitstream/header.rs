//! Container header skipping

use tracing::{debug, info};

use super::SourceCursor;
use crate::source::ByteSource;
use crate::{PacketizerError, Result};

/// Discard bytes until the last four read equal `marker`.
///
/// Recorders write the MP4/3GPP header (ftyp, moov, ...) before the `mdat` box
/// whose payload is the NAL stream. Returns the number of bytes consumed,
/// marker included. Without the marker there is no framing context, so end of
/// stream or a read failure here is a `StreamFormat` error.
pub async fn skip_to_payload<S>(cursor: &mut SourceCursor<S>, marker: [u8; 4]) -> Result<u64>
where
    S: ByteSource,
{
    let mut window = [0u8; 4];
    let mut scanned = 0u64;

    loop {
        let byte = match cursor.read_byte().await {
            Ok(Some(byte)) => byte,
            Ok(None) => return Err(PacketizerError::stream_format(&marker, scanned, None)),
            Err(PacketizerError::Io(e)) => {
                return Err(PacketizerError::stream_format(&marker, scanned, Some(e)));
            }
            Err(e) => return Err(e),
        };

        scanned += 1;
        window.rotate_left(1);
        window[3] = byte;

        if scanned >= 4 && window == marker {
            info!(scanned, "Skipped container header");
            return Ok(scanned);
        }

        if scanned % 65536 == 0 {
            debug!(scanned, "Still searching for payload marker");
        }
    }
}
