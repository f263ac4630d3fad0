//! Framing recovery after an implausible length prefix
//!
//! The window heuristic accepts the first position where a slice type byte
//! (1 or 5) follows four bytes that read as a plausible length. There is no
//! start code or checksum to confirm the match, so slice data that happens to
//! look like a prefix plus type byte is a false positive. The next prefix read
//! after a false positive is usually implausible again, which restarts recovery.
//!
//! The window starts from the rejected prefix rather than from zeros, so the
//! first candidates are made of real stream bytes and never of zero padding.

use crate::types::NalType;

/// Five-byte sliding window over the stream during resynchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncWindow {
    bytes: [u8; 5],
}

impl ResyncWindow {
    /// Start a window from the rejected length prefix
    ///
    /// The rejected bytes are genuine stream bytes and take part in the
    /// first candidate lengths.
    pub fn seeded(prefix: [u8; 4]) -> Self {
        Self { bytes: [0, prefix[0], prefix[1], prefix[2], prefix[3]] }
    }

    /// Shift in one byte. Returns the candidate length when the window now
    /// looks like a length prefix followed by a slice header byte.
    pub fn push(&mut self, byte: u8, max_length: u32) -> Option<u32> {
        self.bytes.rotate_left(1);
        self.bytes[4] = byte;

        if !NalType::from_header_byte(byte).is_slice() {
            return None;
        }

        let length = u32::from_be_bytes([self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]]);
        (length > 0 && length < max_length).then_some(length)
    }

    /// Current window: four prefix bytes then the candidate header byte
    pub fn bytes(&self) -> &[u8; 5] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(window: &mut ResyncWindow, bytes: &[u8], max: u32) -> Option<(usize, u32)> {
        bytes.iter().enumerate().find_map(|(i, &b)| window.push(b, max).map(|len| (i, len)))
    }

    #[test]
    fn finds_idr_slice_after_garbage() {
        let mut window = ResyncWindow::seeded([0xFF; 4]);
        let stream = [0xFF, 0xEE, 0x00, 0x00, 0x01, 0x00, 0x65];
        assert_eq!(feed(&mut window, &stream, 100_000), Some((6, 256)));
        assert_eq!(window.bytes(), &[0x00, 0x00, 0x01, 0x00, 0x65]);
    }

    #[test]
    fn accepts_non_idr_slice_with_ref_idc_bits() {
        let mut window = ResyncWindow::seeded([0xFF; 4]);
        assert_eq!(feed(&mut window, &[0, 0, 0, 9, 0x41], 100_000), Some((4, 9)));
    }

    #[test]
    fn ignores_other_types() {
        let mut window = ResyncWindow::seeded([0xFF; 4]);
        // SPS (7) and SEI (6) headers behind plausible lengths
        assert_eq!(feed(&mut window, &[0, 0, 0, 9, 0x67, 0, 0, 0, 9, 0x06], 100_000), None);
    }

    #[test]
    fn rejects_zero_and_out_of_bound_lengths() {
        let mut window = ResyncWindow::seeded([0xFF; 4]);
        assert_eq!(feed(&mut window, &[0, 0, 0, 0, 0x65], 768), None);

        // the bound itself is excluded
        let mut window = ResyncWindow::seeded([0xFF; 4]);
        assert_eq!(feed(&mut window, &[0, 0, 0x03, 0x00, 0x65], 768), None);

        let mut window = ResyncWindow::seeded([0xFF; 4]);
        assert_eq!(feed(&mut window, &[0, 0, 0x02, 0xFF, 0x65], 768), Some((4, 767)));
    }

    #[test]
    fn seeded_prefix_participates_in_candidates() {
        let mut window = ResyncWindow::seeded([0x00, 0x00, 0x00, 0x03]);
        assert_eq!(window.push(0x65, 100_000), Some(3));
    }
}
