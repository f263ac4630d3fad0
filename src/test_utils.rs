//! Test utilities for building capture streams and probing the packetizer
//!
//! This module provides stream builders, scripted byte sources and a recording
//! frame sink shared by unit tests, integration tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use std::io;
use std::sync::{Arc, Mutex};

use crate::sink::FrameSink;
use crate::source::ByteSource;
use crate::types::{ParameterSets, VideoFrame};
use crate::{PacketizerError, Result};

/// Baseline profile SPS used across tests
pub const TEST_SPS: [u8; 5] = [0x67, 0x42, 0x00, 0x1E, 0x01];

/// PPS matching [`TEST_SPS`]
pub const TEST_PPS: [u8; 4] = [0x68, 0xCE, 0x3C, 0x80];

/// Parameter sets built from [`TEST_SPS`] and [`TEST_PPS`]
pub fn test_parameter_sets() -> ParameterSets {
    ParameterSets::new(TEST_SPS.to_vec(), TEST_PPS.to_vec())
}

/// A recorder-style container header ending in the `mdat` marker
pub fn container_header() -> Vec<u8> {
    let mut header = Vec::new();
    header.extend_from_slice(&[0x00, 0x00, 0x00, 0x18]);
    header.extend_from_slice(b"ftyp3gp4");
    header.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    header.extend_from_slice(b"isom3gp4");
    header.extend_from_slice(&[0x00, 0x00, 0x00, 0x08]);
    header.extend_from_slice(b"free");
    header.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    header.extend_from_slice(b"mdat");
    header
}

/// NAL body of `length` bytes whose header byte has type `nal_type`
///
/// Filler bytes are `0xAB` (type bits 11), so they never look like a slice
/// header during resynchronization.
pub fn nal_body(nal_type: u8, length: u32) -> Vec<u8> {
    if length == 0 {
        return Vec::new();
    }

    let header = match nal_type {
        5 => 0x65,
        1 => 0x41,
        7 => 0x67,
        8 => 0x68,
        other => 0x60 | (other & 0x1F),
    };

    let mut body = vec![0xAB; length as usize];
    body[0] = header;
    body
}

/// Builder for length-prefixed capture streams
#[derive(Debug, Default, Clone)]
pub struct StreamBuilder {
    data: Vec<u8>,
}

impl StreamBuilder {
    /// Start an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a stream with [`container_header`] already written
    pub fn with_header() -> Self {
        Self::new().header()
    }

    /// Append [`container_header`]
    pub fn header(mut self) -> Self {
        self.data.extend_from_slice(&container_header());
        self
    }

    /// Append raw bytes
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Append a 4-byte length prefix and a body from [`nal_body`]
    pub fn nal(mut self, nal_type: u8, length: u32) -> Self {
        self.data.extend_from_slice(&length.to_be_bytes());
        self.data.extend_from_slice(&nal_body(nal_type, length));
        self
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Nothing written yet
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// Source that serves at most `chunk` bytes per read
pub struct ChunkedSource {
    data: Vec<u8>,
    position: usize,
    chunk: usize,
    pending_at_end: bool,
}

impl ChunkedSource {
    pub fn new(data: Vec<u8>, chunk: usize) -> Self {
        Self { data, position: 0, chunk: chunk.max(1), pending_at_end: false }
    }

    /// Block forever once the data is exhausted instead of reporting end of stream
    pub fn pending_at_end(mut self) -> Self {
        self.pending_at_end = true;
        self
    }
}

#[async_trait::async_trait]
impl ByteSource for ChunkedSource {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.len() - self.position;
        if remaining == 0 && self.pending_at_end {
            std::future::pending::<()>().await;
        }

        let n = remaining.min(self.chunk).min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Source whose reads never complete, like a recorder that went quiet
pub struct PendingSource;

#[async_trait::async_trait]
impl ByteSource for PendingSource {
    async fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        std::future::pending().await
    }
}

/// Source that fails every read
pub struct ErrorSource {
    kind: io::ErrorKind,
}

impl ErrorSource {
    pub fn new() -> Self {
        Self { kind: io::ErrorKind::ConnectionReset }
    }
}

impl Default for ErrorSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ByteSource for ErrorSource {
    async fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(self.kind, "recorder went away"))
    }
}

/// Source serving one byte per read that fails once for each listed offset
///
/// An offset listed `n` times fails `n` consecutive reads at that position.
pub struct FlakySource {
    data: Vec<u8>,
    position: usize,
    failures: Vec<usize>,
}

impl FlakySource {
    pub fn new(data: Vec<u8>, failures: Vec<usize>) -> Self {
        Self { data, position: 0, failures }
    }
}

#[async_trait::async_trait]
impl ByteSource for FlakySource {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(index) = self.failures.iter().position(|&offset| offset == self.position) {
            self.failures.remove(index);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "recorder stalled"));
        }

        if self.position >= self.data.len() || buf.is_empty() {
            return Ok(0);
        }

        buf[0] = self.data[self.position];
        self.position += 1;
        Ok(1)
    }
}

/// Frame sink that records every accepted frame
///
/// Clones share the same record, so a test can keep one handle while the
/// session owns another.
#[derive(Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<VideoFrame>>>,
    failures: Arc<Mutex<usize>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the first `count` frames with a sink error
    pub fn failing_first(count: usize) -> Self {
        let sink = Self::new();
        *sink.failures.lock().unwrap() = count;
        sink
    }

    /// Frames accepted so far
    pub fn frames(&self) -> Vec<VideoFrame> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FrameSink for RecordingSink {
    async fn send(&mut self, frame: VideoFrame) -> Result<()> {
        {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(PacketizerError::sink_failed_with_source(
                    "scripted failure",
                    Box::new(io::Error::new(io::ErrorKind::BrokenPipe, "transport dropped frame")),
                ));
            }
        }
        self.frames.lock().unwrap().push(frame);
        Ok(())
    }
}
