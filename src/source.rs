//! Byte source trait for capture streams

use std::io::{self, Read};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Trait for the stream of octets the packetizer parses
///
/// Sources abstract over where the capture bytes come from (a pipe from a
/// hardware recorder, a socket, a file). The packetizer only ever reads
/// forward; no seeking is required.
///
/// Every [`tokio::io::AsyncRead`] type is a source. Blocking readers can be
/// wrapped in [`BlockingSource`].
#[async_trait::async_trait]
pub trait ByteSource: Send + 'static {
    /// Read up to `buf.len()` bytes
    ///
    /// Returns:
    /// - `Ok(n)` with `n > 0` - bytes were read
    /// - `Ok(0)` - end of stream
    /// - `Err(e)` - the source failed
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Read a single byte, `None` at end of stream
    async fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte).await? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

#[async_trait::async_trait]
impl<R> ByteSource for R
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        AsyncReadExt::read(self, buf).await
    }
}

/// Adapter running a blocking [`std::io::Read`] on tokio's blocking pool
///
/// Each read is moved to `spawn_blocking` so the async worker keeps yielding
/// while the reader waits for the recorder. If a read is abandoned (the session
/// was cancelled mid-read) the reader stays with the blocking thread and later
/// reads fail with `BrokenPipe`.
pub struct BlockingSource<R> {
    reader: Option<R>,
    scratch: Vec<u8>,
}

impl<R> BlockingSource<R>
where
    R: Read + Send + 'static,
{
    /// Wrap a blocking reader
    pub fn new(reader: R) -> Self {
        Self { reader: Some(reader), scratch: Vec::new() }
    }

    /// Recover the inner reader, unless it was lost to an abandoned read
    pub fn into_inner(self) -> Option<R> {
        self.reader
    }
}

#[async_trait::async_trait]
impl<R> ByteSource for BlockingSource<R>
where
    R: Read + Send + 'static,
{
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self.reader.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "blocking reader lost to an abandoned read")
        })?;

        let mut chunk = std::mem::take(&mut self.scratch);
        chunk.resize(buf.len(), 0);

        let (reader, chunk, result) = tokio::task::spawn_blocking(move || {
            let result = reader.read(&mut chunk);
            (reader, chunk, result)
        })
        .await
        .map_err(|e| io::Error::other(format!("Blocking read task panicked: {}", e)))?;

        self.reader = Some(reader);
        let n = result?;
        buf[..n].copy_from_slice(&chunk[..n]);
        self.scratch = chunk;
        Ok(n)
    }
}
