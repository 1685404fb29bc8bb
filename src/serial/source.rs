//! Byte source abstraction over serial ports, capture files and test buffers

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

/// Trait for fixed-size reads from the raw satellite stream
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ByteSource: Send {
    /// Read `len` bytes.
    ///
    /// Returns fewer than `len` bytes only when the source is exhausted.
    async fn read_exact(&mut self, len: usize) -> io::Result<Bytes>;

    /// Block until at least one byte can be read without waiting
    async fn wait_ready(&mut self) -> io::Result<()>;

    /// Flush any capture output and release the source
    async fn close(&mut self) -> io::Result<()>;
}

/// Raw-capture sink: a byte-exact tee of everything read from a source
pub struct CaptureSink {
    writer: BufWriter<tokio::fs::File>,
    path: PathBuf,
    bytes_written: u64,
}

impl std::fmt::Debug for CaptureSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSink")
            .field("path", &self.path)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl CaptureSink {
    /// Create (or truncate) the capture file at `path`
    pub async fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::create(&path).await?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            bytes_written: 0,
        })
    }

    /// Append bytes unchanged
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush buffered bytes to disk
    pub async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }

    /// Path of the capture file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total bytes teed so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// `ByteSource` over any async reader, with an optional capture tee
pub struct StreamSource<R> {
    reader: BufReader<R>,
    capture: Option<CaptureSink>,
    bytes_read: u64,
}

impl<R> std::fmt::Debug for StreamSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSource")
            .field("capture", &self.capture)
            .field("bytes_read", &self.bytes_read)
            .finish_non_exhaustive()
    }
}

impl<R: AsyncRead + Unpin + Send> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            capture: None,
            bytes_read: 0,
        }
    }

    /// Tee every byte read into `capture`
    pub fn with_capture(mut self, capture: CaptureSink) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Total bytes pulled from the underlying reader
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ByteSource for StreamSource<R> {
    async fn read_exact(&mut self, len: usize) -> io::Result<Bytes> {
        let mut buf = BytesMut::zeroed(len);
        let mut filled = 0;

        // Tee per chunk: bytes pulled before a cancellation stay captured
        while filled < len {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            self.bytes_read += n as u64;
            if let Some(capture) = self.capture.as_mut() {
                capture.write(&buf[filled..filled + n]).await?;
            }
            filled += n;
        }
        buf.truncate(filled);

        Ok(buf.freeze())
    }

    async fn wait_ready(&mut self) -> io::Result<()> {
        // Fills the internal buffer without consuming; the bytes are teed
        // when they are actually read.
        self.reader.fill_buf().await?;
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        if let Some(capture) = self.capture.as_mut() {
            capture.flush().await?;
            debug!(
                "Capture file {} closed ({} bytes)",
                capture.path().display(),
                capture.bytes_written()
            );
        }
        Ok(())
    }
}
