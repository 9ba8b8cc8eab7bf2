//! Fixed-size chunking of an async byte source.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default chunk size: 64 KiB, matching the filter service's wire contract.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Lazily chunks a finite byte source into ordered slices of at most
/// `chunk_size` bytes.
///
/// Every chunk except the last is exactly `chunk_size` bytes; the last may be
/// shorter. No byte is duplicated or dropped: the concatenation of all
/// emitted chunks reconstructs the source. End-of-sequence (`Ok(None)`) is
/// distinct from a read fault (`Err`), so a consumer can never mistake a
/// truncated sequence for a clean end.
pub struct ChunkSource<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: AsyncRead + Unpin> ChunkSource<R> {
    /// Wrap a reader. `chunk_size` must be non-zero.
    pub fn new(reader: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self { reader, chunk_size }
    }

    /// Read the next chunk, or `None` once the source is exhausted.
    ///
    /// Short reads from the underlying reader are accumulated until the
    /// chunk is full or the source ends, so chunk boundaries are stable
    /// regardless of how the reader fragments its data.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(Bytes::from(buf)))
    }
}
