//! Read-ahead wrapper over a response body.
//!
//! The state machine peeks at the first bytes of a fresh download for
//! signature checks before deciding where the file goes. [`ReadAheadBody`]
//! buffers whatever the transport delivered beyond the header and replays it
//! ahead of the remaining stream, re-chunked to the configured chunk size.

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::debug;

use super::error::TransportError;
use super::session::ByteStream;

/// A response body with a small replay buffer in front of the stream.
pub struct ReadAheadBody {
    inner: ByteStream,
    buffer: Bytes,
    chunk_size: usize,
}

impl ReadAheadBody {
    /// Wraps `inner`, yielding chunks of at most `chunk_size` bytes.
    #[must_use]
    pub fn new(inner: ByteStream, chunk_size: usize) -> Self {
        Self {
            inner,
            buffer: Bytes::new(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Reads up to `len` bytes from the front of the body.
    ///
    /// Fewer bytes are returned only when the body ends first. Bytes read
    /// past `len` stay buffered for [`next_chunk`](Self::next_chunk).
    ///
    /// # Errors
    ///
    /// Returns the transport error that interrupted the read.
    pub async fn read_header(&mut self, len: usize) -> Result<Bytes, TransportError> {
        let mut header = BytesMut::with_capacity(len);
        let buffered = self.buffer.len().min(len);
        header.extend_from_slice(&self.buffer.split_to(buffered));

        while header.len() < len {
            match self.inner.next().await {
                Some(Ok(chunk)) => {
                    let needed = len - header.len();
                    if chunk.len() > needed {
                        header.extend_from_slice(&chunk[..needed]);
                        self.buffer = chunk.slice(needed..);
                    } else {
                        header.extend_from_slice(&chunk);
                    }
                }
                Some(Err(error)) => return Err(error),
                None => break,
            }
        }
        Ok(header.freeze())
    }

    /// Returns the next chunk, replaying buffered bytes first.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, TransportError>> {
        while self.buffer.is_empty() {
            match self.inner.next().await? {
                Ok(chunk) => self.buffer = chunk,
                Err(error) => return Some(Err(error)),
            }
        }
        let take = self.buffer.len().min(self.chunk_size);
        Some(Ok(self.buffer.split_to(take)))
    }

    /// Reads the body to the end so the connection can be reused.
    pub async fn drain(mut self) {
        while let Some(chunk) = self.inner.next().await {
            if let Err(error) = chunk {
                debug!(%error, "failed to drain response body");
                return;
            }
        }
    }
}
