//! Frame reading for a single connection.
//!
//! A [`ConnectionReader`] owns the bytes received from its peer that have not
//! been turned into frames yet. Reads suspend until enough bytes are buffered
//! for the given [`FrameDecoder`] to produce a value, and hand back the value
//! together with the exact bytes it was decoded from.

use std::future::poll_fn;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, ReadBuf};

use crate::resp::{RespError, RespValue};

/// Number of times an incomplete frame is retried after the peer stalls.
///
/// Only reads that drain the socket count, so a large frame whose bytes are
/// already waiting never uses up the bound.
pub const DEFAULT_MAX_RETRIES: usize = 10;

const READ_CHUNK_SIZE: usize = 4096;

/// Errors returned by [`ConnectionReader`] reads.
#[derive(Error, Debug, PartialEq)]
pub enum ReadError {
    #[error("ERR called read on a closed socket")]
    ReadOnClosed,
    #[error("ERR socket closed while attempting read")]
    ReadClosedDuringWait,
    #[error("ERR malformed data: {0}")]
    Malformed(#[from] RespError),
    #[error("ERR maximum retries reached")]
    MaxRetriesExceeded,
    #[error("ERR a read is already pending on this connection")]
    ReadPending,
    #[error("ERR I/O error: {0}")]
    IoError(String),
}

impl ReadError {
    /// True when the peer is gone rather than misbehaving.
    pub fn is_closed(&self) -> bool {
        matches!(self, ReadError::ReadOnClosed | ReadError::ReadClosedDuringWait)
    }

    pub fn as_resp(&self) -> RespValue {
        RespValue::Error(self.to_string())
    }
}

/// Turns the front of a byte buffer into a value.
///
/// Implementations must be pure functions of the buffer: `Ok(None)` means
/// "not enough bytes yet" and the same call is repeated on a longer buffer.
pub trait FrameDecoder {
    type Item;

    fn decode(&self, buffer: &[u8]) -> Result<Option<(Self::Item, usize)>, RespError>;
}

/// A decoded value and the bytes it was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<T> {
    pub value: T,
    pub source: Bytes,
}

/// Reader half of a connection plus its pending bytes.
///
/// Reads take `&mut self`, so at most one read is in flight per reader. When a
/// reader is shared (see [`crate::replication::ReplicaHandle`]) the owner
/// wraps it in a mutex and a busy lock maps to [`ReadError::ReadPending`].
#[derive(Debug)]
pub struct ConnectionReader<R> {
    reader: R,
    buffer: BytesMut,
    closed: bool,
    max_retries: usize,
}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

impl<R> ConnectionReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            closed: false,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes received but not consumed by any frame yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Reads the next frame, waiting for more bytes as needed.
    ///
    /// # Errors
    ///
    /// * `ReadOnClosed` - the connection was already closed before the call
    /// * `ReadClosedDuringWait` - the peer closed while this call was waiting
    /// * `Malformed` - the decoder rejected the bytes; the connection is closed
    /// * `MaxRetriesExceeded` - the frame stayed incomplete after too many reads
    pub async fn read_frame<D>(&mut self, decoder: &D) -> Result<Frame<D::Item>, ReadError>
    where
        D: FrameDecoder,
    {
        self.read_frame_with_retries(decoder, self.max_retries).await
    }

    pub async fn read_frame_with_retries<D>(
        &mut self,
        decoder: &D,
        max_retries: usize,
    ) -> Result<Frame<D::Item>, ReadError>
    where
        D: FrameDecoder,
    {
        if self.closed {
            return Err(ReadError::ReadOnClosed);
        }

        if self.buffer.is_empty() {
            self.wait_for_bytes().await?;
        }

        let mut retries = 0;

        loop {
            if let Some(frame) = self.decode_buffered(decoder)? {
                return Ok(frame);
            }

            if retries >= max_retries {
                self.closed = true;
                return Err(ReadError::MaxRetriesExceeded);
            }

            let received = self.wait_for_bytes().await?;
            if received < READ_CHUNK_SIZE {
                retries += 1;
            }
        }
    }

    /// Returns a frame only if one can be produced without waiting.
    ///
    /// Bytes already sitting in the socket are pulled in first, so this also
    /// notices a peer that has closed.
    pub async fn try_read_frame<D>(&mut self, decoder: &D) -> Result<Option<Frame<D::Item>>, ReadError>
    where
        D: FrameDecoder,
    {
        if self.closed {
            return Err(ReadError::ReadOnClosed);
        }

        if let Some(frame) = self.decode_buffered(decoder)? {
            return Ok(Some(frame));
        }

        loop {
            match self.fill_now().await {
                Ok(Some(0)) => {
                    self.closed = true;
                    return Err(ReadError::ReadClosedDuringWait);
                }
                Ok(Some(_)) => {
                    if let Some(frame) = self.decode_buffered(decoder)? {
                        return Ok(Some(frame));
                    }
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    self.closed = true;
                    return Err(ReadError::IoError(e.to_string()));
                }
            }
        }
    }

    /// Erases the reader type so readers of different sockets can live side by side.
    pub fn boxed(self) -> ConnectionReader<BoxedReader>
    where
        R: Send + 'static,
    {
        ConnectionReader {
            reader: Box::new(self.reader),
            buffer: self.buffer,
            closed: self.closed,
            max_retries: self.max_retries,
        }
    }

    fn decode_buffered<D>(&mut self, decoder: &D) -> Result<Option<Frame<D::Item>>, ReadError>
    where
        D: FrameDecoder,
    {
        match decoder.decode(&self.buffer) {
            Ok(Some((value, consumed))) => {
                let source = self.buffer.split_to(consumed).freeze();
                Ok(Some(Frame { value, source }))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.closed = true;
                Err(ReadError::Malformed(e))
            }
        }
    }

    /// Waits for the next read and returns how many bytes it added.
    async fn wait_for_bytes(&mut self) -> Result<usize, ReadError> {
        match poll_fn(|cx| self.poll_fill(cx)).await {
            Ok(0) => {
                self.closed = true;
                Err(ReadError::ReadClosedDuringWait)
            }
            Ok(received) => Ok(received),
            Err(e) => {
                self.closed = true;
                Err(ReadError::IoError(e.to_string()))
            }
        }
    }

    /// Polls the socket once; `None` means nothing was ready.
    async fn fill_now(&mut self) -> std::io::Result<Option<usize>> {
        poll_fn(|cx| match self.poll_fill(cx) {
            Poll::Pending => Poll::Ready(Ok(None)),
            Poll::Ready(result) => Poll::Ready(result.map(Some)),
        })
        .await
    }

    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<std::io::Result<usize>> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut read_buf = ReadBuf::new(&mut chunk);

        ready!(Pin::new(&mut self.reader).poll_read(cx, &mut read_buf))?;

        let filled = read_buf.filled();
        self.buffer.extend_from_slice(filled);

        Poll::Ready(Ok(filled.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::RespCodec;

    #[tokio::test]
    async fn test_read_frame_keeps_leftover_bytes() {
        let input: &[u8] = b"+PONG\r\n+OK\r\n:1";
        let mut reader = ConnectionReader::new(input);

        let frame = reader.read_frame(&RespCodec).await.unwrap();
        assert_eq!(frame.value, RespValue::SimpleString("PONG".into()));
        assert_eq!(frame.source, Bytes::from_static(b"+PONG\r\n"));
        assert_eq!(reader.buffered(), b"+OK\r\n:1");

        let frame = reader.read_frame(&RespCodec).await.unwrap();
        assert_eq!(frame.value, RespValue::SimpleString("OK".into()));
        assert_eq!(reader.buffered(), b":1");
    }

    #[tokio::test]
    async fn test_try_read_frame_reports_closed_peer() {
        let input: &[u8] = b"";
        let mut reader = ConnectionReader::new(input);

        assert_eq!(
            reader.try_read_frame(&RespCodec).await,
            Err(ReadError::ReadClosedDuringWait)
        );
        assert!(reader.is_closed());
    }
}
