use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::input::{BoxedReader, ConnectionReader, ReadError};
use crate::replication::parse_ack;
use crate::resp::RespCodec;

/// A connected replica as seen by the master.
///
/// Writes go through a channel drained by a dedicated task, so a slow replica
/// never holds up propagation to the others. A handle whose connection fails
/// stays registered but reports `is_alive() == false`.
pub struct ReplicaHandle {
    id: String,
    sender: mpsc::UnboundedSender<Bytes>,
    reader: Mutex<ConnectionReader<BoxedReader>>,
    last_acked_offset: AtomicI64,
    alive: Arc<AtomicBool>,
}

impl ReplicaHandle {
    /// Wraps the two halves of a replica connection and starts its writer task.
    pub fn spawn<W>(id: impl Into<String>, reader: ConnectionReader<BoxedReader>, writer: W) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let id = id.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(write_to_replica(
            id.clone(),
            receiver,
            writer,
            Arc::clone(&alive),
        ));

        Arc::new(Self {
            id,
            sender,
            reader: Mutex::new(reader),
            last_acked_offset: AtomicI64::new(-1),
            alive,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Offset from the most recent `REPLCONF ACK`, or -1 before the first one.
    pub fn last_acked_offset(&self) -> i64 {
        self.last_acked_offset.load(Ordering::Acquire)
    }

    /// Queues bytes for the replica. Returns false when the replica is gone.
    pub fn send(&self, bytes: Bytes) -> bool {
        if !self.is_alive() {
            return false;
        }

        if self.sender.send(bytes).is_err() {
            self.alive.store(false, Ordering::Release);
            return false;
        }

        true
    }

    /// Consumes every acknowledgement the replica has already sent without waiting.
    ///
    /// Returns the newest offset seen during this call, if any.
    pub async fn poll_ack(&self) -> Result<Option<i64>, ReadError> {
        let mut reader = self.reader.try_lock().map_err(|_| ReadError::ReadPending)?;
        let mut latest = None;

        loop {
            match reader.try_read_frame(&RespCodec).await {
                Ok(Some(frame)) => match parse_ack(&frame.value) {
                    Some(offset) => latest = Some(offset),
                    None => debug!(replica = %self.id, frame = ?frame.value, "ignoring frame from replica"),
                },
                Ok(None) => break,
                Err(e) => {
                    if reader.is_closed() {
                        self.alive.store(false, Ordering::Release);
                    }
                    if let Some(offset) = latest {
                        self.last_acked_offset.store(offset, Ordering::Release);
                    }
                    return Err(e);
                }
            }
        }

        if let Some(offset) = latest {
            self.last_acked_offset.store(offset, Ordering::Release);
        }

        Ok(latest)
    }
}

impl fmt::Debug for ReplicaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaHandle")
            .field("id", &self.id)
            .field("last_acked_offset", &self.last_acked_offset())
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

async fn write_to_replica<W>(
    id: String,
    mut receiver: mpsc::UnboundedReceiver<Bytes>,
    mut writer: W,
    alive: Arc<AtomicBool>,
) where
    W: AsyncWrite + Send + Unpin,
{
    while let Some(bytes) = receiver.recv().await {
        let result = match writer.write_all(&bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(replica = %id, error = %e, "failed to write to replica");
            alive.store(false, Ordering::Release);
            return;
        }
    }

    debug!(replica = %id, "replica writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{AckPoll, ReplicationLog, ack_command};

    fn handle_with_peer(id: &str) -> (Arc<ReplicaHandle>, tokio::io::DuplexStream) {
        let (master_end, replica_end) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(master_end);
        let handle = ReplicaHandle::spawn(id, ConnectionReader::new(read_half).boxed(), write_half);

        (handle, replica_end)
    }

    #[tokio::test]
    async fn test_poll_ack_while_a_read_is_pending() {
        let (handle, mut replica) = handle_with_peer("busy");
        replica.write_all(&ack_command(7).encode()).await.unwrap();

        let guard = handle.reader.lock().await;
        assert_eq!(handle.poll_ack().await, Err(ReadError::ReadPending));
        assert_eq!(handle.last_acked_offset(), -1);
        assert!(handle.is_alive());

        let log = ReplicationLog::new();
        log.add_replica(Arc::clone(&handle)).await;
        assert_eq!(log.poll_acks().await, AckPoll { polled: 1, failed: 1 });
        assert_eq!(log.replica_count().await, 1);

        drop(guard);
        assert_eq!(handle.poll_ack().await, Ok(Some(7)));
        assert_eq!(handle.last_acked_offset(), 7);
    }
}
