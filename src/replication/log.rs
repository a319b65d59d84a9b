use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::replication::ReplicaHandle;

/// Outcome of one [`ReplicationLog::poll_acks`] round.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct AckPoll {
    pub polled: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct LogInner {
    backlog: BytesMut,
    master_offset: u64,
    replicas: Vec<Arc<ReplicaHandle>>,
}

/// Everything a master has propagated, and the replicas it propagates to.
#[derive(Debug, Default)]
pub struct ReplicationLog {
    inner: Mutex<LogInner>,
}

impl ReplicationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` to the log and queues them for every registered replica.
    ///
    /// The lock is held while queueing, so all replicas see successive calls in
    /// the same order. Returns the master offset after the append.
    pub async fn replicate(&self, bytes: Bytes) -> u64 {
        let mut inner = self.inner.lock().await;

        inner.backlog.extend_from_slice(&bytes);
        inner.master_offset += bytes.len() as u64;

        for replica in &inner.replicas {
            if !replica.send(bytes.clone()) {
                debug!(replica = %replica.id(), "skipping disconnected replica");
            }
        }

        inner.master_offset
    }

    /// Registers a replica for future `replicate` calls. Nothing already logged is replayed.
    pub async fn add_replica(&self, replica: Arc<ReplicaHandle>) {
        let mut inner = self.inner.lock().await;
        info!(replica = %replica.id(), offset = inner.master_offset, "replica registered");
        inner.replicas.push(replica);
    }

    pub async fn master_offset(&self) -> u64 {
        self.inner.lock().await.master_offset
    }

    /// Number of registered replicas whose connection is still up.
    pub async fn replica_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.replicas.iter().filter(|r| r.is_alive()).count()
    }

    pub async fn replicas(&self) -> Vec<Arc<ReplicaHandle>> {
        self.inner.lock().await.replicas.clone()
    }

    /// Every byte ever propagated, in order.
    pub async fn backlog(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.lock().await.backlog)
    }

    /// Reads pending acknowledgements from every replica without blocking.
    ///
    /// A failing replica is counted in `failed` and does not stop the others
    /// from being polled. The log lock is not held while polling.
    pub async fn poll_acks(&self) -> AckPoll {
        let replicas = self.replicas().await;
        let mut result = AckPoll::default();

        for replica in replicas.iter().filter(|r| r.is_alive()) {
            result.polled += 1;

            if let Err(e) = replica.poll_ack().await {
                result.failed += 1;
                warn!(replica = %replica.id(), error = %e, "failed to poll replica acknowledgement");
            }
        }

        result
    }

    /// Number of replicas that acknowledged at least `offset` bytes.
    pub async fn acked_count(&self, offset: u64) -> usize {
        let inner = self.inner.lock().await;

        inner
            .replicas
            .iter()
            .filter(|r| r.last_acked_offset() >= 0 && r.last_acked_offset() as u64 >= offset)
            .count()
    }
}
