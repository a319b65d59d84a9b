use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::replication::{ReplicationLog, getack_command};

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Tick length for a wait of `timeout`: a tenth of it, capped at 100ms.
pub fn poll_interval(timeout: Duration) -> Duration {
    (timeout / 10).clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// Waits until `number_of_replicas` replicas acknowledged the current master
/// offset or `timeout` elapses, and returns how many did.
///
/// The result is the highest count seen on any tick, so an acknowledgement
/// that is later superseded by a lower offset still counts.
pub async fn wait_for_replicas(
    log: &ReplicationLog,
    number_of_replicas: usize,
    timeout: Duration,
) -> usize {
    let target_offset = log.master_offset().await;

    if target_offset == 0 {
        return log.replica_count().await;
    }

    log.replicate(getack_command().encode()).await;

    let interval = poll_interval(timeout);
    let deadline = Instant::now() + timeout;
    let mut max_acked = 0;

    loop {
        log.poll_acks().await;

        let acked = log.acked_count(target_offset).await;
        max_acked = max_acked.max(acked);

        if max_acked >= number_of_replicas {
            break;
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }

        sleep(interval.min(deadline - now)).await;
    }

    debug!(target_offset, acked = max_acked, "finished waiting for replicas");

    max_acked
}
