mod test_utils;

use bytes::Bytes;
use redline::replication::{AckPoll, ReplicationLog, getack_command};
use redline::resp::RespValue;
use test_utils::TestUtils;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn test_replicas_receive_writes_in_log_order() {
    let log = ReplicationLog::new();
    let (first_handle, mut first) = TestUtils::fake_replica("replica-1");
    let (second_handle, mut second) = TestUtils::fake_replica("replica-2");
    log.add_replica(first_handle).await;
    log.add_replica(second_handle).await;

    let set_a = TestUtils::set_command("a", "1").encode();
    let set_b = TestUtils::set_command("b", "2").encode();

    assert_eq!(log.replicate(set_a.clone()).await, set_a.len() as u64);
    assert_eq!(
        log.replicate(set_b.clone()).await,
        (set_a.len() + set_b.len()) as u64
    );

    for replica in [&mut first, &mut second] {
        assert_eq!(replica.next_frame().await.source, set_a);
        assert_eq!(replica.next_frame().await.source, set_b);
    }

    let mut expected_backlog = set_a.to_vec();
    expected_backlog.extend_from_slice(&set_b);
    assert_eq!(log.backlog().await, Bytes::from(expected_backlog));
    assert_eq!(log.replica_count().await, 2);
}

#[tokio::test]
async fn test_new_replica_only_receives_later_writes() {
    let log = ReplicationLog::new();
    let before = TestUtils::set_command("before", "1").encode();
    let after = TestUtils::set_command("after", "2").encode();

    log.replicate(before.clone()).await;

    let (handle, mut replica) = TestUtils::fake_replica("late-replica");
    log.add_replica(handle).await;
    log.replicate(after.clone()).await;

    assert_eq!(replica.next_frame().await.source, after);
    assert_eq!(log.master_offset().await, (before.len() + after.len()) as u64);
}

#[tokio::test]
async fn test_poll_acks_records_latest_offset() {
    let log = ReplicationLog::new();
    let (acking_handle, mut acking) = TestUtils::fake_replica("acking");
    let (silent_handle, _silent) = TestUtils::fake_replica("silent");
    log.add_replica(acking_handle.clone()).await;
    log.add_replica(silent_handle.clone()).await;

    acking.send_ack(31).await;

    assert_eq!(log.poll_acks().await, AckPoll { polled: 2, failed: 0 });
    assert_eq!(acking_handle.last_acked_offset(), 31);
    assert_eq!(silent_handle.last_acked_offset(), -1);
    assert_eq!(log.acked_count(31).await, 1);
    assert_eq!(log.acked_count(32).await, 0);
    assert_eq!(log.acked_count(0).await, 1);

    // Several queued acknowledgements: the newest one wins, not the largest
    acking.send_ack(90).await;
    acking.send_ack(45).await;

    assert_eq!(acking_handle.poll_ack().await, Ok(Some(45)));
    assert_eq!(acking_handle.last_acked_offset(), 45);
    assert_eq!(acking_handle.poll_ack().await, Ok(None));
    assert_eq!(acking_handle.last_acked_offset(), 45);
}

#[tokio::test]
async fn test_non_ack_frames_from_replica_are_ignored() {
    let (handle, mut replica) = TestUtils::fake_replica("chatty");

    replica
        .writer
        .write_all(&RespValue::command(&["PING"]).encode())
        .await
        .unwrap();

    assert_eq!(handle.poll_ack().await, Ok(None));
    assert_eq!(handle.last_acked_offset(), -1);
    assert!(handle.is_alive());
}

#[tokio::test]
async fn test_disconnected_replica_does_not_stop_propagation() {
    let log = ReplicationLog::new();
    let (alive_handle, mut alive) = TestUtils::fake_replica("alive");
    let (gone_handle, gone) = TestUtils::fake_replica("gone");
    log.add_replica(alive_handle).await;
    log.add_replica(gone_handle.clone()).await;

    drop(gone);

    assert_eq!(log.poll_acks().await, AckPoll { polled: 2, failed: 1 });
    assert!(!gone_handle.is_alive());
    assert_eq!(log.replica_count().await, 1);
    assert_eq!(log.poll_acks().await, AckPoll { polled: 1, failed: 0 });

    let getack = getack_command().encode();
    log.replicate(getack.clone()).await;

    assert_eq!(alive.next_frame().await.source, getack);
    assert!(!gone_handle.send(Bytes::from_static(b"+PING\r\n")));
}

#[tokio::test]
async fn test_failing_replica_does_not_block_later_acks() {
    let log = ReplicationLog::new();
    let (gone_handle, gone) = TestUtils::fake_replica("gone");
    let (alive_handle, mut alive) = TestUtils::fake_replica("alive");
    log.add_replica(gone_handle.clone()).await;
    log.add_replica(alive_handle.clone()).await;

    drop(gone);
    alive.send_ack(12).await;

    assert_eq!(log.poll_acks().await, AckPoll { polled: 2, failed: 1 });
    assert!(!gone_handle.is_alive());
    assert_eq!(alive_handle.last_acked_offset(), 12);
    assert_eq!(log.acked_count(12).await, 1);
}
