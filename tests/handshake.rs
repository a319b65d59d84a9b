use redline::handshake::{HandshakeError, HandshakeState, ReplicationHandshake};
use redline::input::{ConnectionReader, ReadError};
use redline::rdb::{EMPTY_RDB, RdbSnapshot, RdbTransferCodec};
use redline::resp::{RespCodec, RespValue};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

const REPLICA_PORT: u16 = 6380;
const MASTER_REPL_ID: &str = "8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb";

struct Connection {
    reader: ConnectionReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    master: DuplexStream,
}

/// Connects a replica to an in-memory master that has already queued `replies`.
async fn connect_with_replies(replies: &[&[u8]]) -> Connection {
    let (replica_end, mut master) = tokio::io::duplex(64 * 1024);

    for reply in replies {
        master.write_all(reply).await.unwrap();
    }

    let (read_half, writer) = tokio::io::split(replica_end);

    Connection {
        reader: ConnectionReader::new(read_half),
        writer,
        master,
    }
}

/// Commands the replica sent to the master, in order.
async fn sent_commands(master: &mut DuplexStream, count: usize) -> Vec<RespValue> {
    let mut reader = ConnectionReader::new(master);
    let mut commands = Vec::with_capacity(count);

    for _ in 0..count {
        commands.push(reader.read_frame(&RespCodec).await.unwrap().value);
    }

    commands
}

fn fullresync_reply(offset: u64) -> Vec<u8> {
    format!("+FULLRESYNC {} {}\r\n", MASTER_REPL_ID, offset).into_bytes()
}

#[tokio::test]
async fn test_handshake_receives_snapshot() {
    let fullresync = fullresync_reply(0);
    let snapshot = RdbTransferCodec::encode(EMPTY_RDB);
    let propagated = RespValue::command(&["SET", "foo", "bar"]).encode();

    let mut connection = connect_with_replies(&[
        b"+PONG\r\n",
        b"+OK\r\n",
        b"+OK\r\n",
        &fullresync,
        &snapshot,
        &propagated,
    ])
    .await;

    let mut handshake =
        ReplicationHandshake::new(&mut connection.reader, &mut connection.writer, REPLICA_PORT);
    assert_eq!(handshake.state(), HandshakeState::Start);

    let outcome = handshake.negotiate().await.unwrap();
    assert_eq!(handshake.state(), HandshakeState::SentPsync);

    assert_eq!(outcome.master_repl_id, MASTER_REPL_ID);
    assert_eq!(outcome.master_offset, 0);
    assert_eq!(outcome.snapshot, RdbSnapshot::decode(EMPTY_RDB).unwrap());

    assert_eq!(
        sent_commands(&mut connection.master, 4).await,
        vec![
            RespValue::command(&["PING"]),
            RespValue::command(&["REPLCONF", "listening-port", "6380"]),
            RespValue::command(&["REPLCONF", "capa", "psync2"]),
            RespValue::command(&["PSYNC", "?", "-1"]),
        ]
    );

    // The snapshot has no trailing CRLF, so the next command follows it directly
    let frame = connection.reader.read_frame(&RespCodec).await.unwrap();
    assert_eq!(frame.source, propagated);
}

#[tokio::test]
async fn test_handshake_keeps_master_offset() {
    let fullresync = fullresync_reply(1024);
    let snapshot = RdbTransferCodec::encode(EMPTY_RDB);

    let mut connection =
        connect_with_replies(&[b"+PONG\r\n", b"+OK\r\n", b"+OK\r\n", &fullresync, &snapshot]).await;

    let outcome =
        ReplicationHandshake::new(&mut connection.reader, &mut connection.writer, REPLICA_PORT)
            .negotiate()
            .await
            .unwrap();

    assert_eq!(outcome.master_offset, 1024);
}

#[tokio::test]
async fn test_unexpected_reply_aborts_handshake() {
    let mut connection = connect_with_replies(&[b"-ERR not ready\r\n"]).await;
    let mut handshake =
        ReplicationHandshake::new(&mut connection.reader, &mut connection.writer, REPLICA_PORT);

    assert_eq!(
        handshake.negotiate().await,
        Err(HandshakeError::UnexpectedReply {
            step: "PING",
            expected: "PONG",
            received: RespValue::Error("ERR not ready".to_string()),
        })
    );
    assert_eq!(handshake.state(), HandshakeState::Error);

    assert_eq!(handshake.negotiate().await, Err(HandshakeError::Aborted));
    assert_eq!(handshake.state(), HandshakeState::Error);
}

#[tokio::test]
async fn test_rejected_capabilities_abort_handshake() {
    let mut connection =
        connect_with_replies(&[b"+PONG\r\n", b"+OK\r\n", b"+NOPE\r\n"]).await;
    let mut handshake =
        ReplicationHandshake::new(&mut connection.reader, &mut connection.writer, REPLICA_PORT);

    assert_eq!(
        handshake.negotiate().await,
        Err(HandshakeError::UnexpectedReply {
            step: "REPLCONF capa",
            expected: "OK",
            received: RespValue::SimpleString("NOPE".to_string()),
        })
    );
    assert_eq!(handshake.state(), HandshakeState::Error);
}

#[tokio::test]
async fn test_invalid_fullresync_aborts_handshake() {
    let mut connection =
        connect_with_replies(&[b"+PONG\r\n", b"+OK\r\n", b"+OK\r\n", b"+FULLRESYNC abc\r\n"]).await;
    let mut handshake =
        ReplicationHandshake::new(&mut connection.reader, &mut connection.writer, REPLICA_PORT);

    assert_eq!(
        handshake.negotiate().await,
        Err(HandshakeError::InvalidFullResync("FULLRESYNC abc".to_string()))
    );
    assert_eq!(handshake.state(), HandshakeState::Error);
}

#[tokio::test]
async fn test_master_closing_mid_handshake() {
    let mut connection = connect_with_replies(&[b"+PONG\r\n"]).await;
    connection.master.shutdown().await.unwrap();

    let mut handshake =
        ReplicationHandshake::new(&mut connection.reader, &mut connection.writer, REPLICA_PORT);

    assert_eq!(
        handshake.negotiate().await,
        Err(HandshakeError::Read(ReadError::ReadClosedDuringWait))
    );
    assert_eq!(handshake.state(), HandshakeState::Error);
}
