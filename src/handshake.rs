//! Replica side of the replication handshake.
//!
//! A replica connects to its master and walks through a fixed sequence of
//! exchanges: `PING`, `REPLCONF listening-port`, `REPLCONF capa psync2` and
//! `PSYNC ? -1`, after which the master answers `FULLRESYNC <replid> <offset>`
//! and streams its RDB snapshot. Any unexpected reply puts the handshake in
//! the [`HandshakeState::Error`] state, from which it never proceeds.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::input::{ConnectionReader, ReadError};
use crate::rdb::{RdbError, RdbSnapshot, RdbTransferCodec};
use crate::resp::{RespCodec, RespValue};

/// Upper bound on partial reads while receiving the snapshot payload.
pub const RDB_TRANSFER_MAX_RETRIES: usize = 65_536;

static FULLRESYNC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^FULLRESYNC ([0-9A-Za-z]+) (\d+)$").expect("valid FULLRESYNC pattern"));

#[derive(Error, Debug, PartialEq)]
pub enum HandshakeError {
    #[error("unexpected reply to {step}: expected {expected}, received {received:?}")]
    UnexpectedReply {
        step: &'static str,
        expected: &'static str,
        received: RespValue,
    },
    #[error("invalid FULLRESYNC reply: {0}")]
    InvalidFullResync(String),
    #[error("read from master failed: {0}")]
    Read(#[from] ReadError),
    #[error("write to master failed: {0}")]
    IoError(String),
    #[error("invalid snapshot from master: {0}")]
    Rdb(#[from] RdbError),
    #[error("handshake already failed")]
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Start,
    ServerAlive,
    SentListeningPort,
    SentCapabilities,
    SentPsync,
    Error,
}

/// What a successful handshake learned from the master.
#[derive(Debug, PartialEq)]
pub struct HandshakeOutcome {
    pub master_repl_id: String,
    pub master_offset: u64,
    pub snapshot: RdbSnapshot,
}

pub struct ReplicationHandshake<'a, R, W> {
    reader: &'a mut ConnectionReader<R>,
    writer: &'a mut W,
    listening_port: u16,
    state: HandshakeState,
}

impl<'a, R, W> ReplicationHandshake<'a, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: &'a mut ConnectionReader<R>, writer: &'a mut W, listening_port: u16) -> Self {
        Self {
            reader,
            writer,
            listening_port,
            state: HandshakeState::Start,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Runs every remaining step of the handshake and receives the snapshot.
    ///
    /// On failure the handshake moves to [`HandshakeState::Error`] and every
    /// later call fails with [`HandshakeError::Aborted`].
    pub async fn negotiate(&mut self) -> Result<HandshakeOutcome, HandshakeError> {
        if self.state != HandshakeState::Start {
            return Err(HandshakeError::Aborted);
        }

        match self.run().await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(state = ?self.state, error = %e, "replication handshake failed");
                self.state = HandshakeState::Error;
                Err(e)
            }
        }
    }

    async fn run(&mut self) -> Result<HandshakeOutcome, HandshakeError> {
        self.exchange(RespValue::command(&["PING"]), "PING", "PONG")
            .await?;
        self.advance(HandshakeState::ServerAlive);

        let port = self.listening_port.to_string();
        self.exchange(
            RespValue::command(&["REPLCONF", "listening-port", port.as_str()]),
            "REPLCONF listening-port",
            "OK",
        )
        .await?;
        self.advance(HandshakeState::SentListeningPort);

        self.exchange(
            RespValue::command(&["REPLCONF", "capa", "psync2"]),
            "REPLCONF capa",
            "OK",
        )
        .await?;
        self.advance(HandshakeState::SentCapabilities);

        self.send(RespValue::command(&["PSYNC", "?", "-1"])).await?;
        let reply = self.reader.read_frame(&RespCodec).await?.value;
        let (master_repl_id, master_offset) = parse_fullresync(reply)?;
        self.advance(HandshakeState::SentPsync);

        let payload = self
            .reader
            .read_frame_with_retries(&RdbTransferCodec, RDB_TRANSFER_MAX_RETRIES)
            .await?
            .value;
        let snapshot = RdbSnapshot::decode(&payload)?;

        info!(
            master_repl_id = %master_repl_id,
            master_offset,
            keys = snapshot.entries.len(),
            "received snapshot from master"
        );

        Ok(HandshakeOutcome {
            master_repl_id,
            master_offset,
            snapshot,
        })
    }

    async fn exchange(
        &mut self,
        command: RespValue,
        step: &'static str,
        expected: &'static str,
    ) -> Result<(), HandshakeError> {
        self.send(command).await?;

        match self.reader.read_frame(&RespCodec).await?.value {
            RespValue::SimpleString(reply) if reply == expected => Ok(()),
            received => Err(HandshakeError::UnexpectedReply {
                step,
                expected,
                received,
            }),
        }
    }

    async fn send(&mut self, command: RespValue) -> Result<(), HandshakeError> {
        self.writer
            .write_all(&command.encode())
            .await
            .map_err(|e| HandshakeError::IoError(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| HandshakeError::IoError(e.to_string()))
    }

    fn advance(&mut self, state: HandshakeState) {
        info!(from = ?self.state, to = ?state, "replication handshake progressed");
        self.state = state;
    }
}

/// Splits `FULLRESYNC <replid> <offset>` into its two fields.
fn parse_fullresync(reply: RespValue) -> Result<(String, u64), HandshakeError> {
    let line = match reply {
        RespValue::SimpleString(line) => line,
        received => {
            return Err(HandshakeError::UnexpectedReply {
                step: "PSYNC",
                expected: "FULLRESYNC <replid> <offset>",
                received,
            });
        }
    };

    let captures = FULLRESYNC_PATTERN
        .captures(&line)
        .ok_or_else(|| HandshakeError::InvalidFullResync(line.clone()))?;

    let master_repl_id = captures[1].to_string();
    let master_offset = captures[2]
        .parse::<u64>()
        .map_err(|_| HandshakeError::InvalidFullResync(line.clone()))?;

    Ok((master_repl_id, master_offset))
}
