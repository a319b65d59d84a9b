#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use redline::{
    commands::{CommandError, CommandHandler, CommandResult, RequestContext},
    input::{ConnectionReader, Frame},
    key_value_store::KeyValueStore,
    replication::{ReplicaHandle, ReplicationLog, ack_command},
    resp::{RespCodec, RespValue},
    server::RedisServer,
};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Test utilities for simplifying Redis command tests
pub struct TestUtils;

/// Test environment containing store and server
pub struct TestEnv {
    pub store: Arc<Mutex<KeyValueStore>>,
    pub server: Arc<RedisServer>,
}

impl TestEnv {
    /// Create a new test environment with a master server
    pub fn new_master_server() -> Self {
        Self::from_args(&[])
    }

    /// Create a new test environment with a replica of 127.0.0.1:6379
    pub fn new_replica_server(replica_port: u16) -> Self {
        let port = replica_port.to_string();
        Self::from_args(&["--port", port.as_str(), "--replicaof", "127.0.0.1 6379"])
    }

    pub fn from_args(args: &[&str]) -> Self {
        let args = std::iter::once("redline")
            .chain(args.iter().copied())
            .map(String::from);

        Self {
            store: Arc::new(Mutex::new(KeyValueStore::new())),
            server: Arc::new(RedisServer::new(args).unwrap()),
        }
    }

    pub fn context(&self) -> RequestContext {
        RequestContext {
            server: Arc::clone(&self.server),
            store: Arc::clone(&self.store),
            client_address: "127.0.0.1:50000".to_string(),
        }
    }

    pub fn replication_log(&self) -> Arc<ReplicationLog> {
        Arc::clone(self.server.replication_log().unwrap())
    }

    /// Execute a client command and return the result
    pub async fn exec_command(&self, command: RespValue) -> Result<CommandResult, CommandError> {
        let command_handler = CommandHandler::new(TestUtils::frame(command))?;
        command_handler.handle_client_command(&self.context()).await
    }

    /// Execute a command received from the master and return the result
    pub async fn exec_master_command(
        &self,
        command: RespValue,
    ) -> Result<CommandResult, CommandError> {
        let command_handler = CommandHandler::new(TestUtils::frame(command))?;
        command_handler.handle_master_command(&self.context()).await
    }

    /// Execute a command and assert it succeeds with expected response
    pub async fn exec_command_success_response(&self, command: RespValue, expected: RespValue) {
        let result = self.exec_command(command.clone()).await;

        assert_eq!(
            result,
            Ok(CommandResult::Response(expected)),
            "executing {:?}",
            command
        );
    }

    /// Execute a command and assert it fails
    pub async fn exec_command_error_response(&self, command: RespValue, expected: CommandError) {
        let result = self.exec_command(command.clone()).await;

        assert_eq!(result, Err(expected), "executing {:?}", command);
    }
}

/// The test's end of a replica connection registered with a master.
pub struct FakeReplica {
    pub reader: ConnectionReader<ReadHalf<DuplexStream>>,
    pub writer: WriteHalf<DuplexStream>,
}

impl FakeReplica {
    /// Reads the next command the master propagated.
    pub async fn next_frame(&mut self) -> Frame<RespValue> {
        timeout(Duration::from_secs(2), self.reader.read_frame(&RespCodec))
            .await
            .expect("timed out waiting for the master")
            .unwrap()
    }

    pub async fn send_ack(&mut self, offset: u64) {
        self.writer
            .write_all(&ack_command(offset).encode())
            .await
            .unwrap();
        self.writer.flush().await.unwrap();
    }
}

impl TestUtils {
    pub fn frame(value: RespValue) -> Frame<RespValue> {
        let source = value.encode();
        Frame { value, source }
    }

    /// Creates a replica handle backed by an in-memory connection and
    /// returns it with the replica's end of that connection.
    pub fn fake_replica(id: &str) -> (Arc<ReplicaHandle>, FakeReplica) {
        let (master_end, replica_end) = tokio::io::duplex(64 * 1024);
        let (master_read, master_write) = tokio::io::split(master_end);
        let (replica_read, replica_write) = tokio::io::split(replica_end);

        let handle = ReplicaHandle::spawn(id, ConnectionReader::new(master_read).boxed(), master_write);

        (
            handle,
            FakeReplica {
                reader: ConnectionReader::new(replica_read),
                writer: replica_write,
            },
        )
    }

    pub fn set_command(key: &str, value: &str) -> RespValue {
        RespValue::command(&["SET", key, value])
    }

    pub fn set_command_with_expiration(key: &str, value: &str, option: &str, amount: &str) -> RespValue {
        RespValue::command(&["SET", key, value, option, amount])
    }

    pub fn get_command(key: &str) -> RespValue {
        RespValue::command(&["GET", key])
    }

    pub fn wait_command(number_of_replicas: usize, timeout_ms: u64) -> RespValue {
        RespValue::command(&[
            "WAIT",
            number_of_replicas.to_string().as_str(),
            timeout_ms.to_string().as_str(),
        ])
    }

    pub fn ok() -> RespValue {
        RespValue::SimpleString("OK".to_string())
    }
}
