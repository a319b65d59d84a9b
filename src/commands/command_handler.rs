use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::{
    commands::{
        command_error::CommandError,
        config_get::config_get,
        echo::echo,
        get::get,
        info::info,
        keys::keys,
        ping::ping,
        psync::psync,
        replconf::{replconf, replconf_from_master},
        set::set,
        wait::wait,
    },
    input::Frame,
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::RedisServer,
};

/// Commands that modify the store and are forwarded to replicas.
const WRITE_COMMANDS: [&str; 1] = ["SET"];

#[derive(Debug, PartialEq)]
pub enum CommandResult {
    NoResponse,
    Response(RespValue),
    /// Reply to `PSYNC`: the `FULLRESYNC` line and the snapshot to stream after it.
    Sync { reply: RespValue, payload: Bytes },
}

/// What a command may touch while it runs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub server: Arc<RedisServer>,
    pub store: Arc<Mutex<KeyValueStore>>,
    pub client_address: String,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CommandHandler {
    pub name: String,
    /// Arguments as text; bytes that are not UTF-8 are replaced.
    pub arguments: Vec<String>,
    /// Arguments exactly as received, for commands that store or return values.
    pub raw_arguments: Vec<Bytes>,
    /// Bytes the command arrived as, forwarded unchanged to replicas.
    pub source: Bytes,
}

impl CommandHandler {
    pub fn new(frame: Frame<RespValue>) -> Result<Self, CommandError> {
        let RespValue::Array(elements) = &frame.value else {
            return Err(CommandError::InvalidCommandArgument);
        };

        let mut raw_parts = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                RespValue::BulkString(bytes) => raw_parts.push(bytes.clone()),
                _ => return Err(CommandError::InvalidCommandArgument),
            }
        }

        let parts: Vec<String> = raw_parts
            .iter()
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect();

        let Some(first) = parts.first() else {
            return Err(CommandError::InvalidCommandArgument);
        };

        let name = first.to_uppercase();
        let (name, skipped) = match name.as_str() {
            "CONFIG" => {
                let sub_command = parts
                    .get(1)
                    .map(|s| s.to_uppercase())
                    .ok_or(CommandError::InvalidConfigGetCommand)?;

                if sub_command != "GET" {
                    return Err(CommandError::InvalidCommand(format!("CONFIG {}", sub_command)));
                }

                ("CONFIG GET".to_string(), 2)
            }
            _ => (name, 1),
        };

        Ok(Self {
            name,
            arguments: parts[skipped..].to_vec(),
            raw_arguments: raw_parts[skipped..].to_vec(),
            source: frame.source,
        })
    }

    pub fn is_write_command(&self) -> bool {
        WRITE_COMMANDS.contains(&self.name.as_str())
    }

    /// Runs a command sent by a regular client.
    ///
    /// On a master, successful writes are propagated to every replica. A
    /// replica refuses writes from clients.
    pub async fn handle_client_command(
        &self,
        context: &RequestContext,
    ) -> Result<CommandResult, CommandError> {
        if self.is_write_command() && !context.server.is_master() {
            return Err(CommandError::ReplicaReadOnlyCommands);
        }

        let arguments = self.arguments.clone();

        match self.name.as_str() {
            "PING" => ping(arguments),
            "ECHO" => echo(self.raw_arguments.clone()),
            "GET" => get(&context.store, arguments).await,
            "SET" => {
                let response = set(&context.store, self.raw_arguments.clone()).await?;

                let replication_log = context.server.replication_log()?;
                replication_log.replicate(self.source.clone()).await;

                Ok(response)
            }
            "INFO" => info(&context.server, arguments).await,
            "CONFIG GET" => config_get(&context.server, arguments),
            "KEYS" => keys(&context.store, arguments).await,
            "REPLCONF" => replconf(&context.server, arguments),
            "PSYNC" => psync(&context.server, arguments).await,
            "WAIT" => wait(&context.server, arguments).await,
            _ => Err(CommandError::InvalidCommand(self.name.clone())),
        }
    }

    /// Runs a command received on the replication stream from the master.
    ///
    /// Writes are applied without a reply. Only `REPLCONF GETACK` is answered.
    pub async fn handle_master_command(
        &self,
        context: &RequestContext,
    ) -> Result<CommandResult, CommandError> {
        let arguments = self.arguments.clone();

        match self.name.as_str() {
            "SET" => set(&context.store, self.raw_arguments.clone())
                .await
                .map(|_| CommandResult::NoResponse),
            "REPLCONF" => replconf_from_master(&context.server, arguments),
            "PING" => ping(arguments).map(|_| CommandResult::NoResponse),
            _ => Err(CommandError::InvalidCommand(self.name.clone())),
        }
    }
}
