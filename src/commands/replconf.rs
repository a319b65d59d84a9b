//! REPLCONF, the replication configuration command.
//!
//! Replicas send `listening-port` and `capa` during the handshake. Afterwards
//! the master sends `GETACK *` down the replication stream and the replica
//! answers with `ACK <offset>` on the same connection.

use crate::{
    commands::{CommandError, CommandResult},
    replication::ack_command,
    resp::RespValue,
    server::RedisServer,
};

#[derive(Debug, PartialEq)]
pub enum ReplconfArguments {
    ListeningPort(u16),
    Capabilities(Vec<String>),
    GetAck,
    Ack(u64),
}

impl ReplconfArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let Some((option, values)) = arguments.split_first() else {
            return Err(CommandError::InvalidReplconfCommand);
        };

        match (option.to_lowercase().as_str(), values) {
            ("listening-port", [port]) => port
                .parse::<u16>()
                .map(ReplconfArguments::ListeningPort)
                .map_err(|_| CommandError::InvalidCommandArgument),
            ("capa", capabilities) if !capabilities.is_empty() => {
                Ok(ReplconfArguments::Capabilities(capabilities.to_vec()))
            }
            ("getack", [target]) if target == "*" => Ok(ReplconfArguments::GetAck),
            ("ack", [offset]) => offset
                .parse::<u64>()
                .map(ReplconfArguments::Ack)
                .map_err(|_| CommandError::InvalidCommandArgument),
            _ => Err(CommandError::InvalidReplconfCommand),
        }
    }
}

/// REPLCONF as sent by a client or a replica during its handshake.
pub fn replconf(
    server: &RedisServer,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    match ReplconfArguments::parse(arguments)? {
        ReplconfArguments::ListeningPort(_) | ReplconfArguments::Capabilities(_) => Ok(
            CommandResult::Response(RespValue::SimpleString("OK".to_string())),
        ),
        ReplconfArguments::GetAck => {
            let offset = server.replica_offset()?;
            Ok(CommandResult::Response(ack_command(offset)))
        }
        ReplconfArguments::Ack(_) => Ok(CommandResult::NoResponse),
    }
}

/// REPLCONF as received on the replication stream. Only `GETACK` gets a reply.
pub fn replconf_from_master(
    server: &RedisServer,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    match ReplconfArguments::parse(arguments)? {
        ReplconfArguments::GetAck => {
            let offset = server.replica_offset()?;
            Ok(CommandResult::Response(ack_command(offset)))
        }
        _ => Ok(CommandResult::NoResponse),
    }
}
