use thiserror::Error;

use crate::resp::RespValue;

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    InvalidCommand(String),
    #[error("invalid command argument")]
    InvalidCommandArgument,
    #[error("invalid PING command")]
    InvalidPingCommand,
    #[error("invalid ECHO command")]
    InvalidEchoCommand,
    #[error("invalid GET command")]
    InvalidGetCommand,
    #[error("invalid SET command")]
    InvalidSetCommand,
    #[error("invalid SET command argument")]
    InvalidSetCommandArgument,
    #[error("invalid SET command expiration")]
    InvalidSetCommandExpiration,
    #[error("invalid INFO command")]
    InvalidInfoCommand,
    #[error("invalid INFO section")]
    InvalidInfoSection,
    #[error("invalid CONFIG GET command")]
    InvalidConfigGetCommand,
    #[error("invalid CONFIG GET command argument")]
    InvalidConfigGetCommandArgument,
    #[error("invalid KEYS command")]
    InvalidKeysCommand,
    #[error("invalid glob pattern: {0}")]
    InvalidGlobPattern(String),
    #[error("invalid REPLCONF command")]
    InvalidReplconfCommand,
    #[error("invalid PSYNC command")]
    InvalidPsyncCommand,
    #[error("invalid PSYNC offset")]
    InvalidPsyncOffset,
    #[error("invalid WAIT command")]
    InvalidWaitCommand,
    #[error("invalid WAIT command argument")]
    InvalidWaitCommandArgument,
    #[error("replica can only process read commands from clients")]
    ReplicaReadOnlyCommands,
    #[error("command is only available on a master")]
    MasterOnlyCommand,
    #[error("command is only available on a replica")]
    ReplicaOnlyCommand,
    #[error("failed to prepare RDB transfer: {0}")]
    RdbTransferFailed(String),
}

impl CommandError {
    pub fn as_resp(&self) -> RespValue {
        RespValue::Error(format!("ERR {}", self))
    }
}
