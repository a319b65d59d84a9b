use crate::{
    commands::{CommandError, CommandResult},
    resp::RespValue,
};

pub struct PingArguments;

impl PingArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if !arguments.is_empty() {
            return Err(CommandError::InvalidPingCommand);
        }

        Ok(PingArguments)
    }
}

pub fn ping(arguments: Vec<String>) -> Result<CommandResult, CommandError> {
    PingArguments::parse(arguments)?;

    Ok(CommandResult::Response(RespValue::SimpleString(
        "PONG".to_string(),
    )))
}
