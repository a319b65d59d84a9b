use bytes::Bytes;

use crate::{
    commands::{CommandError, CommandResult},
    resp::RespValue,
};

pub struct EchoArguments {
    message: Bytes,
}

impl EchoArguments {
    pub fn parse(mut arguments: Vec<Bytes>) -> Result<Self, CommandError> {
        if arguments.len() != 1 {
            return Err(CommandError::InvalidEchoCommand);
        }

        Ok(Self {
            message: arguments.remove(0),
        })
    }
}

/// Replies with the given message as a bulk string.
pub fn echo(arguments: Vec<Bytes>) -> Result<CommandResult, CommandError> {
    let echo_arguments = EchoArguments::parse(arguments)?;

    Ok(CommandResult::Response(RespValue::bulk(
        echo_arguments.message,
    )))
}
