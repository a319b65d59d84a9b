use std::time::Duration;

use crate::{
    commands::{CommandError, CommandResult},
    replication::wait_for_replicas,
    resp::RespValue,
    server::RedisServer,
};

pub struct WaitArguments {
    pub number_of_replicas: usize,
    pub timeout: Duration,
}

impl WaitArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 2 {
            return Err(CommandError::InvalidWaitCommand);
        }

        let number_of_replicas = arguments[0]
            .parse::<usize>()
            .map_err(|_| CommandError::InvalidWaitCommandArgument)?;

        let timeout = arguments[1]
            .parse::<u64>()
            .map_err(|_| CommandError::InvalidWaitCommandArgument)?;

        Ok(Self {
            number_of_replicas,
            timeout: Duration::from_millis(timeout),
        })
    }
}

/// Replies with how many replicas acknowledged every write issued before the call.
pub async fn wait(
    server: &RedisServer,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let wait_arguments = WaitArguments::parse(arguments)?;

    // A replica has no replicas of its own to wait for
    let Ok(replication_log) = server.replication_log() else {
        return Ok(CommandResult::Response(RespValue::Integer(0)));
    };

    let acknowledged = wait_for_replicas(
        replication_log,
        wait_arguments.number_of_replicas,
        wait_arguments.timeout,
    )
    .await;

    Ok(CommandResult::Response(RespValue::Integer(
        acknowledged as i64,
    )))
}
