use tracing::debug;

use crate::{
    commands::{CommandError, CommandResult},
    rdb::rdb_payload,
    resp::RespValue,
    server::RedisServer,
};

pub struct PsyncArguments {
    pub replication_id: String,
    pub offset: i64,
}

impl PsyncArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        let [replication_id, offset] = arguments.as_slice() else {
            return Err(CommandError::InvalidPsyncCommand);
        };

        let offset = offset
            .parse::<i64>()
            .map_err(|_| CommandError::InvalidPsyncOffset)?;

        Ok(Self {
            replication_id: replication_id.clone(),
            offset,
        })
    }
}

/// Starts a full resynchronisation with a replica.
///
/// Partial resynchronisation is never offered: whatever replication id and
/// offset the replica asks for, it gets `FULLRESYNC` and a complete snapshot.
pub async fn psync(
    server: &RedisServer,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let psync_arguments = PsyncArguments::parse(arguments)?;
    let replication_log = server.replication_log()?;

    debug!(
        requested_id = %psync_arguments.replication_id,
        requested_offset = psync_arguments.offset,
        "replica requested synchronisation"
    );

    let reply = RespValue::SimpleString(format!(
        "FULLRESYNC {} {}",
        server.repl_id().await,
        replication_log.master_offset().await
    ));

    let payload = rdb_payload(&server.rdb_directory, &server.rdb_filename)
        .await
        .map_err(|e| CommandError::RdbTransferFailed(e.to_string()))?;

    Ok(CommandResult::Sync { reply, payload })
}
