use crate::{
    commands::{CommandError, CommandResult},
    resp::RespValue,
    server::{RedisRole, RedisServer},
};

enum InfoSection {
    Default,
    Replication,
}

pub struct InfoArguments {
    section: InfoSection,
}

impl InfoArguments {
    pub fn parse(arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() > 1 {
            return Err(CommandError::InvalidInfoCommand);
        }

        let Some(section) = arguments.first() else {
            return Ok(InfoArguments {
                section: InfoSection::Default,
            });
        };

        let section = match section.to_lowercase().as_str() {
            "replication" => InfoSection::Replication,
            _ => return Err(CommandError::InvalidInfoSection),
        };

        Ok(InfoArguments { section })
    }
}

/// Handles INFO. Only the replication section exists, so it is also the default.
pub async fn info(
    server: &RedisServer,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let info_arguments = InfoArguments::parse(arguments)?;

    let mut lines = vec!["# Replication".to_string()];
    lines.push(format!("role:{}", server.role.as_str()));

    match &server.role {
        RedisRole::Master {
            replication_log, ..
        } => {
            lines.push(format!(
                "connected_slaves:{}",
                replication_log.replica_count().await
            ));
        }
        RedisRole::Replica {
            master_host,
            master_port,
            ..
        } => {
            lines.push(format!("master_host:{}", master_host));
            lines.push(format!("master_port:{}", master_port));
            lines.push("connected_slaves:0".to_string());
        }
    }

    lines.push(format!("master_replid:{}", server.repl_id().await));
    lines.push(format!("master_repl_offset:{}", server.repl_offset().await));

    let body = match info_arguments.section {
        InfoSection::Default | InfoSection::Replication => lines.join("\r\n"),
    };

    Ok(CommandResult::Response(RespValue::bulk(body)))
}
