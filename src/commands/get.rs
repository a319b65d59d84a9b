use tokio::sync::Mutex;

use crate::{
    commands::{CommandError, CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

/// Represents the parsed arguments for GET command
pub struct GetArguments {
    /// The key name to retrieve from the store
    key: String,
}

impl GetArguments {
    pub fn parse(mut arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 1 {
            return Err(CommandError::InvalidGetCommand);
        }

        Ok(Self {
            key: arguments.remove(0),
        })
    }
}

/// Handles the Redis GET command.
///
/// # Returns
///
/// * `Ok(CommandResult::Response)` - The stored value as a bulk string, or a
///   null bulk string when the key is missing or has expired
/// * `Err(CommandError::InvalidGetCommand)` - If the number of arguments is not 1
pub async fn get(
    store: &Mutex<KeyValueStore>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let get_arguments = GetArguments::parse(arguments)?;

    let mut store_guard = store.lock().await;
    let response = match store_guard.get(&get_arguments.key) {
        Some(value) => RespValue::BulkString(value),
        None => RespValue::NullBulkString,
    };

    Ok(CommandResult::Response(response))
}
