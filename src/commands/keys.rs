use globset::Glob;
use tokio::sync::Mutex;

use crate::{
    commands::{CommandError, CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

pub struct KeysArguments {
    pub pattern: String,
}

impl KeysArguments {
    pub fn parse(mut arguments: Vec<String>) -> Result<Self, CommandError> {
        if arguments.len() != 1 {
            return Err(CommandError::InvalidKeysCommand);
        }

        Ok(KeysArguments {
            pattern: arguments.remove(0),
        })
    }
}

pub async fn keys(
    store: &Mutex<KeyValueStore>,
    arguments: Vec<String>,
) -> Result<CommandResult, CommandError> {
    let keys_arguments = KeysArguments::parse(arguments)?;

    let glob = Glob::new(&keys_arguments.pattern)
        .map_err(|e| CommandError::InvalidGlobPattern(e.to_string()))?
        .compile_matcher();

    let store_guard = store.lock().await;
    let mut matching_keys: Vec<String> = store_guard
        .keys()
        .into_iter()
        .filter(|key| glob.is_match(key))
        .collect();
    matching_keys.sort();

    let response = matching_keys.into_iter().map(RespValue::bulk).collect();

    Ok(CommandResult::Response(RespValue::Array(response)))
}
