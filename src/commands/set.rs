use bytes::Bytes;
use jiff::Timestamp;
use tokio::sync::Mutex;

use crate::{
    commands::{CommandError, CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

/// Represents the parsed arguments for SET command
#[derive(Debug, PartialEq)]
pub struct SetArguments {
    /// The key name under which the value is stored
    key: String,
    /// The value to be stored under the given key, kept as raw bytes
    value: Bytes,
    /// Time to live in milliseconds, from `PX` or `EX`
    ttl_ms: Option<i64>,
}

impl SetArguments {
    /// Parses command arguments into a SetArguments structure.
    ///
    /// # Arguments
    ///
    /// * `arguments` - Either `[key, value]`, `[key, value, "PX", milliseconds]`
    ///   or `[key, value, "EX", seconds]`. The option name is case-insensitive.
    ///   The value may hold any bytes; the key must be UTF-8.
    ///
    /// # Returns
    ///
    /// * `Ok(SetArguments)` - Successfully parsed arguments
    /// * `Err(CommandError::InvalidSetCommand)` - If the number of arguments is not 2 or 4
    /// * `Err(CommandError::InvalidSetCommandArgument)` - If the key is not UTF-8 or the
    ///   option is neither "PX" nor "EX"
    /// * `Err(CommandError::InvalidSetCommandExpiration)` - If the time is not a positive integer
    pub fn parse(arguments: Vec<Bytes>) -> Result<Self, CommandError> {
        if arguments.len() != 2 && arguments.len() != 4 {
            return Err(CommandError::InvalidSetCommand);
        }

        let mut arguments = arguments.into_iter();
        let (Some(key), Some(value)) = (arguments.next(), arguments.next()) else {
            return Err(CommandError::InvalidSetCommand);
        };

        let key = String::from_utf8(key.to_vec())
            .map_err(|_| CommandError::InvalidSetCommandArgument)?;

        let ttl_ms = match (arguments.next(), arguments.next()) {
            (Some(option), Some(amount)) => {
                let multiplier = match option.to_ascii_uppercase().as_slice() {
                    b"PX" => 1,
                    b"EX" => 1000,
                    _ => return Err(CommandError::InvalidSetCommandArgument),
                };

                let ttl_ms = std::str::from_utf8(&amount)
                    .ok()
                    .and_then(|amount| amount.parse::<i64>().ok())
                    .filter(|amount| *amount > 0)
                    .and_then(|amount| amount.checked_mul(multiplier))
                    .ok_or(CommandError::InvalidSetCommandExpiration)?;

                Some(ttl_ms)
            }
            _ => None,
        };

        Ok(Self { key, value, ttl_ms })
    }
}

fn expiration_from_now(ttl_ms: i64) -> Result<Timestamp, CommandError> {
    Timestamp::now()
        .as_millisecond()
        .checked_add(ttl_ms)
        .and_then(|ms| Timestamp::from_millisecond(ms).ok())
        .ok_or(CommandError::InvalidSetCommandExpiration)
}

/// Handles the Redis SET command.
///
/// Stores a key-value pair in the key-value store, optionally expiring after
/// the `PX` (milliseconds) or `EX` (seconds) time to live.
///
/// # Examples
///
/// ```ignore
/// // SET mykey "hello" PX 1000  (expires in 1 second)
/// let result = set(&store, vec![
///     Bytes::from("mykey"),
///     Bytes::from("hello"),
///     Bytes::from("PX"),
///     Bytes::from("1000"),
/// ]).await;
/// // Returns: CommandResult::Response(RespValue::SimpleString("OK"))
/// ```
pub async fn set(
    store: &Mutex<KeyValueStore>,
    arguments: Vec<Bytes>,
) -> Result<CommandResult, CommandError> {
    let set_arguments = SetArguments::parse(arguments)?;

    let expiration = set_arguments.ttl_ms.map(expiration_from_now).transpose()?;

    let mut store_guard = store.lock().await;
    store_guard.set(set_arguments.key, set_arguments.value, expiration);

    Ok(CommandResult::Response(RespValue::SimpleString(
        "OK".to_string(),
    )))
}
