//! Master-side replication: the propagation log, connected replicas and the
//! acknowledgement quorum used by `WAIT`.

mod log;
mod replica_handle;
mod wait;

pub use log::{AckPoll, ReplicationLog};
pub use replica_handle::ReplicaHandle;
pub use wait::{poll_interval, wait_for_replicas};

use crate::resp::RespValue;

/// `REPLCONF GETACK *`, the probe that asks replicas to report their offset.
pub fn getack_command() -> RespValue {
    RespValue::command(&["REPLCONF", "GETACK", "*"])
}

/// `REPLCONF ACK <offset>`, a replica's answer to [`getack_command`].
pub fn ack_command(offset: u64) -> RespValue {
    RespValue::command(&["REPLCONF", "ACK", offset.to_string().as_str()])
}

/// Extracts the offset from a `REPLCONF ACK <offset>` frame.
pub fn parse_ack(value: &RespValue) -> Option<i64> {
    let RespValue::Array(elements) = value else {
        return None;
    };

    let [command, subcommand, offset] = elements.as_slice() else {
        return None;
    };

    if !command.as_str()?.eq_ignore_ascii_case("REPLCONF")
        || !subcommand.as_str()?.eq_ignore_ascii_case("ACK")
    {
        return None;
    }

    offset.as_str()?.parse::<i64>().ok()
}
