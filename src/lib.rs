//! A Redis-compatible server.
//!
//! The crate covers the RESP wire protocol, a buffered frame reader for
//! connections, decoding of RDB snapshots and master/replica replication:
//!
//! - Commands: PING, ECHO, GET, SET, INFO, CONFIG GET, KEYS, REPLCONF, PSYNC, WAIT
//! - Snapshot import at startup and full resynchronisation of replicas
//! - Write propagation from a master to its replicas and acknowledgement tracking
//!
//! Connections are served concurrently on Tokio, one task per client.

pub mod commands;
pub mod connection;
pub mod handshake;
pub mod input;
pub mod key_value_store;
pub mod rdb;
pub mod replication;
pub mod resp;
pub mod server;
