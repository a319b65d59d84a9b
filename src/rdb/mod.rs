//! Decoding of the binary RDB snapshot format.

mod cursor;
mod encoding;
mod opcode;
mod rdb_file_operations;
mod rdb_parser;
mod transfer;

use std::collections::HashMap;

use bytes::Bytes;
use jiff::Timestamp;
use thiserror::Error;

pub use cursor::RdbCursor;
pub use rdb_file_operations::{load_rdb_file, rdb_payload};
pub use rdb_parser::RdbParser;
pub use transfer::RdbTransferCodec;

/// Snapshot with no keys, sent to replicas when no RDB file exists on disk.
pub const EMPTY_RDB: &[u8] = &[
    0x52, 0x45, 0x44, 0x49, 0x53, 0x30, 0x30, 0x31, 0x31, 0xFA, 0x09, 0x72, 0x65, 0x64, 0x69, 0x73,
    0x2D, 0x76, 0x65, 0x72, 0x05, 0x37, 0x2E, 0x32, 0x2E, 0x30, 0xFA, 0x0A, 0x72, 0x65, 0x64, 0x69,
    0x73, 0x2D, 0x62, 0x69, 0x74, 0x73, 0xC0, 0x40, 0xFA, 0x05, 0x63, 0x74, 0x69, 0x6D, 0x65, 0xC2,
    0x6D, 0x08, 0xBC, 0x65, 0xFA, 0x08, 0x75, 0x73, 0x65, 0x64, 0x2D, 0x6D, 0x65, 0x6D, 0xC2, 0xB0,
    0xC4, 0x10, 0x00, 0xFA, 0x08, 0x61, 0x6F, 0x66, 0x2D, 0x62, 0x61, 0x73, 0x65, 0xC0, 0x00, 0xFF,
    0xF0, 0x6E, 0x3B, 0xFE, 0xC0, 0xFF, 0x5A, 0xA2,
];

#[derive(Error, Debug, PartialEq)]
pub enum RdbError {
    #[error("unexpected end of RDB data")]
    UnexpectedEof,
    #[error("invalid magic string")]
    InvalidMagicString,
    #[error("invalid RDB version: {0}")]
    InvalidVersion(String),
    #[error("invalid length encoding: 0x{0:02X}")]
    InvalidLengthEncoding(u8),
    #[error("unsupported string encoding: 0x{0:02X}")]
    UnsupportedStringEncoding(u8),
    #[error("expected a length, found a special encoding: 0x{0:02X}")]
    UnexpectedSpecialEncoding(u8),
    #[error("unsupported value type {value_type} for key '{key}'")]
    UnsupportedValueType { value_type: u8, key: String },
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),
    #[error("expiry must be followed by a key/value pair")]
    DanglingExpiry,
    #[error("invalid expiration timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
    #[error("I/O error: {0}")]
    IoError(String),
}

/// One string key loaded from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RdbEntry {
    pub key: String,
    pub value: Bytes,
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RdbSnapshot {
    pub magic_string: String,
    pub redis_version: String,
    pub metadata: HashMap<String, String>,
    pub entries: Vec<RdbEntry>,
    pub checksum: Option<[u8; 8]>,
}

impl RdbSnapshot {
    /// Decodes a full snapshot, dropping entries that have already expired.
    pub fn decode(bytes: &[u8]) -> Result<Self, RdbError> {
        RdbParser::new(bytes).parse()
    }
}
