use std::collections::HashMap;

use jiff::Timestamp;
use tracing::debug;

use crate::rdb::{
    RdbCursor, RdbEntry, RdbError, RdbSnapshot,
    opcode::{OpCode, read_header, read_opcode},
};

#[derive(Debug)]
pub struct RdbParser<'a> {
    cursor: RdbCursor<'a>,
    now: Timestamp,
    metadata: HashMap<String, String>,
    entries: Vec<RdbEntry>,
    database_number: Option<usize>,
}

impl<'a> RdbParser<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: RdbCursor::new(bytes),
            now: Timestamp::now(),
            metadata: HashMap::new(),
            entries: Vec::new(),
            database_number: None,
        }
    }

    /// Overrides the instant used to decide which entries have expired.
    pub fn with_clock(mut self, now: Timestamp) -> Self {
        self.now = now;
        self
    }

    pub fn parse(mut self) -> Result<RdbSnapshot, RdbError> {
        let (magic_string, redis_version) = read_header(&mut self.cursor)?;

        let checksum = loop {
            match read_opcode(&mut self.cursor)? {
                OpCode::Aux { key, value } => {
                    self.metadata.insert(key, value);
                }
                OpCode::SelectDb { database_number } => {
                    self.database_number = Some(database_number);
                }
                OpCode::ResizeDb {
                    db_hash_table_size,
                    expiry_hash_table_size,
                } => {
                    self.entries.reserve(db_hash_table_size);
                    debug!(
                        db_hash_table_size,
                        expiry_hash_table_size, "resizing snapshot database"
                    );
                }
                OpCode::Entry {
                    key,
                    value,
                    expires_at,
                } => {
                    if expires_at.is_some_and(|expires_at| expires_at < self.now) {
                        debug!(key = %key, "skipping expired snapshot entry");
                        continue;
                    }

                    self.entries.push(RdbEntry {
                        key,
                        value,
                        expires_at,
                    });
                }
                OpCode::EndOfFile { checksum } => break checksum,
            }
        };

        debug!(
            version = %redis_version,
            database = ?self.database_number,
            entries = self.entries.len(),
            "decoded snapshot"
        );

        Ok(RdbSnapshot {
            magic_string,
            redis_version,
            metadata: self.metadata,
            entries: self.entries,
            checksum,
        })
    }
}
