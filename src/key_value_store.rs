use std::collections::HashMap;

use bytes::Bytes;
use jiff::Timestamp;

use crate::rdb::RdbSnapshot;

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub data: Bytes,
    pub expiration: Option<Timestamp>,
}

impl Value {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiration.is_some_and(|expiration| now > expiration)
    }
}

/// In-memory string store. Expired keys are removed when they are read.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: HashMap<String, Value>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        self.get_at(key, Timestamp::now())
    }

    pub fn get_at(&mut self, key: &str, now: Timestamp) -> Option<Bytes> {
        let value = self.entries.get(key)?;

        if value.is_expired(now) {
            self.entries.remove(key);
            return None;
        }

        Some(value.data.clone())
    }

    pub fn set(&mut self, key: String, data: Bytes, expiration: Option<Timestamp>) {
        self.entries.insert(key, Value { data, expiration });
    }

    /// Live keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let now = Timestamp::now();

        self.entries
            .iter()
            .filter(|(_, value)| !value.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn import_snapshot(&mut self, snapshot: &RdbSnapshot) {
        for entry in &snapshot.entries {
            self.set(entry.key.clone(), entry.value.clone(), entry.expires_at);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
