//! Storage backends for the values a peer holds.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;

use bytes::Bytes;

use crate::common::encode_data;

/// Key value storage for the values a peer holds on behalf of the
/// network.
///
/// Keys are the base64 encoded SHA-1 hash of the value, as produced by
/// [encode_data](crate::encode_data). An implementation is shared by
/// all server and client threads of a peer, so it synchronizes its own
/// state.
pub trait Store: Send + Sync + Debug {
    /// Stores data under the key derived from its content, and returns
    /// that key.
    fn put(&self, data: &[u8]) -> Result<String, StoreError>;

    /// Returns the data stored under a key.
    fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Removes the data stored under a key.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// No value is stored under the requested key.
    #[error("No value stored under {0}")]
    NotFound(String),

    /// The backend failed in a backend specific way.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// The in memory [Store] peers use by default.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl Store for MemoryStore {
    fn put(&self, data: &[u8]) -> Result<String, StoreError> {
        let key = encode_data(data);

        let mut values = self
            .values
            .lock()
            .unwrap_or_else(|error| error.into_inner());
        values.insert(key.clone(), Bytes::copy_from_slice(data));

        Ok(key)
    }

    fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let values = self
            .values
            .lock()
            .unwrap_or_else(|error| error.into_inner());

        values
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(|error| error.into_inner());

        values
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
