#![doc = include_str!("../README.md")]

mod common;
mod lookup;
mod peer;
pub mod rpc;
mod store;
mod testnet;

pub use crate::common::{
    byte_prefix_length, encode_data, hash_data, verify_content, Contact, Insert, Key, KeyError,
    RoutingTable, KEY_BITS, KEY_SIZE, MAX_BUCKET_SIZE_K,
};
pub use crate::lookup::{LookupResult, ALPHA};
pub use crate::peer::{Config, Peer, DEFAULT_NETWORK_ID, PING_TIMEOUT};
pub use crate::store::{MemoryStore, Store, StoreError};
pub use crate::testnet::Testnet;
pub use bytes::Bytes;
