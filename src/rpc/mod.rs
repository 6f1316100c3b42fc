//! RPC protocol: wire messages, framed TCP transport, and the client
//! and server halves of each exchange.

pub(crate) mod client;
pub mod messages;
pub(crate) mod server;
pub(crate) mod socket;

pub use messages::{
    FindNodeRequestArguments, FindNodeResponseArguments, FindValueRequestArguments,
    FindValueResponseArguments, Message, MessageBody, MessageError, RequestSpecific,
    ResponseSpecific, StoreRequestArguments, COMPACT_CONTACT_SIZE,
};
pub use socket::{RpcError, MAX_MESSAGE_SIZE};
