//! Wire messages exchanged between peers.
//!
//! Messages travel as bencoded dictionaries. The public structs here
//! are the decoded form used by the rest of the crate, [internal]
//! holds their serde counterparts.

use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::Bytes;

use crate::common::{Contact, Key, KEY_SIZE};

mod internal;

/// The size of a compact contact encoding: a 20 byte key, a 4 byte
/// IPv4 address and a 2 byte big endian port.
pub const COMPACT_CONTACT_SIZE: usize = 26;

/// A single message, request or response.
///
/// Every message names its sender. Requests carry a random nonce that
/// the response echoes verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub sender: Contact,
    pub nonce: Key,
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Request(RequestSpecific),
    Response(ResponseSpecific),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestSpecific {
    Ping,
    Store(StoreRequestArguments),
    FindNode(FindNodeRequestArguments),
    FindValue(FindValueRequestArguments),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSpecific {
    Ping,
    Store,
    FindNode(FindNodeResponseArguments),
    FindValue(FindValueResponseArguments),
}

// === Arguments ===

#[derive(Debug, Clone, PartialEq)]
pub struct StoreRequestArguments {
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindNodeRequestArguments {
    pub target: Key,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindValueRequestArguments {
    pub target: Key,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindNodeResponseArguments {
    pub contacts: Vec<Contact>,
}

/// Answer to a FIND_VALUE. At most one of `data` and `contacts` is
/// populated.
#[derive(Debug, Clone, PartialEq)]
pub struct FindValueResponseArguments {
    pub contacts: Vec<Contact>,
    pub data: Option<Bytes>,
}

impl Message {
    /// Encodes this message for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        Ok(self.clone().into_wire_message().to_bytes()?)
    }

    /// Decodes a message from its wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Message, MessageError> {
        Message::from_wire_message(internal::WireMessage::from_bytes(bytes)?)
    }

    fn into_wire_message(self) -> internal::WireMessage {
        let variant = match self.body {
            MessageBody::Request(request) => internal::WireVariant::Request(match request {
                RequestSpecific::Ping => internal::WireRequestSpecific::Ping,
                RequestSpecific::Store(arguments) => internal::WireRequestSpecific::Store {
                    arguments: internal::WireStoreRequestArguments {
                        data: arguments.data.to_vec().into_boxed_slice(),
                    },
                },
                RequestSpecific::FindNode(arguments) => internal::WireRequestSpecific::FindNode {
                    arguments: internal::WireTargetArguments {
                        target: arguments.target.0,
                    },
                },
                RequestSpecific::FindValue(arguments) => internal::WireRequestSpecific::FindValue {
                    arguments: internal::WireTargetArguments {
                        target: arguments.target.0,
                    },
                },
            }),
            MessageBody::Response(response) => internal::WireVariant::Response(match response {
                ResponseSpecific::Ping => internal::WireResponseSpecific::Ping,
                ResponseSpecific::Store => internal::WireResponseSpecific::Store,
                ResponseSpecific::FindNode(arguments) => internal::WireResponseSpecific::FindNode {
                    arguments: internal::WireContactsArguments {
                        contacts: contacts_to_bytes(&arguments.contacts),
                    },
                },
                ResponseSpecific::FindValue(arguments) => {
                    internal::WireResponseSpecific::FindValue {
                        arguments: internal::WireFindValueArguments {
                            contacts: contacts_to_bytes(&arguments.contacts),
                            data: arguments
                                .data
                                .map(|data| data.to_vec().into_boxed_slice()),
                        },
                    }
                }
            }),
        };

        internal::WireMessage {
            sender: contact_to_bytes(&self.sender),
            nonce: self.nonce.0,
            variant,
        }
    }

    fn from_wire_message(wire: internal::WireMessage) -> Result<Message, MessageError> {
        let body = match wire.variant {
            internal::WireVariant::Request(request) => MessageBody::Request(match request {
                internal::WireRequestSpecific::Ping => RequestSpecific::Ping,
                internal::WireRequestSpecific::Store { arguments } => {
                    RequestSpecific::Store(StoreRequestArguments {
                        data: Bytes::from(arguments.data.into_vec()),
                    })
                }
                internal::WireRequestSpecific::FindNode { arguments } => {
                    RequestSpecific::FindNode(FindNodeRequestArguments {
                        target: Key(arguments.target),
                    })
                }
                internal::WireRequestSpecific::FindValue { arguments } => {
                    RequestSpecific::FindValue(FindValueRequestArguments {
                        target: Key(arguments.target),
                    })
                }
            }),
            internal::WireVariant::Response(response) => MessageBody::Response(match response {
                internal::WireResponseSpecific::Ping => ResponseSpecific::Ping,
                internal::WireResponseSpecific::Store => ResponseSpecific::Store,
                internal::WireResponseSpecific::FindNode { arguments } => {
                    ResponseSpecific::FindNode(FindNodeResponseArguments {
                        contacts: contacts_from_bytes(&arguments.contacts)?,
                    })
                }
                internal::WireResponseSpecific::FindValue { arguments } => {
                    ResponseSpecific::FindValue(FindValueResponseArguments {
                        contacts: contacts_from_bytes(&arguments.contacts)?,
                        data: arguments.data.map(|data| Bytes::from(data.into_vec())),
                    })
                }
            }),
        };

        Ok(Message {
            sender: contact_from_bytes(&wire.sender)?,
            nonce: Key(wire.nonce),
            body,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MessageError {
    /// Failed to encode or decode the bencoded wire form.
    #[error("Failed to parse message bytes: {0}")]
    Bencode(#[from] serde_bencode::Error),

    /// A compact contact encoding with a stray length.
    #[error("Invalid compact contact encoding of {0} bytes")]
    InvalidContactEncoding(usize),
}

// === Helpers ===

fn contact_to_bytes(contact: &Contact) -> [u8; COMPACT_CONTACT_SIZE] {
    let mut bytes = [0u8; COMPACT_CONTACT_SIZE];

    bytes[..KEY_SIZE].copy_from_slice(&contact.id.0);
    bytes[KEY_SIZE..KEY_SIZE + 4].copy_from_slice(&contact.address.ip().octets());
    bytes[KEY_SIZE + 4..].copy_from_slice(&contact.address.port().to_be_bytes());

    bytes
}

fn contact_from_bytes(bytes: &[u8]) -> Result<Contact, MessageError> {
    if bytes.len() != COMPACT_CONTACT_SIZE {
        return Err(MessageError::InvalidContactEncoding(bytes.len()));
    }

    let mut id = [0u8; KEY_SIZE];
    id.copy_from_slice(&bytes[..KEY_SIZE]);

    let ip = Ipv4Addr::new(bytes[20], bytes[21], bytes[22], bytes[23]);
    let port = u16::from_be_bytes([bytes[24], bytes[25]]);

    Ok(Contact::new(Key(id), SocketAddrV4::new(ip, port)))
}

fn contacts_to_bytes(contacts: &[Contact]) -> Box<[u8]> {
    let mut bytes = Vec::with_capacity(contacts.len() * COMPACT_CONTACT_SIZE);

    for contact in contacts {
        bytes.extend_from_slice(&contact_to_bytes(contact));
    }

    bytes.into_boxed_slice()
}

fn contacts_from_bytes(bytes: &[u8]) -> Result<Vec<Contact>, MessageError> {
    if bytes.len() % COMPACT_CONTACT_SIZE != 0 {
        return Err(MessageError::InvalidContactEncoding(bytes.len()));
    }

    bytes
        .chunks_exact(COMPACT_CONTACT_SIZE)
        .map(contact_from_bytes)
        .collect()
}
