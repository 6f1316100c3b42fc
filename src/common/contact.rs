//! Contact entry in the routing table.

use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::common::Key;

/// A peer known to the routing table: its key, its IPv4 address, and the
/// round trip time of the last answered RPC if one was measured.
#[derive(Debug, Clone)]
pub struct Contact {
    pub id: Key,
    pub address: SocketAddrV4,
    pub rtt: Option<Duration>,
}

impl Contact {
    /// Creates a new Contact from a key and socket address.
    pub fn new(id: Key, address: SocketAddrV4) -> Contact {
        Contact {
            id,
            address,
            rtt: None,
        }
    }

    /// Generates a Contact with a random key and a loopback address,
    /// useful as a test fixture.
    pub fn random() -> Contact {
        Contact::new(
            Key::random(),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
        )
    }
}

/// Contacts are identified by key alone. Address and rtt are transient
/// connection details.
impl PartialEq for Contact {
    fn eq(&self, other: &Contact) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

impl Display for Contact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}, [ {} ]", self.address, self.id)
    }
}
