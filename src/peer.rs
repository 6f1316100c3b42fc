//! Peer lifecycle, routing table upkeep and storage access.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, trace};

use crate::common::{Contact, Insert, Key, RoutingTable};
use crate::rpc::server;
use crate::store::{MemoryStore, Store, StoreError};

/// The network name peers are configured with by default.
pub const DEFAULT_NETWORK_ID: &str = "v1";

/// How long an eviction probe waits for a bucket head to answer.
pub const PING_TIMEOUT: Duration = Duration::from_millis(1000);

/// Settings for a [Peer].
#[derive(Debug, Clone)]
pub struct Config {
    /// The key the peer identifies as.
    pub key: Key,
    /// The address to listen on.
    pub host: Ipv4Addr,
    /// The port to listen on, where 0 binds an ephemeral port.
    pub port: u16,
    /// A name for the network this peer participates in.
    pub network_id: String,
    /// Where values arriving in STORE requests end up.
    pub store: Arc<dyn Store>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            key: Key::random(),
            host: Ipv4Addr::LOCALHOST,
            port: 0,
            network_id: DEFAULT_NETWORK_ID.to_string(),
            store: Arc::new(MemoryStore::new()),
        }
    }
}

/// A Kademlia peer over TCP.
///
/// Cheap to clone; clones share the routing table, the store and the
/// listening socket.
#[derive(Debug, Clone)]
pub struct Peer(pub(crate) Arc<PeerInner>);

#[derive(Debug)]
pub(crate) struct PeerInner {
    pub(crate) contact: Contact,
    pub(crate) network_id: String,
    pub(crate) table: Mutex<RoutingTable>,
    pub(crate) store: Arc<dyn Store>,
}

impl Peer {
    /// Creates a peer listening for requests, per `config`.
    pub fn bind(config: Config) -> Result<Peer, std::io::Error> {
        let listener = TcpListener::bind(SocketAddrV4::new(config.host, config.port))?;

        let address = match listener.local_addr()? {
            SocketAddr::V4(address) => address,
            SocketAddr::V6(address) => unreachable!("IPv4 bind yielded {}", address),
        };

        let peer = Peer(Arc::new(PeerInner {
            contact: Contact::new(config.key, address),
            network_id: config.network_id,
            table: Mutex::new(RoutingTable::new(config.key)),
            store: config.store,
        }));

        let server = peer.clone();
        thread::spawn(move || server::run(server, listener));

        info!(%address, network_id = %peer.0.network_id, "peer listening");

        Ok(peer)
    }

    // === Getters ===

    /// This peer's own contact entry, carrying the actual bound address.
    pub fn contact(&self) -> Contact {
        self.0.contact.clone()
    }

    /// The key this peer identifies as.
    pub fn id(&self) -> &Key {
        &self.0.contact.id
    }

    /// The address the peer is listening on.
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.0.contact.address
    }

    /// The name of the network this peer participates in.
    pub fn network_id(&self) -> &str {
        &self.0.network_id
    }

    /// The number of contacts in the routing table.
    pub fn table_size(&self) -> usize {
        self.table().size()
    }

    /// Every contact in the routing table, nearest bucket first.
    pub fn contacts(&self) -> Vec<Contact> {
        self.table().contacts()
    }

    // === Public Methods ===

    /// Joins the network known to `contact`.
    ///
    /// Inserts the contact, then looks up this peer's own id so the walk
    /// populates the routing table with everything discovered on the way.
    pub fn bootstrap(&self, contact: Contact) {
        self.update_table(contact);

        let discovered = self.iterative_find_node(self.id());

        {
            let mut table = self.table();

            for contact in &discovered {
                let index = table.bucket_index(&contact.id);
                table.refresh_bucket(index);
            }
        }

        for contact in discovered {
            self.update_table(contact);
        }

        let table_size = self.table_size();

        if table_size == 0 {
            error!("could not bootstrap the routing table");
        } else {
            debug!(table_size, "populated the routing table");
        }
    }

    /// Stores `data` locally, returning the key it was filed under.
    pub fn put(&self, data: &[u8]) -> Result<String, StoreError> {
        self.0.store.put(data)
    }

    /// Reads a locally stored value.
    pub fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.0.store.get(key)
    }

    /// Drops a locally stored value.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.0.store.delete(key)
    }

    // === Private Methods ===

    /// Locks the routing table.
    ///
    /// A poisoned lock is taken over, keeping the table usable after a
    /// handler thread panicked while holding it.
    pub(crate) fn table(&self) -> MutexGuard<'_, RoutingTable> {
        self.0
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts or refreshes `contact`, evicting an unresponsive bucket
    /// head if that is what it takes to make room.
    ///
    /// The eviction probe runs while the table lock is released, so
    /// request handlers calling this never tie the table to network I/O.
    pub(crate) fn update_table(&self, contact: Contact) {
        if contact.id == *self.id() {
            return;
        }

        let head = match self.table().insert(contact.clone()) {
            Insert::Updated => {
                trace!(%contact, "refreshed a known contact");
                return;
            }
            Insert::Added => {
                debug!(%contact, "added a new contact");
                return;
            }
            Insert::Full { head } => head,
        };

        let head_alive = self.ping_probe(&head, PING_TIMEOUT);
        debug!(%head, head_alive, "probed the head of a full bucket");

        self.table().resolve_full(contact, &head.id, head_alive);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::{KEY_SIZE, MAX_BUCKET_SIZE_K};

    /// A key in the farthest bucket of the zero key, distinct per `i`.
    fn far_key(i: u8) -> Key {
        let mut bytes = [0u8; KEY_SIZE];
        bytes[0] = 0x80 | i;
        Key(bytes)
    }

    /// An address nothing listens on anymore.
    fn vacated_address() -> SocketAddrV4 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();

        match listener.local_addr().unwrap() {
            SocketAddr::V4(address) => address,
            SocketAddr::V6(_) => unreachable!(),
        }
    }

    #[test]
    fn update_table_ignores_the_peer_itself() {
        let peer = Peer::bind(Config::default()).unwrap();

        peer.update_table(peer.contact());

        assert!(peer.table().is_empty());
    }

    #[test]
    fn a_live_head_survives_a_full_bucket() {
        let answering = Peer::bind(Config::default()).unwrap();
        let peer = Peer::bind(Config {
            key: Key([0u8; KEY_SIZE]),
            ..Config::default()
        })
        .unwrap();

        let head = Contact::new(far_key(0), answering.local_addr());
        peer.update_table(head.clone());

        for i in 1..MAX_BUCKET_SIZE_K as u8 {
            let address = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1000 + u16::from(i));
            peer.update_table(Contact::new(far_key(i), address));
        }

        let newcomer = Contact::new(
            far_key(MAX_BUCKET_SIZE_K as u8),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 2000),
        );
        peer.update_table(newcomer.clone());

        let table = peer.table();
        assert_eq!(table.size(), MAX_BUCKET_SIZE_K);
        assert!(!table.contains(&newcomer.id));

        // The freshened head moved to the tail of its bucket.
        let last = table.contacts().pop();
        assert_eq!(last.map(|contact| contact.id), Some(head.id));
    }

    #[test]
    fn an_unresponsive_head_is_evicted() {
        let peer = Peer::bind(Config {
            key: Key([0u8; KEY_SIZE]),
            ..Config::default()
        })
        .unwrap();

        let head = Contact::new(far_key(0), vacated_address());
        peer.update_table(head.clone());

        for i in 1..MAX_BUCKET_SIZE_K as u8 {
            let address = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 1000 + u16::from(i));
            peer.update_table(Contact::new(far_key(i), address));
        }

        let newcomer = Contact::new(
            far_key(MAX_BUCKET_SIZE_K as u8),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 2000),
        );
        peer.update_table(newcomer.clone());

        let table = peer.table();
        assert!(!table.contains(&head.id));
        assert!(table.contains(&newcomer.id));

        let last = table.contacts().pop();
        assert_eq!(last.map(|contact| contact.id), Some(newcomer.id));
    }

    #[test]
    fn bootstrap_links_two_peers() {
        let first = Peer::bind(Config::default()).unwrap();
        let second = Peer::bind(Config::default()).unwrap();

        second.bootstrap(first.contact());

        assert!(second.table().contains(first.id()));
        assert!(first.table().contains(second.id()));

        let index = second.table().bucket_index(first.id());
        assert!(second.table().refreshed_at(index).is_some());
    }
}
