//! A local network of peers for tests and demos.

use crate::peer::{Config, Peer};

/// A set of peers on loopback ephemeral ports, each bootstrapped
/// against the first one.
pub struct Testnet {
    pub peers: Vec<Peer>,
}

impl Testnet {
    /// Binds `count` peers and wires them into one network.
    pub fn new(count: usize) -> Result<Testnet, std::io::Error> {
        let mut peers: Vec<Peer> = Vec::with_capacity(count);

        for _ in 0..count {
            let peer = Peer::bind(Config::default())?;

            if let Some(bootstrap) = peers.first() {
                peer.bootstrap(bootstrap.contact());
            }

            peers.push(peer);
        }

        Ok(Testnet { peers })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_peer_joins_the_mesh() {
        let testnet = Testnet::new(3).unwrap();

        assert_eq!(testnet.peers.len(), 3);
        assert!(testnet.peers.iter().all(|peer| !peer.table().is_empty()));
    }
}
