//! Iterative lookups walking the network toward a target key.

use std::collections::{HashSet, VecDeque};
use std::thread;

use bytes::Bytes;
use tracing::debug;

use crate::common::{verify_content, Contact, Key, MAX_BUCKET_SIZE_K};
use crate::peer::Peer;
use crate::rpc::client::Outcome;
use crate::rpc::messages::FindValueResponseArguments;

/// The number of RPCs a lookup keeps in flight, the Kademlia alpha
/// parameter.
pub const ALPHA: usize = 3;

/// What an iterative value lookup found.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    /// The bytes stored under the target key.
    Value(Bytes),
    /// No peer held the value. The closest contacts discovered instead,
    /// nearest first.
    Closest(Vec<Contact>),
}

impl Peer {
    /// Finds the closest contacts to `target` the network knows.
    ///
    /// The walk seeds itself from the local routing table, keeps up to
    /// [ALPHA] requests in flight, and only stops once every discovered
    /// contact was asked. Returns up to k contacts, nearest first.
    pub fn iterative_find_node(&self, target: &Key) -> Vec<Contact> {
        let (done, completions) = flume::unbounded();

        let seed = self.table().find_closest(target, ALPHA);
        let mut frontier = Frontier::new(*target, *self.id(), seed);

        self.pump_find_node(&mut frontier, target, &done);

        while frontier.pending > 0 {
            match completions.recv() {
                Ok(Outcome::Response(contacts)) => {
                    frontier.pending -= 1;

                    for contact in contacts {
                        frontier.discover(contact);
                    }
                }
                Ok(Outcome::NoResponse) => {
                    frontier.pending -= 1;
                }
                Err(_) => break,
            }

            self.pump_find_node(&mut frontier, target, &done);
        }

        debug!(%target, found = frontier.results.len(), "node lookup finished");

        frontier.into_closest()
    }

    /// Finds the value stored under `target`.
    ///
    /// The walk short circuits as soon as any peer answers with data
    /// that actually hashes to the target. Data failing that check is
    /// ignored and the walk goes on.
    pub fn iterative_find_value(&self, target: &Key) -> LookupResult {
        let (done, completions) = flume::unbounded();

        let seed = self.table().find_closest(target, ALPHA);
        let mut frontier = Frontier::new(*target, *self.id(), seed);

        self.pump_find_value(&mut frontier, target, &done);

        while frontier.pending > 0 {
            match completions.recv() {
                Ok(Outcome::Response(answer)) => {
                    frontier.pending -= 1;

                    if let Some(data) = answer.data {
                        if verify_content(&data, target) {
                            debug!(%target, "value lookup finished with a hit");
                            return LookupResult::Value(data);
                        }

                        debug!(%target, "ignoring data that does not hash to the target");
                    }

                    for contact in answer.contacts {
                        frontier.discover(contact);
                    }
                }
                Ok(Outcome::NoResponse) => {
                    frontier.pending -= 1;
                }
                Err(_) => break,
            }

            self.pump_find_value(&mut frontier, target, &done);
        }

        debug!(%target, "value lookup finished without a hit");

        LookupResult::Closest(frontier.into_closest())
    }

    /// Replicates `data` under `target` on the closest contacts the
    /// network knows.
    ///
    /// The STOREs are fire and forget: the returned count is how many
    /// contacts were sent one, not how many acknowledged it.
    pub fn iterative_store(&self, target: &Key, data: &[u8]) -> usize {
        let contacts = self.iterative_find_node(target);

        let data = Bytes::copy_from_slice(data);
        let (done, _) = flume::unbounded();

        for contact in &contacts {
            let peer = self.clone();
            let contact = contact.clone();
            let data = data.clone();
            let done = done.clone();

            thread::spawn(move || peer.send_store(&contact, data, &done));
        }

        debug!(%target, count = contacts.len(), "replicating value");

        contacts.len()
    }

    // === Private Methods ===

    fn pump_find_node(
        &self,
        frontier: &mut Frontier,
        target: &Key,
        done: &flume::Sender<Outcome<Vec<Contact>>>,
    ) {
        while frontier.pending < ALPHA {
            let contact = match frontier.next_contact() {
                Some(contact) => contact,
                None => break,
            };

            let peer = self.clone();
            let target = *target;
            let done = done.clone();

            thread::spawn(move || peer.send_find_node(&contact, &target, &done));
            frontier.pending += 1;
        }
    }

    fn pump_find_value(
        &self,
        frontier: &mut Frontier,
        target: &Key,
        done: &flume::Sender<Outcome<FindValueResponseArguments>>,
    ) {
        while frontier.pending < ALPHA {
            let contact = match frontier.next_contact() {
                Some(contact) => contact,
                None => break,
            };

            let peer = self.clone();
            let target = *target;
            let done = done.clone();

            thread::spawn(move || peer.send_find_value(&contact, &target, &done));
            frontier.pending += 1;
        }
    }
}

/// Bookkeeping of one iterative walk.
struct Frontier {
    target: Key,
    self_id: Key,
    results: Vec<Contact>,
    todo: VecDeque<Contact>,
    seen: HashSet<Key>,
    pending: usize,
}

impl Frontier {
    fn new(target: Key, self_id: Key, seed: Vec<Contact>) -> Frontier {
        let mut frontier = Frontier {
            target,
            self_id,
            results: Vec::new(),
            todo: VecDeque::new(),
            seen: HashSet::new(),
            pending: 0,
        };

        for contact in seed {
            frontier.discover(contact);
        }

        frontier
    }

    /// Files a contact for querying, unless it was already seen or is
    /// the walking peer itself.
    fn discover(&mut self, contact: Contact) {
        if contact.id == self.self_id || !self.seen.insert(contact.id) {
            return;
        }

        self.results.push(contact.clone());
        self.todo.push_back(contact);
    }

    fn next_contact(&mut self) -> Option<Contact> {
        self.todo.pop_front()
    }

    /// Everything discovered, sorted nearest to the target first and
    /// cut to k entries. The sort is stable so equal distances keep
    /// their discovery order.
    fn into_closest(mut self) -> Vec<Contact> {
        let target = self.target;

        self.results
            .sort_by(|a, b| a.id.distance(&target).cmp(&b.id.distance(&target)));
        self.results.truncate(MAX_BUCKET_SIZE_K);

        self.results
    }
}
