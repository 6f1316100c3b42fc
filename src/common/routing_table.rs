//! Fixed 160 bucket Kademlia routing table.

use std::time::Instant;

use crate::common::{Contact, Key, KEY_BITS};

/// The maximum number of contacts per bucket, the Kademlia k parameter.
pub const MAX_BUCKET_SIZE_K: usize = 20;

/// Kademlia routing table with one bucket per possible distance prefix.
///
/// Bucket index grows with distance: bucket 0 covers the keys nearest
/// to the table's own key, bucket 159 the farthest. Buckets order their
/// contacts least recently seen first.
///
/// The table never performs network IO itself. When a bucket is full,
/// [insert](RoutingTable::insert) hands the caller the bucket's head so
/// the caller can probe it without holding the table, and report back
/// through [resolve_full](RoutingTable::resolve_full).
#[derive(Debug, Clone)]
pub struct RoutingTable {
    id: Key,
    buckets: Vec<Bucket>,
}

/// A single routing table bucket.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    contacts: Vec<Contact>,
    refreshed_at: Option<Instant>,
}

/// Outcome of [RoutingTable::insert].
#[derive(Debug, Clone, PartialEq)]
pub enum Insert {
    /// The contact was already present and moved to the tail of its bucket.
    Updated,
    /// The contact was appended to a bucket with room.
    Added,
    /// The bucket is full. `head` is its least recently seen contact,
    /// to be probed by the caller.
    Full { head: Contact },
}

impl RoutingTable {
    /// Creates a new routing table centered on `id`.
    pub fn new(id: Key) -> RoutingTable {
        RoutingTable {
            id,
            buckets: (0..KEY_BITS).map(|_| Bucket::default()).collect(),
        }
    }

    // === Getters ===

    /// Returns the key this routing table is centered on.
    pub fn id(&self) -> &Key {
        &self.id
    }

    /// Returns the total number of contacts across all buckets.
    pub fn size(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.contacts.len())
            .sum()
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|bucket| bucket.contacts.is_empty())
    }

    /// Returns true if a contact with this key is present.
    pub fn contains(&self, id: &Key) -> bool {
        let index = self.bucket_index(id);

        self.buckets[index]
            .contacts
            .iter()
            .any(|contact| contact.id == *id)
    }

    /// Returns a snapshot of all contacts, walking buckets nearest range
    /// first and each bucket least recently seen first.
    pub fn contacts(&self) -> Vec<Contact> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.contacts.iter().cloned())
            .collect()
    }

    /// When the bucket's key range was last walked by a lookup, if ever.
    pub fn refreshed_at(&self, index: usize) -> Option<Instant> {
        self.buckets[index].refreshed_at
    }

    // === Public Methods ===

    /// Maps a key to the index of the bucket covering it. The table's
    /// own key maps to bucket 0.
    pub fn bucket_index(&self, id: &Key) -> usize {
        KEY_BITS - 1 - self.id.distance(id).prefix_length()
    }

    /// Records that a contact was heard from.
    ///
    /// A present contact is replaced and moved to the tail of its
    /// bucket, picking up the fresh address and rtt. A new contact is
    /// appended while the bucket has room. A full bucket returns
    /// [Insert::Full] instead of evicting anything.
    pub fn insert(&mut self, contact: Contact) -> Insert {
        let index = self.bucket_index(&contact.id);
        let bucket = &mut self.buckets[index];

        if let Some(position) = bucket.position(&contact.id) {
            bucket.contacts.remove(position);
            bucket.contacts.push(contact);

            return Insert::Updated;
        }

        if bucket.contacts.len() < MAX_BUCKET_SIZE_K {
            bucket.contacts.push(contact);

            return Insert::Added;
        }

        Insert::Full {
            head: bucket.contacts[0].clone(),
        }
    }

    /// Completes a full bucket insert after the caller probed the head.
    ///
    /// The bucket may have changed while the probe ran, so its state is
    /// checked from scratch. A head that answered the probe moves to the
    /// tail and the newcomer is dropped. A head that did not answer is
    /// evicted and the newcomer appended in its place.
    pub fn resolve_full(&mut self, contact: Contact, head_id: &Key, head_alive: bool) {
        let index = self.bucket_index(&contact.id);
        let bucket = &mut self.buckets[index];

        // The newcomer may have been inserted while the probe ran.
        if let Some(position) = bucket.position(&contact.id) {
            bucket.contacts.remove(position);
            bucket.contacts.push(contact);

            return;
        }

        // Room may have appeared in the meantime.
        if bucket.contacts.len() < MAX_BUCKET_SIZE_K {
            bucket.contacts.push(contact);

            return;
        }

        let head_position = match bucket.position(head_id) {
            Some(position) => position,
            // The head is already gone, the newcomer loses its slot.
            None => return,
        };

        if head_alive {
            let head = bucket.contacts.remove(head_position);
            bucket.contacts.push(head);
        } else {
            bucket.contacts.remove(head_position);
            bucket.contacts.push(contact);
        }
    }

    /// Records that the bucket's key range was walked by a lookup, so a
    /// periodic refresh policy can skip it.
    pub fn refresh_bucket(&mut self, index: usize) {
        self.buckets[index].refreshed_at = Some(Instant::now());
    }

    /// Returns up to `count` contacts from the bucket ranges closest to
    /// `target`.
    ///
    /// Buckets at the set bits of the distance to the target are visited
    /// most significant first, then all remaining buckets nearest first.
    /// The result is ordered by bucket range, not strictly by distance.
    /// Callers that need a strict ordering sort it themselves.
    pub fn find_closest(&self, target: &Key, count: usize) -> Vec<Contact> {
        let mut closest = Vec::with_capacity(count);
        let mut visited = [false; KEY_BITS];

        let distance = self.id.distance(target);

        for index in distance.set_bit_indices() {
            visited[index] = true;

            if self.append_bucket(&mut closest, index, count) {
                return closest;
            }
        }

        for index in 0..KEY_BITS {
            if visited[index] {
                continue;
            }

            if self.append_bucket(&mut closest, index, count) {
                return closest;
            }
        }

        closest
    }

    // === Private Methods ===

    /// Appends contacts from one bucket until `count` is reached.
    /// Returns true once the result is full.
    fn append_bucket(&self, closest: &mut Vec<Contact>, index: usize, count: usize) -> bool {
        for contact in &self.buckets[index].contacts {
            closest.push(contact.clone());

            if closest.len() == count {
                return true;
            }
        }

        false
    }
}

impl Bucket {
    fn position(&self, id: &Key) -> Option<usize> {
        self.contacts.iter().position(|contact| contact.id == *id)
    }
}

#[cfg(test)]
mod test {
    use std::net::{Ipv4Addr, SocketAddrV4};

    use super::*;

    fn contact_in_farthest_bucket(last: u8) -> Contact {
        let mut bytes = [0u8; 20];
        bytes[0] = 128;
        bytes[19] = last;

        Contact::new(
            Key(bytes),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4000 + last as u16),
        )
    }

    fn full_table() -> RoutingTable {
        let mut table = RoutingTable::new(Key([0u8; 20]));

        for i in 0..MAX_BUCKET_SIZE_K {
            assert_eq!(
                table.insert(contact_in_farthest_bucket(i as u8)),
                Insert::Added
            );
        }

        table
    }

    #[test]
    fn bucket_index_grows_with_distance() {
        let table = RoutingTable::new(Key([0u8; 20]));

        let mut far = [0u8; 20];
        far[0] = 128;
        assert_eq!(table.bucket_index(&Key(far)), 159);

        let mut near = [0u8; 20];
        near[19] = 1;
        assert_eq!(table.bucket_index(&Key(near)), 0);

        let mut next = [0u8; 20];
        next[19] = 2;
        assert_eq!(table.bucket_index(&Key(next)), 1);

        let mut mid = [0u8; 20];
        mid[1] = 1;
        assert_eq!(table.bucket_index(&Key(mid)), 144);

        // The table's own key maps to the nearest bucket.
        assert_eq!(table.bucket_index(&Key([0u8; 20])), 0);
    }

    #[test]
    fn insert_appends_and_updates() {
        let mut table = RoutingTable::new(Key([0u8; 20]));

        let a = contact_in_farthest_bucket(0);
        let b = contact_in_farthest_bucket(1);

        assert_eq!(table.insert(a.clone()), Insert::Added);
        assert_eq!(table.insert(b.clone()), Insert::Added);
        assert_eq!(table.size(), 2);

        // Hearing from a again moves it to the tail.
        assert_eq!(table.insert(a.clone()), Insert::Updated);
        assert_eq!(table.size(), 2);
        assert_eq!(table.buckets[159].contacts, vec![b, a]);
    }

    #[test]
    fn insert_reports_the_head_of_a_full_bucket() {
        let mut table = full_table();

        let newcomer = contact_in_farthest_bucket(200);
        let head = contact_in_farthest_bucket(0);

        assert_eq!(table.insert(newcomer), Insert::Full { head });
        assert_eq!(table.size(), MAX_BUCKET_SIZE_K);
    }

    #[test]
    fn resolve_full_keeps_a_live_head() {
        let mut table = full_table();

        let newcomer = contact_in_farthest_bucket(200);
        let head = contact_in_farthest_bucket(0);

        table.resolve_full(newcomer.clone(), &head.id, true);

        assert!(!table.contains(&newcomer.id));
        assert!(table.contains(&head.id));
        assert_eq!(table.buckets[159].contacts.last(), Some(&head));
        assert_eq!(
            table.buckets[159].contacts[0],
            contact_in_farthest_bucket(1)
        );
    }

    #[test]
    fn resolve_full_replaces_a_dead_head() {
        let mut table = full_table();

        let newcomer = contact_in_farthest_bucket(200);
        let head = contact_in_farthest_bucket(0);

        table.resolve_full(newcomer.clone(), &head.id, false);

        assert!(!table.contains(&head.id));
        assert_eq!(table.buckets[159].contacts.last(), Some(&newcomer));
        assert_eq!(table.size(), MAX_BUCKET_SIZE_K);
    }

    #[test]
    fn resolve_full_rechecks_the_bucket_state() {
        // The newcomer got inserted while the probe ran: it only moves
        // to the tail, nothing is evicted.
        let mut table = full_table();
        let present = contact_in_farthest_bucket(5);
        let head = contact_in_farthest_bucket(0);

        table.resolve_full(present.clone(), &head.id, false);

        assert!(table.contains(&head.id));
        assert_eq!(table.buckets[159].contacts.last(), Some(&present));
        assert_eq!(table.size(), MAX_BUCKET_SIZE_K);

        // The head vanished while the probe ran: the newcomer is dropped.
        let mut table = full_table();
        let newcomer = contact_in_farthest_bucket(200);
        let gone = contact_in_farthest_bucket(222);

        table.resolve_full(newcomer.clone(), &gone.id, false);

        assert!(!table.contains(&newcomer.id));
        assert_eq!(table.size(), MAX_BUCKET_SIZE_K);

        // Room appeared while the probe ran: the newcomer just takes it.
        let mut table = full_table();
        let head = contact_in_farthest_bucket(0);
        table.buckets[159].contacts.remove(3);

        table.resolve_full(newcomer.clone(), &head.id, true);

        assert!(table.contains(&newcomer.id));
        assert!(table.contains(&head.id));
        assert_eq!(table.size(), MAX_BUCKET_SIZE_K);
    }

    #[test]
    fn find_closest_prefers_the_target_bucket() {
        let mut table = RoutingTable::new(Key([0u8; 20]));

        let mut near_bytes = [0u8; 20];
        near_bytes[19] = 1;
        let near = Contact::new(Key(near_bytes), SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4001));

        let far = contact_in_farthest_bucket(0);

        table.insert(far.clone());
        table.insert(near.clone());

        // The target sits in the same range as `near`.
        let target = near.id;

        assert_eq!(table.find_closest(&target, 1), vec![near.clone()]);
        assert_eq!(table.find_closest(&target, 2), vec![near, far]);
    }

    #[test]
    fn find_closest_respects_count() {
        let mut table = RoutingTable::new(Key::random());

        for _ in 0..50 {
            table.insert(Contact::random());
        }

        let target = Key::random();

        assert_eq!(table.find_closest(&target, 20).len(), 20);
        assert_eq!(table.find_closest(&target, 5).len(), 5);
        assert!(table.find_closest(&target, 100).len() <= table.size());
    }

    #[test]
    fn find_closest_on_an_empty_table() {
        let table = RoutingTable::new(Key::random());

        assert!(table.find_closest(&Key::random(), 20).is_empty());
        assert!(table.is_empty());
        assert_eq!(table.size(), 0);
    }

    #[test]
    fn contacts_walks_buckets_nearest_first() {
        let mut table = RoutingTable::new(Key([0u8; 20]));

        let mut near_bytes = [0u8; 20];
        near_bytes[19] = 1;
        let near = Contact::new(Key(near_bytes), SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4001));

        let far = contact_in_farthest_bucket(0);

        table.insert(far.clone());
        table.insert(near.clone());

        assert_eq!(table.contacts(), vec![near, far]);
    }

    #[test]
    fn refresh_bucket_records_the_time() {
        let mut table = RoutingTable::new(Key::random());

        assert!(table.refreshed_at(42).is_none());

        table.refresh_bucket(42);

        assert!(table.refreshed_at(42).is_some());
    }
}
