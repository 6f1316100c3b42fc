//! Client side of the RPC protocol.
//!
//! Every outgoing request runs on its own thread and reports through a
//! channel, so callers decide how long they are willing to wait. On a
//! response the responder is freshened in the routing table, after the
//! outcome is delivered.

use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::debug;

use crate::common::{Contact, Key};
use crate::peer::Peer;
use crate::rpc::messages::{
    FindNodeRequestArguments, FindValueRequestArguments, FindValueResponseArguments, Message,
    MessageBody, RequestSpecific, ResponseSpecific, StoreRequestArguments,
};
use crate::rpc::socket;

/// What a single RPC attempt produced, delivered on the caller's channel.
#[derive(Debug, Clone)]
pub(crate) enum Outcome<T> {
    Response(T),
    /// The contact did not usefully respond: transport failure, decode
    /// failure, or an answer of the wrong kind.
    NoResponse,
}

impl Peer {
    /// Sends a FIND_NODE for `target` and delivers the returned
    /// contacts on `done`.
    pub(crate) fn send_find_node(
        &self,
        contact: &Contact,
        target: &Key,
        done: &flume::Sender<Outcome<Vec<Contact>>>,
    ) {
        let request = self.request(RequestSpecific::FindNode(FindNodeRequestArguments {
            target: *target,
        }));
        let started = Instant::now();

        match socket::call(contact.address, &request) {
            Ok(response) => match response.body {
                MessageBody::Response(ResponseSpecific::FindNode(arguments)) => {
                    check_nonce(&request.nonce, &response.nonce, contact);
                    let _ = done.send(Outcome::Response(arguments.contacts));
                    self.update_table(responder(response.sender, started));
                }
                _ => {
                    debug!(to = %contact, "unexpected answer to FIND_NODE");
                    let _ = done.send(Outcome::NoResponse);
                }
            },
            Err(error) => {
                debug!(to = %contact, ?error, "FIND_NODE got no response");
                let _ = done.send(Outcome::NoResponse);
            }
        }
    }

    /// Sends a FIND_VALUE for `target` and delivers the answer, either
    /// the value itself or more contacts to ask, on `done`.
    pub(crate) fn send_find_value(
        &self,
        contact: &Contact,
        target: &Key,
        done: &flume::Sender<Outcome<FindValueResponseArguments>>,
    ) {
        let request = self.request(RequestSpecific::FindValue(FindValueRequestArguments {
            target: *target,
        }));
        let started = Instant::now();

        match socket::call(contact.address, &request) {
            Ok(response) => match response.body {
                MessageBody::Response(ResponseSpecific::FindValue(arguments)) => {
                    check_nonce(&request.nonce, &response.nonce, contact);
                    let _ = done.send(Outcome::Response(arguments));
                    self.update_table(responder(response.sender, started));
                }
                _ => {
                    debug!(to = %contact, "unexpected answer to FIND_VALUE");
                    let _ = done.send(Outcome::NoResponse);
                }
            },
            Err(error) => {
                debug!(to = %contact, ?error, "FIND_VALUE got no response");
                let _ = done.send(Outcome::NoResponse);
            }
        }
    }

    /// Sends a STORE of `data` and delivers the bare acknowledgement on
    /// `done`. Replicating callers drop the receiver and fire away.
    pub(crate) fn send_store(
        &self,
        contact: &Contact,
        data: Bytes,
        done: &flume::Sender<Outcome<()>>,
    ) {
        let request = self.request(RequestSpecific::Store(StoreRequestArguments { data }));
        let started = Instant::now();

        match socket::call(contact.address, &request) {
            Ok(response) => match response.body {
                MessageBody::Response(ResponseSpecific::Store) => {
                    check_nonce(&request.nonce, &response.nonce, contact);
                    let _ = done.send(Outcome::Response(()));
                    self.update_table(responder(response.sender, started));
                }
                _ => {
                    debug!(to = %contact, "unexpected answer to STORE");
                    let _ = done.send(Outcome::NoResponse);
                }
            },
            Err(error) => {
                debug!(to = %contact, ?error, "STORE got no response");
                let _ = done.send(Outcome::NoResponse);
            }
        }
    }

    /// Sends a single PING and reports whether the contact answered
    /// within `timeout`.
    ///
    /// This is the probe used while resolving a full bucket, so unlike
    /// the other client calls it leaves the routing table alone. The
    /// spawned worker may outlive the timeout until its connection
    /// settles.
    pub(crate) fn ping_probe(&self, contact: &Contact, timeout: Duration) -> bool {
        let (sender, receiver) = flume::bounded(1);

        let peer = self.clone();
        let contact = contact.clone();

        thread::spawn(move || {
            let request = peer.request(RequestSpecific::Ping);

            let alive = match socket::call(contact.address, &request) {
                Ok(response) => {
                    matches!(response.body, MessageBody::Response(ResponseSpecific::Ping))
                }
                Err(error) => {
                    debug!(to = %contact, ?error, "PING probe got no response");
                    false
                }
            };

            let _ = sender.send(alive);
        });

        receiver.recv_timeout(timeout).unwrap_or(false)
    }

    // === Private Methods ===

    /// Stamps a request body with this peer's contact and a fresh nonce.
    fn request(&self, body: RequestSpecific) -> Message {
        Message {
            sender: self.0.contact.clone(),
            nonce: Key::random(),
            body: MessageBody::Request(body),
        }
    }
}

/// Freshens the responder's contact with the measured round trip time.
fn responder(mut sender: Contact, started: Instant) -> Contact {
    sender.rtt = Some(started.elapsed());
    sender
}

/// Responses are expected to echo the request's nonce. A mismatch is
/// logged and otherwise tolerated.
fn check_nonce(expected: &Key, got: &Key, from: &Contact) {
    if expected != got {
        debug!(%from, %expected, %got, "nonce mismatch in response");
    }
}
