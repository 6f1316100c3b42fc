//! Server side of the RPC protocol: the accept loop and the request
//! handlers.

use std::net::{TcpListener, TcpStream};
use std::thread;

use tracing::{debug, trace};

use crate::common::{Contact, Key, MAX_BUCKET_SIZE_K};
use crate::peer::Peer;
use crate::rpc::messages::{
    FindNodeResponseArguments, FindValueResponseArguments, Message, MessageBody, RequestSpecific,
    ResponseSpecific,
};
use crate::rpc::socket::{self, RpcError};

/// Accepts connections for the lifetime of the process, one thread per
/// connection.
pub(crate) fn run(peer: Peer, listener: TcpListener) {
    loop {
        match listener.accept() {
            Ok((stream, from)) => {
                let peer = peer.clone();

                thread::spawn(move || {
                    if let Err(error) = serve_connection(&peer, stream) {
                        debug!(?error, %from, "failed to serve connection");
                    }
                });
            }
            Err(error) => {
                debug!(?error, "failed to accept connection");
            }
        }
    }
}

/// Reads one request, answers it, and lets the connection drop.
fn serve_connection(peer: &Peer, mut stream: TcpStream) -> Result<(), RpcError> {
    let request = socket::read_message(&mut stream)?;

    let body = match request.body {
        MessageBody::Request(body) => body,
        MessageBody::Response(_) => {
            debug!(from = %request.sender, "dropping stray response");
            return Ok(());
        }
    };

    let response = peer.handle_request(request.sender, request.nonce, body);

    socket::write_message(&mut stream, &response)
}

impl Peer {
    /// Answers one request. Every request is also a liveness signal, so
    /// the sender goes through the routing table first.
    fn handle_request(&self, sender: Contact, nonce: Key, request: RequestSpecific) -> Message {
        trace!(from = %sender, ?request, "handling request");

        self.update_table(sender);

        let body = match request {
            RequestSpecific::Ping => ResponseSpecific::Ping,
            RequestSpecific::Store(arguments) => {
                match self.0.store.put(&arguments.data) {
                    Ok(key) => debug!(%key, "stored value"),
                    // The ack still goes out, replication is best effort.
                    Err(error) => debug!(?error, "failed to store value"),
                }

                ResponseSpecific::Store
            }
            RequestSpecific::FindNode(arguments) => {
                ResponseSpecific::FindNode(FindNodeResponseArguments {
                    contacts: self
                        .table()
                        .find_closest(&arguments.target, MAX_BUCKET_SIZE_K),
                })
            }
            RequestSpecific::FindValue(arguments) => {
                let key = arguments.target.to_string();

                match self.0.store.get(&key) {
                    Ok(data) => ResponseSpecific::FindValue(FindValueResponseArguments {
                        contacts: vec![],
                        data: Some(data),
                    }),
                    Err(error) => {
                        trace!(%key, ?error, "value not held, answering with contacts");

                        ResponseSpecific::FindValue(FindValueResponseArguments {
                            contacts: self
                                .table()
                                .find_closest(&arguments.target, MAX_BUCKET_SIZE_K),
                            data: None,
                        })
                    }
                }
            }
        };

        Message {
            sender: self.0.contact.clone(),
            nonce,
            body: MessageBody::Response(body),
        }
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::common::hash_data;
    use crate::peer::Config;
    use crate::rpc::messages::{
        FindNodeRequestArguments, FindValueRequestArguments, StoreRequestArguments,
    };

    fn request(sender: &Contact, body: RequestSpecific) -> Message {
        Message {
            sender: sender.clone(),
            nonce: Key::random(),
            body: MessageBody::Request(body),
        }
    }

    #[test]
    fn every_request_updates_the_routing_table() {
        let peer = Peer::bind(Config::default()).unwrap();
        let stranger = Contact::random();

        let message = request(&stranger, RequestSpecific::Ping);
        let response = socket::call(peer.local_addr(), &message).unwrap();

        assert_eq!(response.nonce, message.nonce);
        assert_eq!(response.sender.id, *peer.id());
        assert!(matches!(
            response.body,
            MessageBody::Response(ResponseSpecific::Ping)
        ));
        assert!(peer.table().contains(&stranger.id));
    }

    #[test]
    fn store_then_find_value() {
        let peer = Peer::bind(Config::default()).unwrap();
        let stranger = Contact::random();

        let data = Bytes::from_static(b"hello");
        let target = hash_data(&data);

        let store = request(
            &stranger,
            RequestSpecific::Store(StoreRequestArguments { data: data.clone() }),
        );
        let response = socket::call(peer.local_addr(), &store).unwrap();
        assert!(matches!(
            response.body,
            MessageBody::Response(ResponseSpecific::Store)
        ));

        let find = request(
            &stranger,
            RequestSpecific::FindValue(FindValueRequestArguments { target }),
        );
        let response = socket::call(peer.local_addr(), &find).unwrap();

        match response.body {
            MessageBody::Response(ResponseSpecific::FindValue(arguments)) => {
                assert_eq!(arguments.data, Some(data));
                assert!(arguments.contacts.is_empty());
            }
            other => panic!("expected a FIND_VALUE response, got {:?}", other),
        }

        assert_eq!(peer.get(&target.to_string()).unwrap().as_ref(), b"hello");
    }

    #[test]
    fn find_value_miss_answers_with_contacts() {
        let peer = Peer::bind(Config::default()).unwrap();
        let stranger = Contact::random();

        let find = request(
            &stranger,
            RequestSpecific::FindValue(FindValueRequestArguments {
                target: hash_data(b"nowhere"),
            }),
        );
        let response = socket::call(peer.local_addr(), &find).unwrap();

        match response.body {
            MessageBody::Response(ResponseSpecific::FindValue(arguments)) => {
                assert!(arguments.data.is_none());
                // The stranger itself is all this peer knows.
                assert_eq!(arguments.contacts, vec![stranger]);
            }
            other => panic!("expected a FIND_VALUE response, got {:?}", other),
        }
    }

    #[test]
    fn find_node_returns_known_contacts() {
        let peer = Peer::bind(Config::default()).unwrap();
        let first = Contact::random();
        let second = Contact::random();

        let ping = request(&first, RequestSpecific::Ping);
        socket::call(peer.local_addr(), &ping).unwrap();

        let find = request(
            &second,
            RequestSpecific::FindNode(FindNodeRequestArguments {
                target: Key::random(),
            }),
        );
        let response = socket::call(peer.local_addr(), &find).unwrap();

        match response.body {
            MessageBody::Response(ResponseSpecific::FindNode(arguments)) => {
                assert!(arguments.contacts.contains(&first));
                assert!(arguments.contacts.contains(&second));
            }
            other => panic!("expected a FIND_NODE response, got {:?}", other),
        }
    }
}
