use std::io::{self, BufRead};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use clap::Parser;
use tracing::Level;

use beeline::{hash_data, Config, Contact, Key, LookupResult, Peer, KEY_SIZE};

const BOOTSTRAP_PORT: u16 = 4000;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on. The peer on port 4000 takes the well known
    /// bootstrap key.
    #[arg(value_parser = clap::value_parser!(u16).range(4000..=5000))]
    port: u16,
}

fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();

    // The bootstrap node is the one everyone can find: zero key, port 4000.
    let key = if cli.port == BOOTSTRAP_PORT {
        Key([0u8; KEY_SIZE])
    } else {
        Key::random()
    };

    let peer = Peer::bind(Config {
        key,
        port: cli.port,
        ..Config::default()
    })?;

    println!("Peer {} listening on {}", peer.id(), peer.local_addr());
    println!("Commands: store <text> | get <key> | bootstrap | table");

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.trim().splitn(2, ' ');

        let verb = match parts.next() {
            Some(verb) if !verb.is_empty() => verb.to_lowercase(),
            _ => continue,
        };
        let rest = parts.next().unwrap_or("").trim();

        match verb.as_str() {
            "store" => store(&peer, rest),
            "get" => get(&peer, rest),
            "bootstrap" => {
                let contact = Contact::new(
                    Key([0u8; KEY_SIZE]),
                    SocketAddrV4::new(Ipv4Addr::LOCALHOST, BOOTSTRAP_PORT),
                );
                peer.bootstrap(contact);

                println!("Routing table has {} contacts", peer.table_size());
            }
            "table" => {
                for contact in peer.contacts() {
                    println!("{}", contact);
                }
            }
            _ => println!(
                "Unknown command {:?}. Try: store <text> | get <key> | bootstrap | table",
                verb
            ),
        }
    }

    Ok(())
}

fn store(peer: &Peer, text: &str) {
    if text.is_empty() {
        println!("Usage: store <text>");
        return;
    }

    let data = text.as_bytes();
    let key = hash_data(data);
    let targeted = peer.iterative_store(&key, data);

    // Keep a local copy too, in case nobody else is around yet.
    if peer.get(&key.to_string()).is_err() {
        if let Err(error) = peer.put(data) {
            println!("Could not store locally: {}", error);
        }
    }

    println!("Stored under {} on {} peers", key, targeted);
}

fn get(peer: &Peer, encoded: &str) {
    let key = match Key::from_str(encoded) {
        Ok(key) => key,
        Err(error) => {
            println!("Not a valid key: {}", error);
            return;
        }
    };

    match peer.iterative_find_value(&key) {
        LookupResult::Value(value) => println!("{}", String::from_utf8_lossy(&value)),
        LookupResult::Closest(_) => println!("No peer holds {}", key),
    }
}
