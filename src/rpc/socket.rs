//! Framed TCP transport carrying one request response exchange per
//! connection.

use std::io::{Read, Write};
use std::net::{SocketAddrV4, TcpStream};

use tracing::trace;

use crate::rpc::messages::{Message, MessageError};

/// The maximum size of a framed message in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error(transparent)]
    Message(#[from] MessageError),

    /// A frame longer than [MAX_MESSAGE_SIZE].
    #[error("Message of {0} bytes exceeds the maximum message size")]
    MessageTooLarge(usize),
}

/// Writes one message prefixed with its big endian u32 length.
pub(crate) fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<(), RpcError> {
    let bytes = message.to_bytes()?;

    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(RpcError::MessageTooLarge(bytes.len()));
    }

    writer.write_all(&(bytes.len() as u32).to_be_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()?;

    Ok(())
}

/// Reads one length prefixed message. The length is checked before the
/// body is read.
pub(crate) fn read_message<R: Read>(reader: &mut R) -> Result<Message, RpcError> {
    let mut length_bytes = [0u8; 4];
    reader.read_exact(&mut length_bytes)?;

    let length = u32::from_be_bytes(length_bytes) as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(RpcError::MessageTooLarge(length));
    }

    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes)?;

    Ok(Message::from_bytes(&bytes)?)
}

/// Connects to a peer, performs one request response exchange, and
/// drops the connection.
///
/// Blocks until the exchange settles one way or the other. Callers that
/// need a deadline run this on its own thread and wait on a channel.
pub(crate) fn call(address: SocketAddrV4, request: &Message) -> Result<Message, RpcError> {
    trace!(context = "socket_message_sending", message = ?request, %address);

    let mut stream = TcpStream::connect(address)?;

    write_message(&mut stream, request)?;
    let response = read_message(&mut stream)?;

    trace!(context = "socket_message_receiving", message = ?response, %address);

    Ok(response)
}
