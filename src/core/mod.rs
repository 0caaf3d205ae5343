//! Core transport components

pub mod client;
pub mod message;
pub mod pool;
pub mod queue;
pub mod server;

pub use client::{Client, ClientConfig, ClientState, ConnectCallback, DisconnectCallback};
pub use message::{ClientId, Header, Message, MessageType, MAX_MESSAGE_SIZE, NO_EMITTER};
pub use pool::{MessagePool, Pool, Pooled, PooledMessage};
pub use queue::{MessageQueue, SharedQueue};
pub use server::{
    ConnectionCallback, DisconnectionCallback, Server, ServerConfig, FIRST_CLIENT_ID,
};

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;

use crate::error::{MessagingError, Result};

/// Read one framed message: the fixed-size header first, then exactly
/// `length` payload bytes.
///
/// Any short or failed read, including a clean EOF between messages, is a
/// disconnect from the caller's point of view. The message comes from `pool`
/// and returns there automatically if the payload read fails midway.
pub(crate) async fn read_message<R>(reader: &mut R, pool: &MessagePool) -> Result<PooledMessage>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; Header::WIRE_SIZE];
    reader
        .read_exact(&mut header_bytes)
        .await
        .map_err(|e| MessagingError::connection(format!("Failed to read header: {}", e)))?;

    let header = Header::from_wire(&header_bytes);
    let length = header.len() as usize;
    if length > MAX_MESSAGE_SIZE {
        return Err(MessagingError::MessageTooLarge(length, MAX_MESSAGE_SIZE));
    }

    let mut message = pool.obtain();
    message.set_type(header.message_type());
    message.set_emitter_id(header.emitter_id());

    if length > 0 {
        message.resize(length);
        reader
            .read_exact(message.payload_mut())
            .await
            .map_err(|e| MessagingError::connection(format!("Failed to read payload: {}", e)))?;
    }

    Ok(message)
}

/// Apply TCP keep-alive to a stream via socket2, restoring non-blocking mode
/// before handing the socket back to tokio.
pub(crate) fn configure_keepalive(stream: TcpStream, interval: Duration) -> Result<TcpStream> {
    let std_stream = stream.into_std()?;
    let socket = socket2::Socket::from(std_stream);

    let keep_alive = socket2::TcpKeepalive::new().with_time(interval);
    socket.set_tcp_keepalive(&keep_alive)?;

    // tokio requires non-blocking sockets; socket2 operations may clear the flag
    socket.set_nonblocking(true)?;

    Ok(TcpStream::from_std(socket.into())?)
}
