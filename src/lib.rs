//! Message Hub
//!
//! A length-prefixed binary messaging layer with a type-based routing hub.
//!
//! ## Features
//!
//! - Fixed-header wire format (type, emitter id, derived length) over TCP
//! - Pooled message objects with automatic return on release
//! - Concurrent FIFO queues for network/application hand-off
//! - Single-connection client with a background receive loop
//! - Multi-client server with connection/disconnection hooks
//! - `CentralNode` hub routing inbound messages to named nodes by type and
//!   relaying node replies back to the emitting client
//!
//! ## Example
//!
//! ```no_run
//! use message_hub::{CentralNode, LocalNode, Node};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> message_hub::Result<()> {
//!     let echo = Arc::new(LocalNode::new());
//!
//!     let mut hub = CentralNode::new();
//!     hub.add_node("echo", Arc::clone(&echo) as Arc<dyn Node>)?;
//!     hub.setup_redirection(1, "echo")?;
//!     hub.start(8080).await?;
//!
//!     loop {
//!         hub.redirect_messages_to_nodes().await?;
//!
//!         // In-process consumer: answer each question with type 2
//!         while let Some(mut question) = echo.received().pop_front() {
//!             let name = question.read_str()?;
//!             let mut answer = echo.obtain_reply(&question, 2);
//!             answer.write_str(&format!("hello {}", name));
//!             echo.insert_message_answer(answer);
//!         }
//!
//!         hub.redirect_messages_to_clients().await?;
//!     }
//! }
//! ```

pub mod core;
pub mod error;
pub mod node;

// Re-export main types
pub use crate::core::{
    Client, ClientConfig, ClientId, ClientState, ConnectCallback, ConnectionCallback,
    DisconnectCallback, DisconnectionCallback, Header, Message, MessagePool, MessageQueue,
    MessageType, Pool, Pooled, PooledMessage, Server, ServerConfig, SharedQueue, FIRST_CLIENT_ID,
    MAX_MESSAGE_SIZE, NO_EMITTER,
};
pub use crate::error::{MessagingError, Result};
pub use crate::node::{CentralNode, LocalNode, Node, RemoteNode};
