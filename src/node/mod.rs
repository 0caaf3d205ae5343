//! Logical message endpoints and the routing hub
//!
//! A [`Node`] is a named endpoint owned by a [`CentralNode`]. The hub drains
//! its server's inbound queue, routes each message to the node registered
//! for its type, and relays node replies back to the emitting client (or to
//! every client when no emitter is recorded).

mod central;
mod local;
mod remote;

pub use central::CentralNode;
pub use local::LocalNode;
pub use remote::RemoteNode;

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::pool::PooledMessage;
use crate::core::queue::MessageQueue;
use crate::error::Result;

/// Capability contract shared by [`LocalNode`] and [`RemoteNode`]
#[async_trait]
pub trait Node: Send + Sync {
    /// Accept an inbound message for processing
    ///
    /// Ownership of the pooled message transfers to the node; when the node
    /// is done with it, the handle returns to its pool.
    async fn treat_message(&self, message: PooledMessage) -> Result<()>;

    /// Outbound queue of reply messages produced by this node
    fn messages(&self) -> Arc<MessageQueue>;
}
