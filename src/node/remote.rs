//! Downstream-forwarding message endpoint

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::client::{Client, ClientConfig};
use crate::core::pool::PooledMessage;
use crate::core::queue::MessageQueue;
use crate::error::{MessagingError, Result};
use crate::node::Node;

/// Node that forwards messages to a downstream server over its own client
///
/// Replies from the downstream server arrive on the client's inbound queue,
/// which is what [`messages`](Node::messages) exposes; the hub relays them
/// to the emitting client like any other node reply.
pub struct RemoteNode {
    client: Client,
}

impl RemoteNode {
    /// Create a disconnected remote node
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a disconnected remote node with custom client configuration
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }

    /// Connect to the downstream server; required before routing
    pub async fn connect(&mut self, address: &str, port: u16) -> Result<()> {
        self.client.connect(address, port).await
    }

    /// Disconnect from the downstream server
    pub async fn disconnect(&mut self) {
        self.client.disconnect().await;
    }

    /// Check if the downstream connection is established
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

impl Default for RemoteNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for RemoteNode {
    async fn treat_message(&self, message: PooledMessage) -> Result<()> {
        if !self.client.is_connected() {
            return Err(MessagingError::NotConnected);
        }
        self.client.send(&message).await
    }

    fn messages(&self) -> Arc<MessageQueue> {
        self.client.messages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::MessagePool;

    #[tokio::test]
    async fn test_treat_message_requires_connection() {
        let node = RemoteNode::new();
        let pool = MessagePool::for_messages();

        let result = node.treat_message(pool.obtain()).await;
        assert!(matches!(result, Err(MessagingError::NotConnected)));
        // The rejected message went back to the pool
        assert_eq!(pool.len(), 1);
    }
}
