//! Routing hub: one server, named nodes, a type-based redirection table

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::message::{MessageType, NO_EMITTER};
use crate::core::server::{Server, ServerConfig};
use crate::error::{MessagingError, Result};
use crate::node::Node;

/// Central routing hub
///
/// Owns a [`Server`], a name→node table and a message-type→node redirection
/// table. Node and redirection registration is a setup-time-only API: both
/// tables are written before [`start`](CentralNode::start) and read without
/// locking afterwards, which the `&mut self` registration methods enforce.
///
/// The hub runs no background loop of its own; the owning process calls
/// [`redirect_messages_to_nodes`](CentralNode::redirect_messages_to_nodes)
/// and
/// [`redirect_messages_to_clients`](CentralNode::redirect_messages_to_clients)
/// once per tick.
pub struct CentralNode {
    server: Server,
    nodes: HashMap<String, Arc<dyn Node>>,
    redirections: HashMap<MessageType, Arc<dyn Node>>,
}

impl CentralNode {
    /// Create a hub with a default server
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a hub with custom server configuration
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            server: Server::with_config(config),
            nodes: HashMap::new(),
            redirections: HashMap::new(),
        }
    }

    /// Register a named node; fails on duplicate names
    pub fn add_node<S: Into<String>>(&mut self, name: S, node: Arc<dyn Node>) -> Result<()> {
        let name = name.into();
        if self.nodes.contains_key(&name) {
            return Err(MessagingError::DuplicateNode(name));
        }
        self.nodes.insert(name, node);
        Ok(())
    }

    /// Route messages of `message_type` to the named node; fails when the
    /// name is unknown
    pub fn setup_redirection(&mut self, message_type: MessageType, name: &str) -> Result<()> {
        let node = self
            .nodes
            .get(name)
            .ok_or_else(|| MessagingError::UnknownNode(name.to_string()))?;
        self.redirections.insert(message_type, Arc::clone(node));
        Ok(())
    }

    /// Start the owned server
    pub async fn start(&mut self, port: u16) -> Result<()> {
        self.server.start(port).await
    }

    /// Stop the owned server
    pub async fn stop(&mut self) {
        self.server.stop().await;
    }

    /// The owned server, for callbacks and inspection
    #[must_use]
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Drain the server's inbound queue, forwarding each message to the node
    /// registered for its type
    ///
    /// One FIFO pass over whatever is queued when the call starts. A message
    /// whose type has no redirection entry fails the call with
    /// [`MessagingError::UnknownMessageType`]; it is never silently dropped.
    pub async fn redirect_messages_to_nodes(&self) -> Result<()> {
        let inbound = self.server.messages();
        while let Some(message) = inbound.pop_front() {
            let message_type = message.header().message_type();
            let node = self
                .redirections
                .get(&message_type)
                .ok_or(MessagingError::UnknownMessageType(message_type))?;
            node.treat_message(message).await?;
        }
        Ok(())
    }

    /// Drain every node's outbound queue, relaying each reply to its
    /// recorded emitter or broadcasting when none is recorded
    pub async fn redirect_messages_to_clients(&self) -> Result<()> {
        for node in self.nodes.values() {
            let outbound = node.messages();
            while let Some(message) = outbound.pop_front() {
                let emitter = message.header().emitter_id();
                if emitter != NO_EMITTER {
                    self.server.send_to(emitter, &message).await?;
                } else {
                    self.server.send_to_all(&message).await?;
                }
            }
        }
        Ok(())
    }
}

impl Default for CentralNode {
    fn default() -> Self {
        Self::new()
    }
}
