//! In-process message endpoint

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::message::{ClientId, Message, MessageType};
use crate::core::pool::{MessagePool, PooledMessage};
use crate::core::queue::MessageQueue;
use crate::error::Result;
use crate::node::Node;

/// Node whose messages are consumed by in-process code
///
/// `treat_message` buffers inbound messages in the `received` queue; a
/// consumer drains it (using [`wait`](MessageQueue::wait) or polling), builds
/// replies through [`obtain_reply`](LocalNode::obtain_reply) or
/// [`obtain_owner_message`](LocalNode::obtain_owner_message), and hands them
/// back with [`insert_message_answer`](LocalNode::insert_message_answer).
/// The hub then relays them from the `to_return` queue to the clients.
pub struct LocalNode {
    pool: MessagePool,
    received: Arc<MessageQueue>,
    to_return: Arc<MessageQueue>,
}

impl LocalNode {
    /// Create a node with empty queues and its own message pool
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: MessagePool::for_messages(),
            received: Arc::new(MessageQueue::new()),
            to_return: Arc::new(MessageQueue::new()),
        }
    }

    /// Queue of inbound messages awaiting an in-process consumer
    #[must_use]
    pub fn received(&self) -> Arc<MessageQueue> {
        Arc::clone(&self.received)
    }

    /// Build a reply pre-stamped for a specific peer
    #[must_use]
    pub fn obtain_owner_message(
        &self,
        emitter_id: ClientId,
        message_type: MessageType,
    ) -> PooledMessage {
        let mut message = self.pool.obtain();
        message.set_emitter_id(emitter_id);
        message.set_type(message_type);
        message
    }

    /// Build a reply addressed to whoever emitted `question`
    #[must_use]
    pub fn obtain_reply(&self, question: &Message, message_type: MessageType) -> PooledMessage {
        self.obtain_owner_message(question.header().emitter_id(), message_type)
    }

    /// Queue a completed reply for relay back to the clients
    pub fn insert_message_answer(&self, answer: PooledMessage) {
        self.to_return.push_back(answer);
    }
}

impl Default for LocalNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for LocalNode {
    async fn treat_message(&self, message: PooledMessage) -> Result<()> {
        self.received.push_back(message);
        Ok(())
    }

    fn messages(&self) -> Arc<MessageQueue> {
        Arc::clone(&self.to_return)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_treat_message_buffers_in_received() {
        let node = LocalNode::new();
        let pool = MessagePool::for_messages();

        let mut msg = pool.obtain();
        msg.set_type(3);
        node.treat_message(msg).await.unwrap();

        let buffered = node.received().pop_front().unwrap();
        assert_eq!(buffered.header().message_type(), 3);
        assert!(node.messages().is_empty());
    }

    #[test]
    fn test_obtain_reply_copies_emitter() {
        let node = LocalNode::new();

        let mut question = Message::with_type(1);
        question.set_emitter_id(10_004);

        let reply = node.obtain_reply(&question, 2);
        assert_eq!(reply.header().emitter_id(), 10_004);
        assert_eq!(reply.header().message_type(), 2);
        assert!(reply.is_empty());
    }

    #[test]
    fn test_answer_flows_to_outbound_queue() {
        let node = LocalNode::new();

        let mut answer = node.obtain_owner_message(10_001, 9);
        answer.write_str("done");
        node.insert_message_answer(answer);

        let queued = node.messages().pop_front().unwrap();
        assert_eq!(queued.header().emitter_id(), 10_001);
        assert_eq!(queued.header().message_type(), 9);
    }
}
