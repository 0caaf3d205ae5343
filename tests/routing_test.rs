//! Integration tests for the CentralNode routing hub

use message_hub::{
    CentralNode, Client, LocalNode, Message, MessageQueue, MessagingError, Node, PooledMessage,
    RemoteNode, Server, ServerConfig, NO_EMITTER,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

async fn start_hub(hub: &mut CentralNode) -> u16 {
    hub.start(0).await.expect("Failed to start hub");
    hub.server()
        .local_addr()
        .expect("Hub server has no local addr")
        .port()
}

async fn recv(queue: &MessageQueue) -> PooledMessage {
    timeout(Duration::from_secs(2), async {
        loop {
            queue.wait().await;
            if let Some(message) = queue.pop_front() {
                return message;
            }
        }
    })
    .await
    .expect("Timed out waiting for a message")
}

/// Drive the inbound drain until `cond` holds; inbound messages arrive
/// asynchronously, so a single drain pass is not enough.
async fn pump_inbound<F: Fn() -> bool>(hub: &CentralNode, cond: F, what: &str) {
    for _ in 0..200 {
        hub.redirect_messages_to_nodes().await.unwrap();
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {}", what);
}

#[tokio::test]
async fn test_ping_pong_through_local_node() {
    let echo = Arc::new(LocalNode::new());

    let mut hub = CentralNode::with_config(ServerConfig::new().with_bind_host("127.0.0.1"));
    hub.add_node("echo", Arc::clone(&echo) as Arc<dyn Node>)
        .unwrap();
    hub.setup_redirection(1, "echo").unwrap();
    let port = start_hub(&mut hub).await;

    let mut client = Client::new();
    client.connect("127.0.0.1", port).await.unwrap();

    let mut ping = Message::with_type(1);
    ping.write_str("ping");
    client.send(&ping).await.unwrap();

    pump_inbound(&hub, || !echo.received().is_empty(), "echo node delivery").await;

    // In-process consumer: answer the question with type 2 / "pong"
    let mut question = echo.received().pop_front().unwrap();
    assert_eq!(question.read_str().unwrap(), "ping");
    let mut answer = echo.obtain_reply(&question, 2);
    answer.write_str("pong");
    echo.insert_message_answer(answer);

    hub.redirect_messages_to_clients().await.unwrap();

    let mut reply = recv(&client.messages()).await;
    assert_eq!(reply.header().message_type(), 2);
    assert_eq!(reply.read_str().unwrap(), "pong");

    client.disconnect().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_reply_without_emitter_is_broadcast() {
    let announcer = Arc::new(LocalNode::new());

    let mut hub = CentralNode::with_config(ServerConfig::new().with_bind_host("127.0.0.1"));
    hub.add_node("announcer", Arc::clone(&announcer) as Arc<dyn Node>)
        .unwrap();
    let port = start_hub(&mut hub).await;

    let mut client_a = Client::new();
    let mut client_b = Client::new();
    client_a.connect("127.0.0.1", port).await.unwrap();
    client_b.connect("127.0.0.1", port).await.unwrap();
    for _ in 0..200 {
        if hub.server().client_count() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(hub.server().client_count(), 2);

    let mut bulletin = announcer.obtain_owner_message(NO_EMITTER, 9);
    bulletin.write_str("for all");
    announcer.insert_message_answer(bulletin);

    hub.redirect_messages_to_clients().await.unwrap();

    for client in [&client_a, &client_b] {
        let mut received = recv(&client.messages()).await;
        assert_eq!(received.header().message_type(), 9);
        assert_eq!(received.read_str().unwrap(), "for all");
    }

    client_a.disconnect().await;
    client_b.disconnect().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_unregistered_type_fails_the_drain() {
    let mut hub = CentralNode::with_config(ServerConfig::new().with_bind_host("127.0.0.1"));
    let port = start_hub(&mut hub).await;

    let mut client = Client::new();
    client.connect("127.0.0.1", port).await.unwrap();

    let stray = Message::with_type(42);
    client.send(&stray).await.unwrap();

    let mut failed = false;
    for _ in 0..200 {
        match hub.redirect_messages_to_nodes().await {
            Err(MessagingError::UnknownMessageType(42)) => {
                failed = true;
                break;
            }
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(()) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    assert!(failed, "stray message type was silently accepted");

    client.disconnect().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_remote_node_forwards_downstream() {
    // Downstream server the remote node forwards into
    let mut downstream = Server::with_config(ServerConfig::new().with_bind_host("127.0.0.1"));
    downstream.start(0).await.unwrap();
    let downstream_port = downstream.local_addr().unwrap().port();

    let mut relay = RemoteNode::new();
    relay.connect("127.0.0.1", downstream_port).await.unwrap();
    let relay = Arc::new(relay);

    let mut hub = CentralNode::with_config(ServerConfig::new().with_bind_host("127.0.0.1"));
    hub.add_node("relay", Arc::clone(&relay) as Arc<dyn Node>)
        .unwrap();
    hub.setup_redirection(5, "relay").unwrap();
    let port = start_hub(&mut hub).await;

    let mut client = Client::new();
    client.connect("127.0.0.1", port).await.unwrap();

    let mut msg = Message::with_type(5);
    msg.write_str("forward me");
    client.send(&msg).await.unwrap();

    pump_inbound(&hub, || !downstream.messages().is_empty(), "downstream delivery").await;

    let mut forwarded = recv(&downstream.messages()).await;
    assert_eq!(forwarded.header().message_type(), 5);
    assert_eq!(forwarded.read_str().unwrap(), "forward me");

    client.disconnect().await;
    hub.stop().await;
    downstream.stop().await;
}

#[tokio::test]
async fn test_two_questions_two_answers_to_right_clients() {
    let echo = Arc::new(LocalNode::new());

    let mut hub = CentralNode::with_config(ServerConfig::new().with_bind_host("127.0.0.1"));
    hub.add_node("echo", Arc::clone(&echo) as Arc<dyn Node>)
        .unwrap();
    hub.setup_redirection(1, "echo").unwrap();
    let port = start_hub(&mut hub).await;

    let mut client_a = Client::new();
    let mut client_b = Client::new();
    client_a.connect("127.0.0.1", port).await.unwrap();
    client_b.connect("127.0.0.1", port).await.unwrap();

    let mut from_a = Message::with_type(1);
    from_a.write_str("a");
    client_a.send(&from_a).await.unwrap();

    let mut from_b = Message::with_type(1);
    from_b.write_str("b");
    client_b.send(&from_b).await.unwrap();

    pump_inbound(&hub, || echo.received().len() == 2, "both questions").await;

    // Answer each question with its own tag; emitter routing must keep
    // the replies apart
    while let Some(mut question) = echo.received().pop_front() {
        let tag = question.read_str().unwrap();
        let mut answer = echo.obtain_reply(&question, 2);
        answer.write_str(&format!("reply-{}", tag));
        echo.insert_message_answer(answer);
    }

    hub.redirect_messages_to_clients().await.unwrap();

    let mut reply_a = recv(&client_a.messages()).await;
    assert_eq!(reply_a.read_str().unwrap(), "reply-a");

    let mut reply_b = recv(&client_b.messages()).await;
    assert_eq!(reply_b.read_str().unwrap(), "reply-b");

    client_a.disconnect().await;
    client_b.disconnect().await;
    hub.stop().await;
}
