//! TCP server: listening endpoint, peer table and multi-client receive
//!
//! The accept loop and one read task per connection run on the tokio
//! reactor, which performs the readiness multiplexing the original
//! `select()`-based loop did by hand. Every completed inbound message has
//! its emitter id stamped with the originating [`ClientId`] before it is
//! queued, overwriting whatever the peer sent.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::core::message::{ClientId, Message};
use crate::core::pool::MessagePool;
use crate::core::queue::MessageQueue;
use crate::error::{MessagingError, Result};

/// First id handed to an accepted connection
///
/// Starts above a reserved range so an id can never collide with the
/// [`NO_EMITTER`](crate::core::message::NO_EMITTER) broadcast sentinel. Ids
/// are taken from a monotonic counter and never reused for the lifetime of
/// the server.
pub const FIRST_CLIENT_ID: ClientId = 10_000;

/// Hook invoked with the new [`ClientId`] after a connection is accepted
pub type ConnectionCallback = Arc<dyn Fn(ClientId) + Send + Sync>;

/// Hook invoked with the [`ClientId`] exactly once when a peer disconnects
pub type DisconnectionCallback = Arc<dyn Fn(ClientId) + Send + Sync>;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind the listener on
    pub bind_host: String,
    /// Write timeout applied to each outbound message
    pub write_timeout: Duration,
    /// Keep-alive interval for accepted connections, disabled when `None`
    pub keep_alive: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            write_timeout: Duration::from_secs(10),
            keep_alive: Some(Duration::from_secs(60)),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind host
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_bind_host<S: Into<String>>(mut self, host: S) -> Self {
        self.bind_host = host.into();
        self
    }

    /// Set write timeout
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set keep-alive interval
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }
}

type PeerWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// State shared between the server handle, the accept loop and the
/// per-connection read tasks
struct ServerShared {
    clients: RwLock<HashMap<ClientId, PeerWriter>>,
    inbound: Arc<MessageQueue>,
    on_connection: RwLock<Option<ConnectionCallback>>,
    on_disconnection: RwLock<Option<DisconnectionCallback>>,
    running: AtomicBool,
}

impl ServerShared {
    /// Remove the peer from the table; the task that wins the removal fires
    /// the disconnection callback, so it runs exactly once even when a
    /// concurrent `stop()` races the read failure.
    fn drop_client(&self, id: ClientId) {
        if self.clients.write().remove(&id).is_some() {
            let callback = self.on_disconnection.read().clone();
            if let Some(callback) = callback {
                callback(id);
            }
        }
    }
}

/// TCP server accepting unbounded concurrent clients
pub struct Server {
    config: ServerConfig,
    shared: Arc<ServerShared>,
    pool: MessagePool,
    next_client_id: Arc<AtomicU64>,
    accept_task: Option<JoinHandle<()>>,
    connection_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    local_addr: Option<std::net::SocketAddr>,
}

impl Server {
    /// Create a stopped server with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a stopped server with custom configuration
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(ServerShared {
                clients: RwLock::new(HashMap::new()),
                inbound: Arc::new(MessageQueue::new()),
                on_connection: RwLock::new(None),
                on_disconnection: RwLock::new(None),
                running: AtomicBool::new(false),
            }),
            pool: MessagePool::for_messages(),
            next_client_id: Arc::new(AtomicU64::new(FIRST_CLIENT_ID)),
            accept_task: None,
            connection_tasks: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx: None,
            local_addr: None,
        }
    }

    /// Register the connection hook; set before [`start`](Server::start)
    pub fn on_connection<F>(&self, callback: F)
    where
        F: Fn(ClientId) + Send + Sync + 'static,
    {
        *self.shared.on_connection.write() = Some(Arc::new(callback));
    }

    /// Register the disconnection hook; set before [`start`](Server::start)
    pub fn on_disconnection<F>(&self, callback: F)
    where
        F: Fn(ClientId) + Send + Sync + 'static,
    {
        *self.shared.on_disconnection.write() = Some(Arc::new(callback));
    }

    /// Bind, listen and start the accept loop on a background task
    ///
    /// Bind or listen failures are setup errors, reported synchronously.
    pub async fn start(&mut self, port: u16) -> Result<()> {
        if self.shared.running.load(Ordering::Acquire) {
            return Err(MessagingError::setup("Server is already running"));
        }

        let listener = TcpListener::bind((self.config.bind_host.as_str(), port))
            .await
            .map_err(|e| {
                MessagingError::setup(format!(
                    "Failed to bind {}:{}: {}",
                    self.config.bind_host, port, e
                ))
            })?;

        self.local_addr = listener.local_addr().ok();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let pool = self.pool.clone();
        let next_client_id = Arc::clone(&self.next_client_id);
        let connection_tasks = Arc::clone(&self.connection_tasks);
        let keep_alive = self.config.keep_alive;

        self.accept_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                let stream = match keep_alive {
                                    Some(interval) => {
                                        match crate::core::configure_keepalive(stream, interval) {
                                            Ok(stream) => stream,
                                            Err(e) => {
                                                tracing::warn!(
                                                    "Dropping connection from {}: keep-alive setup failed: {}",
                                                    peer_addr, e
                                                );
                                                continue;
                                            }
                                        }
                                    }
                                    None => stream,
                                };

                                let id = next_client_id.fetch_add(1, Ordering::Relaxed);
                                let (reader, writer) = stream.into_split();
                                shared
                                    .clients
                                    .write()
                                    .insert(id, Arc::new(tokio::sync::Mutex::new(writer)));
                                tracing::debug!("Client {} connected from {}", id, peer_addr);

                                let callback = shared.on_connection.read().clone();
                                if let Some(callback) = callback {
                                    callback(id);
                                }

                                let task = tokio::spawn(connection_loop(
                                    id,
                                    reader,
                                    pool.clone(),
                                    Arc::clone(&shared),
                                ));

                                let mut tasks = connection_tasks.lock();
                                tasks.push(task);
                                tasks.retain(|t| !t.is_finished());
                            }
                            Err(e) => {
                                tracing::error!("Failed to accept connection: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Server received shutdown signal");
                        break;
                    }
                }
            }

            shared.running.store(false, Ordering::Release);
        }));

        Ok(())
    }

    /// Stop the server: end the accept loop, cancel connection tasks and
    /// close every peer socket
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(task) = self.accept_task.take() {
            let _ = task.await;
        }

        let tasks = std::mem::take(&mut *self.connection_tasks.lock());
        for task in tasks {
            task.abort();
        }

        // Dropping the write halves closes the sockets
        self.shared.clients.write().clear();
        self.shared.running.store(false, Ordering::Release);
    }

    /// Send a message to one client
    ///
    /// An unknown id is a logged no-op, never an error: the caller may race
    /// a concurrent disconnect. Write failures are logged no-ops too; the
    /// read side observes the broken connection and fires the disconnection
    /// callback.
    pub async fn send_to(&self, id: ClientId, message: &Message) -> Result<()> {
        let writer = self.shared.clients.read().get(&id).cloned();
        let Some(writer) = writer else {
            tracing::warn!("send_to: client {} is not connected, dropping message", id);
            return Ok(());
        };

        let data = message.encode()?;
        self.write_to_peer(id, &writer, &data).await;
        Ok(())
    }

    /// Send a message to several clients
    pub async fn send_to_many(&self, ids: &[ClientId], message: &Message) -> Result<()> {
        let data = message.encode()?;
        for &id in ids {
            let writer = self.shared.clients.read().get(&id).cloned();
            match writer {
                Some(writer) => self.write_to_peer(id, &writer, &data).await,
                None => {
                    tracing::warn!("send_to_many: client {} is not connected, skipping", id);
                }
            }
        }
        Ok(())
    }

    /// Send a message to every connected client
    pub async fn send_to_all(&self, message: &Message) -> Result<()> {
        let data = message.encode()?;

        // Snapshot under the lock so no lock is held across the writes
        let peers: Vec<(ClientId, PeerWriter)> = self
            .shared
            .clients
            .read()
            .iter()
            .map(|(id, writer)| (*id, Arc::clone(writer)))
            .collect();

        for (id, writer) in peers {
            self.write_to_peer(id, &writer, &data).await;
        }
        Ok(())
    }

    async fn write_to_peer(&self, id: ClientId, writer: &PeerWriter, data: &[u8]) {
        let mut writer = writer.lock().await;
        let result = timeout(self.config.write_timeout, writer.write_all(data)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to write to client {}: {}", id, e),
            Err(_) => tracing::warn!("Write to client {} timed out", id),
        }
    }

    /// Shared inbound queue of received messages, emitter ids stamped
    #[must_use]
    pub fn messages(&self) -> Arc<MessageQueue> {
        Arc::clone(&self.shared.inbound)
    }

    /// Pool backing inbound messages; `resize` it to pre-allocate
    #[must_use]
    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }

    /// Number of connected clients
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.shared.clients.read().len()
    }

    /// Ids of the currently connected clients
    #[must_use]
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.shared.clients.read().keys().copied().collect()
    }

    /// Address the listener is bound to, once started
    ///
    /// Useful when starting on port `0` and letting the OS pick.
    #[must_use]
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.local_addr
    }

    /// Check if the server is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        // Best-effort cleanup when dropped without explicit stop()
        if self.shared.running.load(Ordering::Acquire) {
            tracing::warn!("Server dropped while still running - performing emergency cleanup");

            if let Some(tx) = self.shutdown_tx.take() {
                let _ = tx.try_send(());
            }
            if let Some(task) = self.accept_task.take() {
                task.abort();
            }
            for task in std::mem::take(&mut *self.connection_tasks.lock()) {
                task.abort();
            }
            self.shared.clients.write().clear();
            self.shared.running.store(false, Ordering::Release);
        }
    }
}

/// Per-connection read task: frames messages, stamps the emitter id and
/// queues them until the first read failure, which counts as a disconnect.
async fn connection_loop(
    id: ClientId,
    mut reader: OwnedReadHalf,
    pool: MessagePool,
    shared: Arc<ServerShared>,
) {
    loop {
        match crate::core::read_message(&mut reader, &pool).await {
            Ok(mut message) => {
                message.set_emitter_id(id);
                shared.inbound.push_back(message);
            }
            Err(e) => {
                tracing::debug!("Client {} read ended: {}", id, e);
                break;
            }
        }
    }

    shared.drop_client(id);
}
