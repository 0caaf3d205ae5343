//! TCP client: one outbound connection plus a background receive loop

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::core::message::Message;
use crate::core::pool::MessagePool;
use crate::core::queue::MessageQueue;
use crate::error::{MessagingError, Result};

/// Hook invoked once the connection is established
pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Hook invoked once when the connection ends, whatever the cause
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Write timeout applied to each send
    pub write_timeout: Duration,
    /// Keep-alive interval, disabled when `None`
    pub keep_alive: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            keep_alive: Some(Duration::from_secs(60)),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connection timeout
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
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

/// Client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
}

/// State shared between the client handle and its receive-loop task
struct ClientShared {
    state: RwLock<ClientState>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    inbound: Arc<MessageQueue>,
    on_disconnect: RwLock<Option<DisconnectCallback>>,
}

impl ClientShared {
    /// Flip to Disconnected; returns true only for the caller that performed
    /// the transition, so the disconnect callback fires exactly once.
    fn mark_disconnected(&self) -> bool {
        let mut state = self.state.write();
        if *state == ClientState::Disconnected {
            false
        } else {
            *state = ClientState::Disconnected;
            true
        }
    }

    fn fire_disconnect(&self) {
        let callback = self.on_disconnect.read().clone();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// TCP client
///
/// `connect` establishes the connection and starts a background task that
/// frames inbound messages into the queue exposed by
/// [`messages`](Client::messages). Any read failure is treated as a
/// disconnect; no automatic reconnection is attempted.
pub struct Client {
    config: ClientConfig,
    shared: Arc<ClientShared>,
    pool: MessagePool,
    on_connect: Option<ConnectCallback>,
    receive_task: Option<JoinHandle<()>>,
}

impl Client {
    /// Create a disconnected client with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a disconnected client with custom configuration
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            shared: Arc::new(ClientShared {
                state: RwLock::new(ClientState::Disconnected),
                writer: Mutex::new(None),
                inbound: Arc::new(MessageQueue::new()),
                on_disconnect: RwLock::new(None),
            }),
            pool: MessagePool::for_messages(),
            on_connect: None,
            receive_task: None,
        }
    }

    /// Register the connect hook; set before [`connect`](Client::connect)
    pub fn on_connect<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(callback));
    }

    /// Register the disconnect hook; set before [`connect`](Client::connect)
    pub fn on_disconnect<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.on_disconnect.write() = Some(Arc::new(callback));
    }

    /// Connect to a server
    ///
    /// On success the client transitions to `Connected`, invokes the connect
    /// hook and starts the receive loop. On failure the client stays
    /// `Disconnected`.
    pub async fn connect(&mut self, address: &str, port: u16) -> Result<()> {
        {
            let state = self.shared.state.read();
            if *state != ClientState::Disconnected {
                return Err(MessagingError::setup(
                    "Client is already connected or connecting",
                ));
            }
        }
        *self.shared.state.write() = ClientState::Connecting;

        let stream = match self.establish(address, port).await {
            Ok(stream) => stream,
            Err(e) => {
                *self.shared.state.write() = ClientState::Disconnected;
                return Err(e);
            }
        };

        let (reader, writer) = stream.into_split();
        *self.shared.writer.lock().await = Some(writer);
        *self.shared.state.write() = ClientState::Connected;

        if let Some(callback) = &self.on_connect {
            callback();
        }

        let shared = Arc::clone(&self.shared);
        let pool = self.pool.clone();
        self.receive_task = Some(tokio::spawn(receive_loop(reader, pool, shared)));

        Ok(())
    }

    async fn establish(&self, address: &str, port: u16) -> Result<TcpStream> {
        let stream = timeout(
            self.config.connect_timeout,
            TcpStream::connect((address, port)),
        )
        .await
        .map_err(|_| MessagingError::timeout("Connection timed out"))?
        .map_err(|e| {
            MessagingError::connection(format!("Failed to connect to {}:{}: {}", address, port, e))
        })?;

        match self.config.keep_alive {
            Some(interval) => crate::core::configure_keepalive(stream, interval),
            None => Ok(stream),
        }
    }

    /// Send a message: header then payload, as one encoded write
    ///
    /// Fails with [`MessagingError::NotConnected`] unless the client is
    /// connected.
    pub async fn send(&self, message: &Message) -> Result<()> {
        if !self.is_connected() {
            return Err(MessagingError::NotConnected);
        }

        let data = message.encode()?;

        let mut writer_guard = self.shared.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(MessagingError::NotConnected)?;

        timeout(self.config.write_timeout, writer.write_all(&data))
            .await
            .map_err(|_| MessagingError::timeout("Write timed out"))?
            .map_err(|e| MessagingError::connection(format!("Failed to write: {}", e)))?;

        Ok(())
    }

    /// Disconnect; idempotent
    ///
    /// Stops the receive loop, shuts the transport down and fires the
    /// disconnect hook if the client was connected.
    pub async fn disconnect(&mut self) {
        let transitioned = self.shared.mark_disconnected();

        if let Some(task) = self.receive_task.take() {
            task.abort();
            let _ = task.await;
        }

        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        if transitioned {
            self.shared.fire_disconnect();
        }
    }

    /// Inbound message queue fed by the receive loop
    #[must_use]
    pub fn messages(&self) -> Arc<MessageQueue> {
        Arc::clone(&self.shared.inbound)
    }

    /// Check if the client is connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.shared.state.read() == ClientState::Connected
    }

    /// Get the current state
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.shared.state.read()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Background receive loop: frames complete messages into the inbound queue
/// until the first read failure, then performs the disconnect transition.
async fn receive_loop(mut reader: OwnedReadHalf, pool: MessagePool, shared: Arc<ClientShared>) {
    loop {
        match crate::core::read_message(&mut reader, &pool).await {
            Ok(message) => shared.inbound.push_back(message),
            Err(e) => {
                tracing::debug!("Client receive loop ended: {}", e);
                break;
            }
        }
    }

    if shared.mark_disconnected() {
        if let Some(mut writer) = shared.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        shared.fire_disconnect();
    }
}
