//! TCP client for a Fruitfall server.
//!
//! [`GameClient::connect`] performs the `hello` handshake and returns once the
//! server has answered `welcome`. A background task decodes server frames into
//! a bounded queue read with [`GameClient::recv`]. Connection state changes are
//! broadcast through a [`watch`] channel so any number of consumers can react
//! without polling.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, watch};

use crate::framing::{FrameConfig, FrameError, read_message, write_message};
use crate::messages::{ClientMessage, PlayerId, ServerMessage};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    /// Handshake done, ready for communication.
    Connected,
    /// Connection lost or intentionally closed.
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    pub fn set(&self, state: ConnectionState) {
        let _ = self.tx.send(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Errors surfaced by [`GameClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The server refused the credential.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// The server answered the handshake with something other than `welcome`.
    #[error("unexpected handshake reply: {0}")]
    UnexpectedReply(&'static str),
}

/// Inbound messages buffered per client.
const INBOUND_QUEUE: usize = 256;

/// Handle to an authenticated server connection.
pub struct GameClient {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    inbound: mpsc::Receiver<ServerMessage>,
    state: Arc<ConnectionStateWatch>,
    identity: PlayerId,
    display_name: String,
    frame: FrameConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl GameClient {
    /// Connect to `addr` and authenticate with `token`.
    pub async fn connect(addr: SocketAddr, token: &str) -> Result<Self, ClientError> {
        Self::connect_with(addr, token, FrameConfig::default()).await
    }

    /// Connect with explicit framing limits.
    pub async fn connect_with(
        addr: SocketAddr,
        token: &str,
        frame: FrameConfig,
    ) -> Result<Self, ClientError> {
        let state = Arc::new(ConnectionStateWatch::new());
        state.set(ConnectionState::Connecting);

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        let hello = ClientMessage::Hello {
            token: token.to_string(),
        };
        write_message(&mut writer, &hello, &frame).await?;
        let (identity, display_name) = match read_message(&mut reader, &frame).await? {
            ServerMessage::Welcome { identity, name } => (identity, name),
            ServerMessage::Rejected { reason } => {
                state.set(ConnectionState::Disconnected);
                return Err(ClientError::Rejected(reason));
            }
            other => {
                state.set(ConnectionState::Disconnected);
                return Err(ClientError::UnexpectedReply(other.kind()));
            }
        };
        state.set(ConnectionState::Connected);
        tracing::info!("Connected to {addr} as {identity}");

        let (inbound_tx, inbound) = mpsc::channel(INBOUND_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader_state = Arc::clone(&state);
        let reader_frame = frame.clone();
        tokio::spawn(async move {
            Self::read_loop(reader, inbound_tx, &reader_state, &reader_frame, shutdown_rx).await;
        });

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
            inbound,
            state,
            identity,
            display_name,
            frame,
            shutdown_tx,
        })
    }

    /// Identity assigned by the server during the handshake.
    pub fn identity(&self) -> &PlayerId {
        &self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    /// Send one message.
    pub async fn send(&self, msg: &ClientMessage) -> Result<(), ClientError> {
        let mut writer = self.writer.lock().await;
        if let Err(e) = write_message(&mut *writer, msg, &self.frame).await {
            self.state.set(ConnectionState::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    /// Wait for the next server message. Returns `None` once the connection
    /// has closed and the queue is drained.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.inbound.recv().await
    }

    /// Return a queued server message without waiting.
    pub fn try_recv(&mut self) -> Option<ServerMessage> {
        self.inbound.try_recv().ok()
    }

    /// Close the connection. The server observes EOF.
    pub async fn disconnect(&self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.writer.lock().await.shutdown().await;
        self.state.set(ConnectionState::Disconnected);
    }

    async fn read_loop(
        mut reader: OwnedReadHalf,
        inbound: mpsc::Sender<ServerMessage>,
        state: &ConnectionStateWatch,
        frame: &FrameConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                result = read_message::<ServerMessage, _>(&mut reader, frame) => match result {
                    Ok(msg) => {
                        if inbound.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(FrameError::Message(e)) => {
                        tracing::warn!("Ignoring malformed server message: {e}");
                    }
                    Err(e) => {
                        tracing::info!("Server connection lost: {e}");
                        break;
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        state.set(ConnectionState::Disconnected);
    }
}
