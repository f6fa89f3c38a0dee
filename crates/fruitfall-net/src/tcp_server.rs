//! TCP server: accepts connections, runs the credential handshake, and
//! drives one reader and one writer task per connection.
//!
//! Decoded frames are handed to a [`ConnectionHandler`]; everything the
//! handler wants to say goes back through the connection's
//! [`ConnectionSession`] queue.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc, oneshot, watch};

use crate::auth::{AuthError, Credentials, CredentialVerifier};
use crate::framing::{FrameConfig, FrameError, read_frame, read_message, write_message};
use crate::messages::{ClientMessage, ServerMessage};
use crate::session::{ConnectionId, ConnectionSession, IdGenerator};

/// Receives lifecycle events and raw frames for authenticated connections.
///
/// Called from the connection's reader task. Implementations must not block
/// for long; replies go through [`ConnectionSession::send`].
pub trait ConnectionHandler: Send + Sync + 'static {
    /// The handshake succeeded and `welcome` has been queued.
    fn on_open(&self, session: &ConnectionSession);
    /// One frame payload arrived.
    fn on_frame(&self, session: &ConnectionSession, payload: &[u8]);
    /// The connection is gone. Called exactly once per `on_open`.
    fn on_close(&self, session: &ConnectionSession);
}

/// Error returned when the connection map is at capacity.
#[derive(Debug)]
pub struct ConnectionLimitReached;

/// Authenticated connections keyed by [`ConnectionId`].
pub struct ConnectionMap {
    inner: RwLock<HashMap<ConnectionId, ConnectionSession>>,
    max_connections: usize,
}

impl ConnectionMap {
    pub fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Insert a connection. Returns `Err` if the map is at capacity.
    pub async fn insert(
        &self,
        id: ConnectionId,
        session: ConnectionSession,
    ) -> Result<(), ConnectionLimitReached> {
        let mut map = self.inner.write().await;
        if map.len() >= self.max_connections {
            return Err(ConnectionLimitReached);
        }
        map.insert(id, session);
        Ok(())
    }

    pub async fn remove(&self, id: &ConnectionId) -> Option<ConnectionSession> {
        self.inner.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    pub async fn is_full(&self) -> bool {
        self.len().await >= self.max_connections
    }
}

/// Configuration for [`GameServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Default: `0.0.0.0:7878`.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent authenticated connections. Default: 256.
    pub max_connections: usize,
    /// How long a new connection has to send `hello`. Default: 5 s.
    pub handshake_timeout: Duration,
    /// Outbound queue length per connection. Default: 256.
    pub outbound_queue: usize,
    pub frame: FrameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7878)),
            max_connections: 256,
            handshake_timeout: Duration::from_secs(5),
            outbound_queue: 256,
            frame: FrameConfig::default(),
        }
    }
}

/// Everything a connection task needs, cloned out of the server.
#[derive(Clone)]
struct ConnectionContext {
    config: Arc<ServerConfig>,
    connections: Arc<ConnectionMap>,
    verifier: Arc<dyn CredentialVerifier>,
    handler: Arc<dyn ConnectionHandler>,
}

/// TCP game server.
pub struct GameServer {
    ctx: ConnectionContext,
    /// Authenticated connections (public for test inspection).
    pub connections: Arc<ConnectionMap>,
    id_gen: Arc<IdGenerator>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GameServer {
    pub fn new(
        config: ServerConfig,
        verifier: Arc<dyn CredentialVerifier>,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connections = Arc::new(ConnectionMap::new(config.max_connections));
        Self {
            ctx: ConnectionContext {
                config: Arc::new(config),
                connections: Arc::clone(&connections),
                verifier,
                handler,
            },
            connections,
            id_gen: Arc::new(IdGenerator::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.ctx.config.bind_addr).await?;
        tracing::info!("Server listening on {}", self.ctx.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    pub async fn run_with_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Accept failed: {e}");
                            continue;
                        }
                    };

                    if self.connections.is_full().await {
                        tracing::warn!("Connection limit reached, rejecting {peer_addr}");
                        continue;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::warn!("Failed to set TCP_NODELAY for {peer_addr}: {e}");
                    }

                    let id = self.id_gen.next_id();
                    let ctx = self.ctx.clone();
                    let task_shutdown = self.shutdown_rx.clone();
                    tracing::debug!("Accepted {id:?} from {peer_addr}");

                    tokio::spawn(async move {
                        Self::serve_connection(ctx, id, stream, peer_addr, task_shutdown).await;
                    });
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Signal the server and every connection task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn serve_connection(
        ctx: ConnectionContext,
        id: ConnectionId,
        stream: TcpStream,
        peer_addr: SocketAddr,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let (mut reader, mut writer) = stream.into_split();
        let frame = &ctx.config.frame;

        let credentials = match Self::handshake(&mut reader, &ctx).await {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!("Refusing {peer_addr}: {e}");
                Self::reject(&mut writer, &e.to_string(), frame).await;
                return;
            }
        };

        let (session, outbound) = ConnectionSession::new(
            id,
            credentials.identity,
            credentials.display_name,
            ctx.config.outbound_queue,
        );
        if ctx.connections.insert(id, session.clone()).await.is_err() {
            tracing::warn!("Connection limit reached, rejecting {peer_addr}");
            Self::reject(&mut writer, "server full", frame).await;
            return;
        }
        tracing::info!(
            "{} connected from {peer_addr} as {id:?}",
            session.identity()
        );

        let (closed_tx, closed_rx) = oneshot::channel::<()>();
        let (broken_tx, mut broken_rx) = oneshot::channel::<()>();
        let writer_task = tokio::spawn(Self::write_loop(
            writer,
            outbound,
            closed_rx,
            broken_tx,
            frame.clone(),
        ));

        session.send(ServerMessage::Welcome {
            identity: session.identity().clone(),
            name: session.display_name().to_string(),
        });
        ctx.handler.on_open(&session);

        Self::read_loop(
            &mut reader,
            &session,
            &*ctx.handler,
            frame,
            &mut shutdown_rx,
            &mut broken_rx,
        )
        .await;

        ctx.handler.on_close(&session);
        ctx.connections.remove(&id).await;
        drop(closed_tx);
        let _ = writer_task.await;
        tracing::info!("{} disconnected ({id:?})", session.identity());
    }

    async fn handshake(
        reader: &mut OwnedReadHalf,
        ctx: &ConnectionContext,
    ) -> Result<Credentials, AuthError> {
        let first = tokio::time::timeout(
            ctx.config.handshake_timeout,
            read_message::<ClientMessage, _>(reader, &ctx.config.frame),
        )
        .await
        .map_err(|_| AuthError::Timeout)??;

        match first {
            ClientMessage::Hello { token } => ctx.verifier.verify(&token),
            other => Err(AuthError::UnexpectedMessage(other.kind())),
        }
    }

    async fn reject(writer: &mut OwnedWriteHalf, reason: &str, frame: &FrameConfig) {
        let msg = ServerMessage::Rejected {
            reason: reason.to_string(),
        };
        let _ = write_message(writer, &msg, frame).await;
        let _ = writer.shutdown().await;
    }

    async fn read_loop(
        reader: &mut OwnedReadHalf,
        session: &ConnectionSession,
        handler: &dyn ConnectionHandler,
        frame: &FrameConfig,
        shutdown_rx: &mut watch::Receiver<bool>,
        writer_gone: &mut oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                result = read_frame(reader, frame) => match result {
                    Ok(payload) => handler.on_frame(session, &payload),
                    Err(FrameError::ConnectionClosed) => break,
                    Err(e) => {
                        tracing::warn!("Read error on {:?}: {e}", session.id());
                        break;
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = &mut *writer_gone => {
                    tracing::info!("Writer for {:?} failed, closing connection", session.id());
                    break;
                }
            }
        }
    }

    /// Drain the outbound queue onto the socket until the reader side closes,
    /// then flush whatever is still queued.
    ///
    /// A message that cannot be encoded or exceeds the frame limit is dropped
    /// and the loop carries on; nothing reaches the socket for it. Any other
    /// write error ends the loop and fires `broken` so the reader stops too.
    async fn write_loop<W: AsyncWriteExt + Unpin>(
        mut writer: W,
        mut outbound: mpsc::Receiver<ServerMessage>,
        mut closed: oneshot::Receiver<()>,
        broken: oneshot::Sender<()>,
        frame: FrameConfig,
    ) {
        loop {
            tokio::select! {
                msg = outbound.recv() => match msg {
                    Some(msg) => {
                        if let Err(e) = Self::write_or_skip(&mut writer, &msg, &frame).await {
                            tracing::debug!("Write failed, stopping writer: {e}");
                            let _ = broken.send(());
                            return;
                        }
                    }
                    None => break,
                },
                _ = &mut closed => break,
            }
        }

        outbound.close();
        while let Ok(msg) = outbound.try_recv() {
            if Self::write_or_skip(&mut writer, &msg, &frame).await.is_err() {
                return;
            }
        }
        let _ = writer.shutdown().await;
    }

    async fn write_or_skip<W: AsyncWriteExt + Unpin>(
        writer: &mut W,
        msg: &ServerMessage,
        frame: &FrameConfig,
    ) -> Result<(), FrameError> {
        match write_message(writer, msg, frame).await {
            Err(e @ (FrameError::PayloadTooLarge { .. } | FrameError::Message(_))) => {
                tracing::warn!("Dropping outbound {}: {e}", msg.kind());
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenVerifier;
    use crate::framing::write_frame;
    use crate::messages::ErrorCode;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;

    /// Records lifecycle events and echoes every frame back as an error envelope.
    #[derive(Default)]
    struct EchoHandler {
        events: Mutex<Vec<String>>,
    }

    impl EchoHandler {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ConnectionHandler for EchoHandler {
        fn on_open(&self, session: &ConnectionSession) {
            self.events
                .lock()
                .unwrap()
                .push(format!("open {}", session.identity()));
        }

        fn on_frame(&self, session: &ConnectionSession, payload: &[u8]) {
            let text = String::from_utf8_lossy(payload).to_string();
            session.send(ServerMessage::error(ErrorCode::InvalidMessage, text));
        }

        fn on_close(&self, session: &ConnectionSession) {
            self.events
                .lock()
                .unwrap()
                .push(format!("close {}", session.identity()));
        }
    }

    fn verifier() -> Arc<StaticTokenVerifier> {
        let mut v = StaticTokenVerifier::new();
        v.insert("t-alice", "alice", "Alice");
        v.insert("t-bob", "bob", "Bob");
        Arc::new(v)
    }

    async fn start_test_server(
        config: ServerConfig,
    ) -> (SocketAddr, Arc<GameServer>, Arc<EchoHandler>) {
        let handler = Arc::new(EchoHandler::default());
        let server = Arc::new(GameServer::new(config, verifier(), handler.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let srv = Arc::clone(&server);
        tokio::spawn(async move {
            srv.run_with_listener(listener).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        (addr, server, handler)
    }

    async fn hello(addr: SocketAddr, token: &str) -> (TcpStream, ServerMessage) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let frame = FrameConfig::default();
        let msg = ClientMessage::Hello {
            token: token.to_string(),
        };
        write_message(&mut stream, &msg, &frame).await.unwrap();
        let reply = read_message(&mut stream, &frame).await.unwrap();
        (stream, reply)
    }

    async fn assert_eof(stream: &mut TcpStream) {
        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("server should close the stream")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_valid_token_is_welcomed() {
        let (addr, server, handler) = start_test_server(ServerConfig::default()).await;
        let (_stream, reply) = hello(addr, "t-alice").await;
        assert_eq!(
            reply,
            ServerMessage::Welcome {
                identity: "alice".into(),
                name: "Alice".into()
            }
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(server.connections.len().await, 1);
        assert_eq!(handler.events(), vec!["open alice".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected_and_closed() {
        let (addr, server, handler) = start_test_server(ServerConfig::default()).await;
        let (mut stream, reply) = hello(addr, "t-mallory").await;
        assert!(matches!(reply, ServerMessage::Rejected { .. }));
        assert_eof(&mut stream).await;
        assert!(server.connections.is_empty().await);
        assert!(handler.events().is_empty(), "handler never sees refused peers");
    }

    #[tokio::test]
    async fn test_first_frame_must_be_hello() {
        let (addr, _server, handler) = start_test_server(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let frame = FrameConfig::default();
        write_message(&mut stream, &ClientMessage::ListRooms, &frame)
            .await
            .unwrap();
        let reply: ServerMessage = read_message(&mut stream, &frame).await.unwrap();
        let ServerMessage::Rejected { reason } = reply else {
            panic!("expected rejection");
        };
        assert!(reason.contains("list_rooms"), "{reason}");
        assert!(handler.events().is_empty());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let config = ServerConfig {
            handshake_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let (addr, _server, _handler) = start_test_server(config).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let reply: ServerMessage = read_message(&mut stream, &FrameConfig::default())
            .await
            .unwrap();
        assert!(matches!(reply, ServerMessage::Rejected { .. }));
        assert_eof(&mut stream).await;
    }

    #[tokio::test]
    async fn test_frames_reach_handler_and_replies_return() {
        let (addr, _server, _handler) = start_test_server(ServerConfig::default()).await;
        let (mut stream, _) = hello(addr, "t-alice").await;
        let frame = FrameConfig::default();

        write_frame(&mut stream, b"ping", &frame).await.unwrap();
        let reply: ServerMessage = read_message(&mut stream, &frame).await.unwrap();
        assert_eq!(
            reply,
            ServerMessage::error(ErrorCode::InvalidMessage, "ping")
        );
    }

    #[tokio::test]
    async fn test_disconnect_runs_on_close() {
        let (addr, server, handler) = start_test_server(ServerConfig::default()).await;
        let (stream, _) = hello(addr, "t-bob").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(stream);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            handler.events(),
            vec!["open bob".to_string(), "close bob".to_string()]
        );
        assert!(server.connections.is_empty().await);
    }

    #[tokio::test]
    async fn test_max_connections_enforced() {
        let config = ServerConfig {
            max_connections: 1,
            ..Default::default()
        };
        let (addr, server, _handler) = start_test_server(config).await;
        let (_first, reply) = hello(addr, "t-alice").await;
        assert!(matches!(reply, ServerMessage::Welcome { .. }));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        assert_eof(&mut second).await;
        assert_eq!(server.connections.len().await, 1);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_closes_connections() {
        let (addr, server, handler) = start_test_server(ServerConfig::default()).await;
        let (mut stream, _) = hello(addr, "t-alice").await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        server.shutdown();
        assert_eof(&mut stream).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handler.events().contains(&"close alice".to_string()));
    }

    #[tokio::test]
    async fn test_oversized_reply_is_dropped_and_connection_survives() {
        let config = ServerConfig {
            frame: FrameConfig {
                max_payload_size: 256,
            },
            ..Default::default()
        };
        let (addr, server, handler) = start_test_server(config.clone()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let hello = ClientMessage::Hello {
            token: "t-alice".into(),
        };
        write_message(&mut stream, &hello, &config.frame).await.unwrap();
        let reply: ServerMessage = read_message(&mut stream, &config.frame).await.unwrap();
        assert!(matches!(reply, ServerMessage::Welcome { .. }));

        // Fits inbound, but the echoed error envelope does not fit outbound.
        write_frame(&mut stream, &[b'x'; 250], &config.frame).await.unwrap();
        write_frame(&mut stream, b"ping", &config.frame).await.unwrap();

        let reply: ServerMessage = tokio::time::timeout(
            Duration::from_secs(2),
            read_message(&mut stream, &config.frame),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(
            reply,
            ServerMessage::error(ErrorCode::InvalidMessage, "ping")
        );
        assert_eq!(server.connections.len().await, 1);
        assert_eq!(handler.events(), vec!["open alice".to_string()]);
    }

    #[tokio::test]
    async fn test_write_loop_skips_unsendable_message() {
        let (server_side, mut client_side) = tokio::io::duplex(4096);
        let (tx, rx) = mpsc::channel(8);
        let (_closed_tx, closed_rx) = oneshot::channel();
        let (broken_tx, mut broken_rx) = oneshot::channel();
        let frame = FrameConfig {
            max_payload_size: 64,
        };
        tokio::spawn(GameServer::write_loop(
            server_side,
            rx,
            closed_rx,
            broken_tx,
            frame.clone(),
        ));

        tx.send(ServerMessage::error(ErrorCode::InvalidMessage, "y".repeat(200)))
            .await
            .unwrap();
        tx.send(ServerMessage::RoomsList { rooms: vec![] })
            .await
            .unwrap();

        let received: ServerMessage = read_message(&mut client_side, &frame).await.unwrap();
        assert_eq!(received, ServerMessage::RoomsList { rooms: vec![] });
        assert!(broken_rx.try_recv().is_err(), "writer is still running");
    }

    #[tokio::test]
    async fn test_write_failure_signals_reader() {
        let (server_side, client_side) = tokio::io::duplex(64);
        drop(client_side);
        let (tx, rx) = mpsc::channel(8);
        let (_closed_tx, closed_rx) = oneshot::channel();
        let (broken_tx, broken_rx) = oneshot::channel();
        let writer = tokio::spawn(GameServer::write_loop(
            server_side,
            rx,
            closed_rx,
            broken_tx,
            FrameConfig::default(),
        ));

        tx.send(ServerMessage::RoomsList { rooms: vec![] })
            .await
            .unwrap();
        let signal = tokio::time::timeout(Duration::from_secs(2), broken_rx)
            .await
            .unwrap();
        assert!(signal.is_ok());
        writer.await.unwrap();
    }
}
