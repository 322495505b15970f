//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The transport owns a small tokio runtime. Each link runs as a task on
//! that runtime and reports back through an unbounded channel, which
//! [`Transport::poll_event`] drains without blocking. WebSocket is
//! reliable and ordered, so every requested delivery mode is upgraded to
//! [`NativeDelivery::ReliableOrdered`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    Connection, ConnectionId, ConnectionStatus, NativeDelivery, Transport,
    TransportError, TransportEvent,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Instructions from the polling side to a link task.
enum LinkCommand {
    Send(Vec<u8>),
    Close,
}

/// Reports from the I/O tasks to the polling side.
enum LinkEvent {
    Accepted(Connection, UnboundedSender<LinkCommand>),
    Event(TransportEvent),
}

/// A WebSocket-based [`Transport`], either listening or connecting.
pub struct WebSocketTransport {
    runtime: Option<Runtime>,
    events_tx: UnboundedSender<LinkEvent>,
    events_rx: UnboundedReceiver<LinkEvent>,
    links: HashMap<ConnectionId, UnboundedSender<LinkCommand>>,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    closed: bool,
}

impl WebSocketTransport {
    /// Creates a transport for the client role.
    pub fn client() -> Result<Self, TransportError> {
        Ok(Self::with_runtime(build_runtime()?))
    }

    /// Binds a listening transport to the given address.
    pub fn listen(addr: &str) -> Result<Self, TransportError> {
        let runtime = build_runtime()?;
        let listener = runtime
            .block_on(TcpListener::bind(addr))
            .map_err(TransportError::BindFailed)?;
        let local_addr = listener.local_addr().map_err(TransportError::BindFailed)?;

        let mut transport = Self::with_runtime(runtime);
        transport.local_addr = Some(local_addr);

        let events = transport.events_tx.clone();
        if let Some(runtime) = &transport.runtime {
            transport.accept_task = Some(runtime.spawn(accept_loop(listener, events)));
        }
        tracing::info!(%local_addr, "WebSocket transport listening");
        Ok(transport)
    }

    /// The bound address of a listening transport.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn with_runtime(runtime: Runtime) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            runtime: Some(runtime),
            events_tx,
            events_rx,
            links: HashMap::new(),
            accept_task: None,
            local_addr: None,
            closed: false,
        }
    }
}

fn build_runtime() -> Result<Runtime, TransportError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("hullnet-ws-io")
        .enable_all()
        .build()
        .map_err(TransportError::BindFailed)
}

async fn accept_loop(listener: TcpListener, events: UnboundedSender<LinkEvent>) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                continue;
            }
        };
        let events = events.clone();
        tokio::spawn(async move {
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "WebSocket upgrade failed");
                    return;
                }
            };
            let id = next_connection_id();
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            tracing::debug!(%id, %addr, "accepted WebSocket connection");
            if events
                .send(LinkEvent::Accepted(Connection::new(id, addr), cmd_tx))
                .is_err()
            {
                return;
            }
            run_link(ws, id, cmd_rx, events).await;
        });
    }
}

/// Pumps one WebSocket until either side closes it.
async fn run_link<S>(
    ws: WebSocketStream<S>,
    id: ConnectionId,
    mut commands: UnboundedReceiver<LinkCommand>,
    events: UnboundedSender<LinkEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let reason = loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(LinkCommand::Send(data)) => {
                    if let Err(e) = sink.send(Message::Binary(data.into())).await {
                        break format!("send failed: {e}");
                    }
                }
                Some(LinkCommand::Close) | None => {
                    let _ = sink.close().await;
                    return;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    let event = TransportEvent::Data { conn: id, bytes: data.to_vec() };
                    if events.send(LinkEvent::Event(event)).is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    break "connection closed by remote".to_string();
                }
                Some(Ok(_)) => continue, // skip text/ping/pong/frame
                Some(Err(e)) => break format!("receive failed: {e}"),
            },
        }
    };

    tracing::debug!(%id, %reason, "WebSocket link ended");
    let _ = events.send(LinkEvent::Event(TransportEvent::StatusChanged {
        conn: id,
        status: ConnectionStatus::Disconnected { reason },
    }));
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, endpoint: SocketAddr) -> Result<Connection, TransportError> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        let runtime = self.runtime.as_ref().ok_or(TransportError::Shutdown)?;

        let id = next_connection_id();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        self.links.insert(id, cmd_tx);

        let events = self.events_tx.clone();
        runtime.spawn(async move {
            let url = format!("ws://{endpoint}");
            match tokio_tungstenite::connect_async(url).await {
                Ok((ws, _)) => {
                    let connected = TransportEvent::StatusChanged {
                        conn: id,
                        status: ConnectionStatus::Connected,
                    };
                    if events.send(LinkEvent::Event(connected)).is_ok() {
                        run_link(ws, id, cmd_rx, events).await;
                    }
                }
                Err(e) => {
                    let _ = events.send(LinkEvent::Event(TransportEvent::StatusChanged {
                        conn: id,
                        status: ConnectionStatus::Disconnected {
                            reason: format!("could not connect to {endpoint}: {e}"),
                        },
                    }));
                }
            }
        });

        tracing::debug!(%id, %endpoint, "WebSocket connecting");
        Ok(Connection::new(id, endpoint))
    }

    fn send(
        &mut self,
        conn: ConnectionId,
        data: &[u8],
        _delivery: NativeDelivery,
    ) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        let link = self
            .links
            .get(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        link.send(LinkCommand::Send(data.to_vec())).map_err(|_| {
            TransportError::ConnectionClosed(format!("link task for {conn} ended"))
        })
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                LinkEvent::Accepted(conn, commands) => {
                    if self.closed {
                        let _ = commands.send(LinkCommand::Close);
                        continue;
                    }
                    self.links.insert(conn.id(), commands);
                    return Some(TransportEvent::Incoming(conn));
                }
                LinkEvent::Event(event) => {
                    let conn = match &event {
                        TransportEvent::Incoming(conn) => conn.id(),
                        TransportEvent::Data { conn, .. }
                        | TransportEvent::StatusChanged { conn, .. } => *conn,
                    };
                    // Links closed locally report nothing further.
                    if !self.links.contains_key(&conn) {
                        continue;
                    }
                    if let TransportEvent::StatusChanged {
                        status: ConnectionStatus::Disconnected { .. },
                        ..
                    } = &event
                    {
                        self.links.remove(&conn);
                    }
                    return Some(event);
                }
            }
        }
        None
    }

    fn disconnect(&mut self, conn: ConnectionId, reason: &str) {
        if let Some(link) = self.links.remove(&conn) {
            tracing::debug!(%conn, %reason, "closing WebSocket link");
            let _ = link.send(LinkCommand::Close);
        }
    }

    fn shutdown(&mut self, reason: &str) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        for (_, link) in self.links.drain() {
            let _ = link.send(LinkCommand::Close);
        }
        tracing::info!(%reason, "WebSocket transport shut down");
    }

    fn effective_delivery(&self, _requested: NativeDelivery) -> NativeDelivery {
        NativeDelivery::ReliableOrdered
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.shutdown("transport dropped");
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
