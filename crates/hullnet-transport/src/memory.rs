//! In-process transport.
//!
//! A [`MemoryNetwork`] is a registry of listening addresses. Transports
//! created from the same network can connect to each other; every frame
//! travels through an `mpsc` channel, so delivery is reliable and FIFO
//! per link regardless of the requested mode.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use parking_lot::Mutex;

use crate::{
    Connection, ConnectionId, ConnectionStatus, NativeDelivery, Transport,
    TransportError, TransportEvent,
};

/// What travels between two memory transports.
enum Frame {
    Open {
        conn: ConnectionId,
        from: SocketAddr,
        reply: Sender<Frame>,
    },
    Accepted {
        conn: ConnectionId,
    },
    Data {
        conn: ConnectionId,
        bytes: Vec<u8>,
    },
    Close {
        conn: ConnectionId,
        reason: String,
    },
}

struct NetworkInner {
    listeners: Mutex<HashMap<SocketAddr, Sender<Frame>>>,
    next_conn: AtomicU64,
    next_port: AtomicU16,
}

/// Shared registry that memory transports connect through.
///
/// Cloning is cheap; clones refer to the same network.
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                listeners: Mutex::new(HashMap::new()),
                next_conn: AtomicU64::new(1),
                next_port: AtomicU16::new(40000),
            }),
        }
    }

    /// Creates a transport that accepts connections at `addr`.
    ///
    /// # Errors
    /// Returns [`TransportError::BindFailed`] if another transport already
    /// listens at that address.
    pub fn listen(&self, addr: SocketAddr) -> Result<MemoryTransport, TransportError> {
        let mut listeners = self.inner.listeners.lock();
        if listeners.contains_key(&addr) {
            return Err(TransportError::BindFailed(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("{addr} already in use"),
            )));
        }
        let transport = MemoryTransport::new(self.clone(), addr, true);
        listeners.insert(addr, transport.inbox_tx.clone());
        tracing::debug!(%addr, "memory transport listening");
        Ok(transport)
    }

    /// Creates a client transport with an automatically assigned address.
    pub fn client(&self) -> MemoryTransport {
        let port = self.inner.next_port.fetch_add(1, Ordering::Relaxed);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        MemoryTransport::new(self.clone(), addr, false)
    }

    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.inner.next_conn.fetch_add(1, Ordering::Relaxed))
    }

    fn listener(&self, addr: &SocketAddr) -> Option<Sender<Frame>> {
        self.inner.listeners.lock().get(addr).cloned()
    }

    fn unregister(&self, addr: &SocketAddr) {
        self.inner.listeners.lock().remove(addr);
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: MemoryNetwork,
    local_addr: SocketAddr,
    listening: bool,
    closed: bool,
    inbox_tx: Sender<Frame>,
    inbox: Receiver<Frame>,
    /// Outgoing side of every open link, keyed by the shared link id.
    links: HashMap<ConnectionId, Sender<Frame>>,
    pending: VecDeque<TransportEvent>,
}

impl MemoryTransport {
    fn new(network: MemoryNetwork, local_addr: SocketAddr, listening: bool) -> Self {
        let (inbox_tx, inbox) = mpsc::channel();
        Self {
            network,
            local_addr,
            listening,
            closed: false,
            inbox_tx,
            inbox,
            links: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently open links.
    pub fn connection_count(&self) -> usize {
        self.links.len()
    }

    fn handle_frame(&mut self, frame: Frame) -> Option<TransportEvent> {
        match frame {
            Frame::Open { conn, from, reply } => {
                if !self.listening || self.closed {
                    let _ = reply.send(Frame::Close {
                        conn,
                        reason: "connection refused".into(),
                    });
                    return None;
                }
                let _ = reply.send(Frame::Accepted { conn });
                self.links.insert(conn, reply);
                Some(TransportEvent::Incoming(Connection::new(conn, from)))
            }
            Frame::Accepted { conn } => {
                self.links.contains_key(&conn).then_some(TransportEvent::StatusChanged {
                    conn,
                    status: ConnectionStatus::Connected,
                })
            }
            Frame::Data { conn, bytes } => self
                .links
                .contains_key(&conn)
                .then_some(TransportEvent::Data { conn, bytes }),
            Frame::Close { conn, reason } => {
                self.links.remove(&conn).map(|_| TransportEvent::StatusChanged {
                    conn,
                    status: ConnectionStatus::Disconnected { reason },
                })
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, endpoint: SocketAddr) -> Result<Connection, TransportError> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        let listener = self
            .network
            .listener(&endpoint)
            .ok_or(TransportError::Unreachable(endpoint))?;

        let conn = self.network.next_connection_id();
        listener
            .send(Frame::Open {
                conn,
                from: self.local_addr,
                reply: self.inbox_tx.clone(),
            })
            .map_err(|_| {
                self.network.unregister(&endpoint);
                TransportError::Unreachable(endpoint)
            })?;
        self.links.insert(conn, listener);

        tracing::debug!(%conn, %endpoint, "memory transport connecting");
        Ok(Connection::new(conn, endpoint))
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
        if link
            .send(Frame::Data {
                conn,
                bytes: data.to_vec(),
            })
            .is_err()
        {
            self.links.remove(&conn);
            self.pending.push_back(TransportEvent::StatusChanged {
                conn,
                status: ConnectionStatus::Disconnected {
                    reason: "remote transport dropped".into(),
                },
            });
            return Err(TransportError::ConnectionClosed(
                "remote transport dropped".into(),
            ));
        }
        Ok(())
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        while let Ok(frame) = self.inbox.try_recv() {
            if let Some(event) = self.handle_frame(frame) {
                return Some(event);
            }
        }
        None
    }

    fn disconnect(&mut self, conn: ConnectionId, reason: &str) {
        if let Some(link) = self.links.remove(&conn) {
            let _ = link.send(Frame::Close {
                conn,
                reason: reason.to_string(),
            });
        }
    }

    fn shutdown(&mut self, reason: &str) {
        if self.closed {
            return;
        }
        for (conn, link) in self.links.drain() {
            let _ = link.send(Frame::Close {
                conn,
                reason: reason.to_string(),
            });
        }
        if self.listening {
            self.network.unregister(&self.local_addr);
        }
        self.closed = true;
        tracing::debug!(addr = %self.local_addr, %reason, "memory transport shut down");
    }

    fn effective_delivery(&self, _requested: NativeDelivery) -> NativeDelivery {
        NativeDelivery::ReliableOrdered
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.shutdown("transport dropped");
    }
}
