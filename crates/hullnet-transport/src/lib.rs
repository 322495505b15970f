//! Transport abstraction layer for Hullnet.
//!
//! Provides the [`Transport`] trait that the peers drive by polling, the
//! [`Connection`] handle describing one remote endpoint, and two
//! implementations:
//!
//! - [`MemoryTransport`]: in-process, FIFO delivery through a shared
//!   [`MemoryNetwork`]. Used by tests and single-process setups.
//! - [`WebSocketTransport`]: real sockets, one binary frame per datagram.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryNetwork, MemoryTransport};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Handle to one remote endpoint.
///
/// The identity (id, address, optional third-party account id) never
/// changes once the value exists. When the server learns the account id
/// during the handshake it builds a new handle with
/// [`with_account_id`](Self::with_account_id) instead of mutating this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    account_id: Option<u64>,
}

impl Connection {
    /// Creates a handle for a freshly reported endpoint.
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            account_id: None,
        }
    }

    /// Returns a copy of this handle carrying the given account id.
    pub fn with_account_id(&self, account_id: u64) -> Self {
        Self {
            account_id: Some(account_id),
            ..self.clone()
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The remote IP, with IPv4-mapped IPv6 addresses unwrapped to IPv4.
    pub fn ip(&self) -> IpAddr {
        match self.addr.ip() {
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => IpAddr::V6(v6),
            },
            v4 => v4,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Third-party account id, if the handshake established one.
    pub fn account_id(&self) -> Option<u64> {
        self.account_id
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.addr)
    }
}

// ---------------------------------------------------------------------------
// Delivery and events
// ---------------------------------------------------------------------------

/// Delivery modes a transport knows how to provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeDelivery {
    /// May be dropped or reordered. Never blocks the sender.
    Unreliable,
    /// Eventually delivered, no ordering between sends.
    ReliableUnordered,
    /// Eventually delivered, in send order.
    ReliableOrdered,
}

/// Liveness changes reported for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// An outgoing connection finished connecting.
    Connected,
    /// The connection is gone. `reason` is human-readable.
    Disconnected { reason: String },
}

/// Something the transport observed since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A remote endpoint connected to a listening transport.
    Incoming(Connection),
    /// A datagram arrived.
    Data { conn: ConnectionId, bytes: Vec<u8> },
    /// A connection changed state.
    StatusChanged {
        conn: ConnectionId,
        status: ConnectionStatus,
    },
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A datagram transport driven by polling.
///
/// None of these methods block. Implementations may run their own I/O
/// thread, but every event is handed out through [`poll_event`], on the
/// caller's thread, in arrival order.
///
/// [`poll_event`]: Transport::poll_event
pub trait Transport: Send {
    /// Opens a connection to a remote endpoint (client role).
    ///
    /// Returns immediately. A [`ConnectionStatus::Connected`] or
    /// [`ConnectionStatus::Disconnected`] event follows later.
    fn connect(&mut self, endpoint: SocketAddr) -> Result<Connection, TransportError>;

    /// Queues one datagram for the given connection.
    fn send(
        &mut self,
        conn: ConnectionId,
        data: &[u8],
        delivery: NativeDelivery,
    ) -> Result<(), TransportError>;

    /// Returns the next pending event, or `None` if nothing is queued.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    /// Closes one connection. Unknown ids are ignored.
    fn disconnect(&mut self, conn: ConnectionId, reason: &str);

    /// Closes every connection and stops accepting new ones.
    fn shutdown(&mut self, reason: &str);

    /// The delivery mode actually used for a requested mode.
    ///
    /// Transports without unreliable or unordered modes return a stronger
    /// guarantee.
    fn effective_delivery(&self, requested: NativeDelivery) -> NativeDelivery {
        requested
    }
}
