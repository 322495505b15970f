use std::net::SocketAddr;

use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The connection id is not known to this transport.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// Nothing is listening at the requested endpoint.
    #[error("no listener at {0}")]
    Unreachable(SocketAddr),

    /// Binding a listener or starting the I/O runtime failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
