//! # Hullnet
//!
//! Peer-to-server networking for a multiplayer submarine game.
//!
//! Hullnet turns an unreliable datagram transport into two polled peers:
//! a [`ClientPeer`] that connects to one server, and a [`ServerPeer`] that
//! admits many clients. Both speak a compact, bit-packed protocol:
//!
//! ```text
//!   game code                    game code
//!      │ WriteOnlyMessage            ▲ ReadOnlyMessage
//!      ▼                             │
//!   ClientPeer ── handshake ──▶ ServerPeer
//!      │   ticket + version          │
//!      │   ◀── password salt         │
//!      │   salted hash ──▶           │
//!      │   ◀── success               │
//!      ▼                             ▼
//!   Transport (memory, WebSocket, anything implementing the trait)
//! ```
//!
//! Nothing runs in the background. Call `update()` on each peer once per
//! tick; every [`ClientHandler`] / [`ServerHandler`] callback fires from
//! inside that call.
//!
//! ## Quick Start
//!
//! ```rust
//! use hullnet::prelude::*;
//!
//! let network = MemoryNetwork::new();
//! let addr = "127.0.0.1:27015".parse().unwrap();
//!
//! let mut server = ServerPeer::new(network.listen(addr)?, AcceptAll, (), ServerConfig::default());
//! server.start()?;
//!
//! let credentials = StaticCredentials::new(76561198000000001, vec![7; 16]);
//! let mut client = ClientPeer::new(network.client(), credentials, (), ClientConfig::default());
//! client.start(addr)?;
//!
//! for _ in 0..4 {
//!     server.update();
//!     client.update();
//! }
//! assert_eq!(client.handshake_state(), Some(HandshakeState::Complete));
//!
//! let mut hello = WriteOnlyMessage::new();
//! hello.write_string("hello");
//! client.send(&hello, DeliveryMethod::Reliable)?;
//! # Ok::<(), hullnet::HullnetError>(())
//! ```

mod ban;
mod client;
mod config;
mod error;
mod handler;
mod server;

pub use ban::{BanEntry, BanList};
pub use client::ClientPeer;
pub use config::{ClientConfig, ContentPackageEntry, DEFAULT_VERSION, ServerConfig};
pub use error::HullnetError;
pub use handler::{ClientHandler, ServerHandler};
pub use server::ServerPeer;

pub use hullnet_protocol as protocol;
pub use hullnet_session as session;
pub use hullnet_transport as transport;

/// Reason reported when a peer closes without giving one.
pub const DEFAULT_CLOSE_REASON: &str = "Disconnected";

/// Everything a game needs to run a client or server.
pub mod prelude {
    pub use crate::{
        ClientConfig, ClientHandler, ClientPeer, HullnetError, ServerConfig, ServerHandler,
        ServerPeer,
    };
    pub use hullnet_protocol::{
        DeliveryMethod, Message, ReadMessage, ReadOnlyMessage, ReadWriteMessage, WriteMessage,
        WriteOnlyMessage,
    };
    pub use hullnet_session::{
        AcceptAll, CredentialProvider, HandshakeState, IdentityVerifier, StaticCredentials,
    };
    pub use hullnet_transport::{Connection, ConnectionId, MemoryNetwork, Transport};

    #[cfg(feature = "websocket")]
    pub use hullnet_transport::WebSocketTransport;
}
