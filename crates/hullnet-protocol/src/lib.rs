//! Wire protocol for Hullnet.
//!
//! This crate is everything that touches bytes, and nothing that touches
//! sockets:
//!
//! - **Codec** ([`BitBuffer`]): packs primitives at arbitrary bit offsets.
//! - **Messages** ([`WriteOnlyMessage`], [`ReadOnlyMessage`],
//!   [`ReadWriteMessage`]): cursor-based views over a buffer, plus the
//!   compress-above-threshold step that readies a message for sending.
//! - **Framing** ([`PacketHeader`], [`IncomingPacket`]): the header byte
//!   and the three datagram shapes (data, initialization, disconnect).
//! - **Handshake wire types** ([`ConnectionInitialization`],
//!   [`ClientInitMessage`], [`ServerInitMessage`]).
//! - **Delivery** ([`DeliveryMethod`]): what a caller asks the transport
//!   for.
//!
//! ```text
//! Transport (datagrams) → Protocol (messages, steps) → Session (handshake) → Peer
//! ```
//!
//! # Alignment
//!
//! Values are packed fully unaligned. Nothing is ever padded implicitly;
//! see the [`bits`] module docs.

pub mod bits;
mod compression;
mod delivery;
mod error;
mod message;
mod packet;
mod types;

pub use bits::BitBuffer;
pub use compression::{compress, decompress};
pub use delivery::DeliveryMethod;
pub use error::ProtocolError;
pub use message::{
    Message, PreparedMessage, ReadMessage, ReadOnlyMessage, ReadWriteMessage, WriteMessage,
    WriteOnlyMessage,
};
pub use packet::{
    IncomingPacket, PacketHeader, encode_data_packet, encode_disconnect_packet,
    encode_init_packet,
};
pub use types::{
    ClientInitMessage, ConnectionInitialization, ContentPackageInfo, PasswordChallenge,
    PasswordResponse, ServerInitMessage, TicketAndVersion,
};

/// Largest datagram assumed to cross the network unfragmented.
///
/// Unreliable sends above this are the caller's to split.
pub const MTU: usize = 1200;

/// Payloads up to this many bytes are sent uncompressed.
pub const COMPRESSION_THRESHOLD: usize = 1000;

/// Hard cap on a single message, before and after compression.
pub const MAX_MESSAGE_BYTES: usize = 5000;
