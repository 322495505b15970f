//! Datagram framing.
//!
//! Every datagram starts with a [`PacketHeader`] byte. What follows
//! depends on the header:
//!
//! ```text
//! data:            [header][len: u16 LE][payload: len bytes]
//! initialization:  [header | INIT][step: u8][step fields…]
//! disconnect:      [DISCONNECT][reason: string]
//! ```
//!
//! The `COMPRESSED` bit applies to the data payload or to the step fields,
//! never to the header, length or step byte.

use std::fmt;
use std::ops::BitOr;

use hullnet_transport::ConnectionId;

use crate::bits::BitBuffer;
use crate::message::{PreparedMessage, ReadMessage, ReadOnlyMessage, WriteMessage};
use crate::types::ConnectionInitialization;
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Flag byte at the start of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PacketHeader(u8);

impl PacketHeader {
    pub const NONE: Self = Self(0);
    pub const COMPRESSED: Self = Self(0x01);
    pub const CONNECTION_INITIALIZATION: Self = Self(0x02);
    pub const DISCONNECT: Self = Self(0x04);

    const KNOWN_BITS: u8 = 0x07;

    /// Parses a header byte, rejecting bits this protocol doesn't define.
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        if byte & !Self::KNOWN_BITS != 0 {
            return Err(ProtocolError::UnknownHeader(byte));
        }
        Ok(Self(byte))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_compressed(self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    pub fn is_connection_initialization(self) -> bool {
        self.contains(Self::CONNECTION_INITIALIZATION)
    }

    pub fn is_disconnect(self) -> bool {
        self.contains(Self::DISCONNECT)
    }
}

impl BitOr for PacketHeader {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Frames an application payload as a data datagram.
pub fn encode_data_packet(prepared: &PreparedMessage) -> Result<Vec<u8>, ProtocolError> {
    let len = u16::try_from(prepared.bytes.len()).map_err(|_| ProtocolError::MessageTooLarge {
        length: prepared.bytes.len(),
        max: u16::MAX as usize,
    })?;
    let header = if prepared.compressed {
        PacketHeader::COMPRESSED
    } else {
        PacketHeader::NONE
    };

    let mut buf = BitBuffer::with_capacity(prepared.bytes.len() + 3);
    buf.write_u8(header.bits());
    buf.write_u16(len);
    buf.write_bytes(&prepared.bytes);
    Ok(buf.into_bytes())
}

/// Frames handshake step fields as an initialization datagram.
pub fn encode_init_packet(
    step: ConnectionInitialization,
    body: &impl WriteMessage,
) -> Result<Vec<u8>, ProtocolError> {
    let prepared = body.prepare_for_sending()?;
    let mut header = PacketHeader::CONNECTION_INITIALIZATION;
    if prepared.compressed {
        header = header | PacketHeader::COMPRESSED;
    }

    let mut buf = BitBuffer::with_capacity(prepared.bytes.len() + 2);
    buf.write_u8(header.bits());
    buf.write_u8(step.as_u8());
    buf.write_bytes(&prepared.bytes);
    Ok(buf.into_bytes())
}

/// Builds the datagram that tells the remote side why it is being dropped.
pub fn encode_disconnect_packet(reason: &str) -> Vec<u8> {
    let mut buf = BitBuffer::with_capacity(reason.len() + 3);
    buf.write_u8(PacketHeader::DISCONNECT.bits());
    buf.write_string(reason);
    buf.into_bytes()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A decoded datagram.
#[derive(Debug)]
pub enum IncomingPacket {
    /// Application data, ready for field reads.
    Data(ReadOnlyMessage),
    /// A handshake step. The body holds the step fields only.
    Initialization {
        step: ConnectionInitialization,
        body: ReadOnlyMessage,
    },
    /// The remote side is closing the connection.
    Disconnect { reason: String },
}

impl IncomingPacket {
    /// Splits a raw datagram into its header and a readable message.
    ///
    /// # Errors
    /// Any framing problem (unknown header bits, a step byte outside the
    /// known steps, a length longer than the datagram, bad deflate data)
    /// fails the whole datagram.
    pub fn decode(data: &[u8], sender: Option<ConnectionId>) -> Result<Self, ProtocolError> {
        let (&first, _) = data
            .split_first()
            .ok_or_else(|| ProtocolError::InvalidMessage("empty datagram".into()))?;
        let header = PacketHeader::from_byte(first)?;

        if header.is_disconnect() {
            if header != PacketHeader::DISCONNECT {
                return Err(ProtocolError::UnknownHeader(first));
            }
            let mut body = ReadOnlyMessage::from_received(data, false, 1..data.len(), sender)?;
            let reason = body.read_string()?;
            return Ok(Self::Disconnect { reason });
        }

        if header.is_connection_initialization() {
            let step_byte = *data.get(1).ok_or(ProtocolError::ReadPastEnd {
                position: 8,
                requested: 8,
                length: data.len() * 8,
            })?;
            let step = ConnectionInitialization::try_from(step_byte)?;
            let body =
                ReadOnlyMessage::from_received(data, header.is_compressed(), 2..data.len(), sender)?;
            return Ok(Self::Initialization { step, body });
        }

        let mut framing = BitBuffer::from_bytes(data.get(..3).unwrap_or(data).to_vec());
        framing.read_u8()?;
        let len = framing.read_u16()? as usize;
        let message = ReadOnlyMessage::from_received(data, header.is_compressed(), 3..3 + len, sender)?;
        Ok(Self::Data(message))
    }
}
