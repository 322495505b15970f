//! Messages: stateful views over a [`BitBuffer`].
//!
//! There are three concrete message types, split by what a caller may do
//! with them:
//!
//! | Type                  | Write | Read | Send |
//! |-----------------------|-------|------|------|
//! | [`WriteOnlyMessage`]  | yes   | no   | yes  |
//! | [`ReadOnlyMessage`]   | no    | yes  | no   |
//! | [`ReadWriteMessage`]  | yes   | yes  | no   |
//!
//! Writing and reading live in the [`WriteMessage`] and [`ReadMessage`]
//! traits, with the shared cursor controls in [`Message`]. Every method
//! has a default body that forwards to the underlying buffer, so a message
//! type only has to hand out its [`BitBuffer`].
//!
//! A read-write message implements [`WriteMessage`] (so it can be filled
//! through the same code paths as an outgoing message) but its
//! [`prepare_for_sending`](WriteMessage::prepare_for_sending) always fails
//! with [`ProtocolError::NotSendable`].

use std::ops::Range;

use hullnet_transport::ConnectionId;

use crate::bits::BitBuffer;
use crate::compression::{compress, decompress};
use crate::{COMPRESSION_THRESHOLD, MAX_MESSAGE_BYTES, ProtocolError};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Cursor and length controls shared by every message type.
pub trait Message {
    fn buffer(&self) -> &BitBuffer;

    fn buffer_mut(&mut self) -> &mut BitBuffer;

    fn bit_position(&self) -> usize {
        self.buffer().bit_position()
    }

    fn set_bit_position(&mut self, position: usize) {
        self.buffer_mut().set_bit_position(position);
    }

    fn byte_position(&self) -> usize {
        self.buffer().byte_position()
    }

    fn length_bits(&self) -> usize {
        self.buffer().length_bits()
    }

    fn set_length_bits(&mut self, length_bits: usize) {
        self.buffer_mut().set_length_bits(length_bits);
    }

    fn length_bytes(&self) -> usize {
        self.buffer().length_bytes()
    }

    /// The message contents, `length_bytes()` long.
    fn bytes(&self) -> &[u8] {
        self.buffer().as_bytes()
    }
}

/// Write access to a message.
pub trait WriteMessage: Message {
    /// Produces the on-wire payload for this message.
    ///
    /// # Errors
    /// [`ProtocolError::NotSendable`] for read-write messages,
    /// [`ProtocolError::MessageTooLarge`] above [`MAX_MESSAGE_BYTES`].
    fn prepare_for_sending(&self) -> Result<PreparedMessage, ProtocolError>;

    fn write_bool(&mut self, value: bool) {
        self.buffer_mut().write_bool(value);
    }

    fn write_pad_bits(&mut self) {
        self.buffer_mut().write_pad_bits();
    }

    fn write_u8(&mut self, value: u8) {
        self.buffer_mut().write_u8(value);
    }

    fn write_u16(&mut self, value: u16) {
        self.buffer_mut().write_u16(value);
    }

    fn write_i16(&mut self, value: i16) {
        self.buffer_mut().write_i16(value);
    }

    fn write_u32(&mut self, value: u32) {
        self.buffer_mut().write_u32(value);
    }

    fn write_i32(&mut self, value: i32) {
        self.buffer_mut().write_i32(value);
    }

    fn write_u64(&mut self, value: u64) {
        self.buffer_mut().write_u64(value);
    }

    fn write_i64(&mut self, value: i64) {
        self.buffer_mut().write_i64(value);
    }

    fn write_f32(&mut self, value: f32) {
        self.buffer_mut().write_f32(value);
    }

    fn write_f64(&mut self, value: f64) {
        self.buffer_mut().write_f64(value);
    }

    fn write_var_u32(&mut self, value: u32) -> usize {
        self.buffer_mut().write_var_u32(value)
    }

    fn write_string(&mut self, value: &str) {
        self.buffer_mut().write_string(value);
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer_mut().write_bytes(bytes);
    }

    fn write_ranged_integer(&mut self, value: i32, min: i32, max: i32) -> Result<(), ProtocolError> {
        self.buffer_mut().write_ranged_integer(value, min, max)
    }

    fn write_ranged_float(
        &mut self,
        value: f32,
        min: f32,
        max: f32,
        bit_count: u32,
    ) -> Result<(), ProtocolError> {
        self.buffer_mut().write_ranged_float(value, min, max, bit_count)
    }
}

/// Read access to a message.
pub trait ReadMessage: Message {
    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        self.buffer_mut().read_bool()
    }

    fn read_pad_bits(&mut self) -> Result<(), ProtocolError> {
        self.buffer_mut().read_pad_bits()
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.buffer_mut().read_u8()
    }

    fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.buffer_mut().read_u16()
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        self.buffer_mut().read_i16()
    }

    fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.buffer_mut().read_u32()
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.buffer_mut().read_i32()
    }

    fn read_u64(&mut self) -> Result<u64, ProtocolError> {
        self.buffer_mut().read_u64()
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.buffer_mut().read_i64()
    }

    fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        self.buffer_mut().read_f32()
    }

    fn read_f64(&mut self) -> Result<f64, ProtocolError> {
        self.buffer_mut().read_f64()
    }

    fn read_var_u32(&mut self) -> Result<u32, ProtocolError> {
        self.buffer_mut().read_var_u32()
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        self.buffer_mut().read_string()
    }

    fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, ProtocolError> {
        self.buffer_mut().read_bytes(count)
    }

    fn read_ranged_integer(&mut self, min: i32, max: i32) -> Result<i32, ProtocolError> {
        self.buffer_mut().read_ranged_integer(min, max)
    }

    fn read_ranged_float(&mut self, min: f32, max: f32, bit_count: u32) -> Result<f32, ProtocolError> {
        self.buffer_mut().read_ranged_float(min, max, bit_count)
    }
}

// ---------------------------------------------------------------------------
// PreparedMessage
// ---------------------------------------------------------------------------

/// A message payload ready to be framed into a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMessage {
    pub bytes: Vec<u8>,
    /// Set when `bytes` holds deflate output rather than the raw message.
    pub compressed: bool,
}

impl PreparedMessage {
    /// Applies the size cap and the compression threshold to raw bytes.
    ///
    /// Payloads of up to [`COMPRESSION_THRESHOLD`] bytes are copied as is.
    /// Anything larger is deflated and flagged as compressed, even in the
    /// rare case where deflate makes it bigger.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_MESSAGE_BYTES {
            return Err(ProtocolError::MessageTooLarge {
                length: payload.len(),
                max: MAX_MESSAGE_BYTES,
            });
        }
        if payload.len() <= COMPRESSION_THRESHOLD {
            return Ok(Self {
                bytes: payload.to_vec(),
                compressed: false,
            });
        }

        let bytes = compress(payload)?;
        tracing::trace!(
            original = payload.len(),
            compressed = bytes.len(),
            "compressed outgoing message"
        );
        Ok(Self {
            bytes,
            compressed: true,
        })
    }
}

// ---------------------------------------------------------------------------
// WriteOnlyMessage
// ---------------------------------------------------------------------------

/// An outgoing message, filled once and then sent.
#[derive(Debug, Clone, Default)]
pub struct WriteOnlyMessage {
    buf: BitBuffer,
}

impl WriteOnlyMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: BitBuffer::with_capacity(bytes),
        }
    }
}

impl Message for WriteOnlyMessage {
    fn buffer(&self) -> &BitBuffer {
        &self.buf
    }

    fn buffer_mut(&mut self) -> &mut BitBuffer {
        &mut self.buf
    }
}

impl WriteMessage for WriteOnlyMessage {
    fn prepare_for_sending(&self) -> Result<PreparedMessage, ProtocolError> {
        PreparedMessage::from_payload(self.buf.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// ReadOnlyMessage
// ---------------------------------------------------------------------------

/// A received message, decompressed into its own buffer before any read.
#[derive(Debug, Clone)]
pub struct ReadOnlyMessage {
    buf: BitBuffer,
    sender: Option<ConnectionId>,
}

impl ReadOnlyMessage {
    /// Builds a message from `data[range]`, inflating it first if
    /// `compressed` is set.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidByteRange`] if `range` does not fit `data`;
    /// [`ProtocolError::Compression`] or [`ProtocolError::MessageTooLarge`]
    /// if the compressed payload is corrupt or inflates past the cap.
    pub fn from_received(
        data: &[u8],
        compressed: bool,
        range: Range<usize>,
        sender: Option<ConnectionId>,
    ) -> Result<Self, ProtocolError> {
        let payload = data.get(range.clone()).ok_or(ProtocolError::InvalidByteRange {
            start: range.start,
            end: range.end,
            len: data.len(),
        })?;
        let bytes = if compressed {
            decompress(payload, MAX_MESSAGE_BYTES)?
        } else {
            payload.to_vec()
        };
        Ok(Self {
            buf: BitBuffer::from_bytes(bytes),
            sender,
        })
    }

    /// The connection this message arrived on, if any.
    pub fn sender(&self) -> Option<ConnectionId> {
        self.sender
    }
}

impl Message for ReadOnlyMessage {
    fn buffer(&self) -> &BitBuffer {
        &self.buf
    }

    fn buffer_mut(&mut self) -> &mut BitBuffer {
        &mut self.buf
    }
}

impl ReadMessage for ReadOnlyMessage {}

// ---------------------------------------------------------------------------
// ReadWriteMessage
// ---------------------------------------------------------------------------

/// A scratch message for local round trips. Never sendable.
#[derive(Debug, Clone, Default)]
pub struct ReadWriteMessage {
    buf: BitBuffer,
}

impl ReadWriteMessage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Message for ReadWriteMessage {
    fn buffer(&self) -> &BitBuffer {
        &self.buf
    }

    fn buffer_mut(&mut self) -> &mut BitBuffer {
        &mut self.buf
    }
}

impl WriteMessage for ReadWriteMessage {
    fn prepare_for_sending(&self) -> Result<PreparedMessage, ProtocolError> {
        Err(ProtocolError::NotSendable)
    }
}

impl ReadMessage for ReadWriteMessage {}
