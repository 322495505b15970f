//! Error types for the protocol layer.
//!
//! Every variant except [`ProtocolError::NotSendable`] and the ranged-write
//! checks describes malformed input: the datagram that produced it is
//! dropped as a whole.

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A read needed more bits than the message holds.
    #[error("read past end: {requested} bits at bit {position}, message has {length}")]
    ReadPastEnd {
        position: usize,
        requested: usize,
        length: usize,
    },

    /// A variable-length integer ran longer than 5 bytes.
    #[error("malformed variable-length integer")]
    MalformedVarInt,

    /// A string field did not hold valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A ranged value was outside its declared range.
    #[error("value {value} outside range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    /// `min` was greater than `max`, or a float range was empty or not finite.
    #[error("invalid range [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    /// Ranged floats take 1 to 32 bits.
    #[error("invalid bit count {0}, expected 1..=32")]
    InvalidBitCount(u32),

    /// The message exceeds the hard per-message cap.
    #[error("message of {length} bytes exceeds the {max} byte limit")]
    MessageTooLarge { length: usize, max: usize },

    /// Read-write messages exist for local round trips only.
    #[error("read-write messages cannot be sent")]
    NotSendable,

    /// Deflate or inflate failed.
    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    /// The requested byte range does not fit the received buffer.
    #[error("byte range {start}..{end} outside buffer of {len} bytes")]
    InvalidByteRange { start: usize, end: usize, len: usize },

    /// The packet header carried bits this protocol does not define.
    #[error("unknown packet header bits {0:#04x}")]
    UnknownHeader(u8),

    /// The connection-initialization step byte is not a known step.
    #[error("unknown connection initialization step {0}")]
    UnknownStep(u8),

    /// The message is well-formed bits but breaks a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
