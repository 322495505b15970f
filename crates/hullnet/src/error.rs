//! Unified error type for Hullnet.

use hullnet_protocol::ProtocolError;
use hullnet_session::SessionError;
use hullnet_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `hullnet` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HullnetError {
    /// A transport-level error (connect, send, shutdown).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, message too large).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (missing credential, rejected identity).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The peer was closed and cannot be started again.
    #[error("peer is closed")]
    Closed,
}
