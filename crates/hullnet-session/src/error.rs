//! Error types for the session layer.

/// Errors raised while establishing who a remote endpoint is.
///
/// On the server, every variant except [`SessionError::MissingCredential`]
/// ends a handshake: its `Display` text is what the client is told.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The credential provider could not produce an identity ticket.
    /// The client must not connect without one.
    #[error("could not obtain an authentication ticket: {0}")]
    MissingCredential(String),

    /// The identity ticket was rejected by the
    /// [`IdentityVerifier`](crate::IdentityVerifier).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Client and server run different game versions.
    #[error("version mismatch: server runs {server}, client runs {client}")]
    VersionMismatch { server: String, client: String },

    /// A content package the server requires is missing on the client, or
    /// its hash differs.
    #[error("content package mismatch: {name} ({hash})")]
    ContentMismatch { name: String, hash: String },

    /// The client used up its password attempts.
    #[error("too many incorrect password attempts ({0})")]
    TooManyPasswordAttempts(u32),
}
