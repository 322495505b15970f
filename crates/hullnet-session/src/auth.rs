//! Identity hooks for both ends of the handshake.
//!
//! Hullnet doesn't talk to an identity service itself. Instead it defines
//! two traits:
//!
//! - [`CredentialProvider`] (client side) hands out an opaque ticket and
//!   the account id to send with it.
//! - [`IdentityVerifier`] (server side) decides whether a received ticket
//!   is acceptable.
//!
//! Both are injected into the peers as plain values, so tests can pass
//! fakes and production can pass a wrapper around the real service.

use hullnet_protocol::TicketAndVersion;

use crate::SessionError;

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// An identity ticket issued by a [`CredentialProvider`].
///
/// The `handle` is how the provider recognises the ticket again when it is
/// cancelled. The `data` is sent to the server verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTicket {
    handle: u32,
    data: Vec<u8>,
}

impl AuthTicket {
    pub fn new(handle: u32, data: Vec<u8>) -> Self {
        Self { handle, data }
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Source of the client's identity.
///
/// # Example
///
/// ```rust
/// use hullnet_session::{AuthTicket, CredentialProvider, SessionError};
///
/// /// Reads a ticket that a launcher wrote to an environment variable.
/// struct LauncherCredentials {
///     account_id: u64,
/// }
///
/// impl CredentialProvider for LauncherCredentials {
///     fn auth_ticket(&mut self) -> Result<AuthTicket, SessionError> {
///         let ticket = std::env::var("HULLNET_TICKET")
///             .map_err(|e| SessionError::MissingCredential(e.to_string()))?;
///         Ok(AuthTicket::new(1, ticket.into_bytes()))
///     }
///
///     fn account_id(&self) -> u64 {
///         self.account_id
///     }
///
///     fn cancel_ticket(&mut self, _ticket: AuthTicket) {}
/// }
/// ```
pub trait CredentialProvider: Send {
    /// Issues a ticket for one connection attempt.
    ///
    /// # Errors
    /// [`SessionError::MissingCredential`] when no ticket can be obtained.
    fn auth_ticket(&mut self) -> Result<AuthTicket, SessionError>;

    /// The account the tickets belong to.
    fn account_id(&self) -> u64;

    /// Releases a ticket once the connection it was issued for is over.
    fn cancel_ticket(&mut self, ticket: AuthTicket);
}

/// A [`CredentialProvider`] with a fixed ticket, for development and tests.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    account_id: u64,
    ticket: Option<Vec<u8>>,
    next_handle: u32,
    outstanding: Vec<u32>,
}

impl StaticCredentials {
    pub fn new(account_id: u64, ticket: impl Into<Vec<u8>>) -> Self {
        Self {
            account_id,
            ticket: Some(ticket.into()),
            next_handle: 1,
            outstanding: Vec::new(),
        }
    }

    /// A provider that never has a ticket to give.
    pub fn unavailable(account_id: u64) -> Self {
        Self {
            ticket: None,
            ..Self::new(account_id, Vec::new())
        }
    }

    /// Handles of tickets issued and not yet cancelled.
    pub fn outstanding_tickets(&self) -> &[u32] {
        &self.outstanding
    }
}

impl CredentialProvider for StaticCredentials {
    fn auth_ticket(&mut self) -> Result<AuthTicket, SessionError> {
        let data = self
            .ticket
            .clone()
            .ok_or_else(|| SessionError::MissingCredential("no ticket configured".into()))?;
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1);
        self.outstanding.push(handle);
        Ok(AuthTicket::new(handle, data))
    }

    fn account_id(&self) -> u64 {
        self.account_id
    }

    fn cancel_ticket(&mut self, ticket: AuthTicket) {
        self.outstanding.retain(|&h| h != ticket.handle());
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Decides whether a client's identity ticket is acceptable.
pub trait IdentityVerifier: Send {
    /// # Errors
    /// [`SessionError::AuthFailed`] with a reason the client will see.
    fn verify(&mut self, ticket: &TicketAndVersion) -> Result<(), SessionError>;
}

/// Accepts every ticket. Only for development and LAN play.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl IdentityVerifier for AcceptAll {
    fn verify(&mut self, _ticket: &TicketAndVersion) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Closures work as verifiers too.
impl<F> IdentityVerifier for F
where
    F: FnMut(&TicketAndVersion) -> Result<(), SessionError> + Send,
{
    fn verify(&mut self, ticket: &TicketAndVersion) -> Result<(), SessionError> {
        self(ticket)
    }
}
