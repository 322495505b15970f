//! Connection initialization for Hullnet.
//!
//! This crate decides who is on the other end of a connection before any
//! game data flows:
//!
//! 1. **Identity**: [`CredentialProvider`] issues the client's ticket,
//!    [`IdentityVerifier`] judges it on the server.
//! 2. **Handshake**: [`ClientHandshake`] and [`ServerHandshake`] walk the
//!    ticket, password and completion steps in order.
//! 3. **Passwords**: [`ServerPassword`] and the salted hashing both sides
//!    agree on.
//!
//! # How it fits in the stack
//!
//! ```text
//! Peer Layer (above)  ← sends and receives the steps, fires callbacks
//!     ↕
//! Session Layer (this crate)  ← decides what each step means
//!     ↕
//! Protocol Layer (below)  ← step wire types
//! ```

mod auth;
mod error;
mod handshake;
pub mod password;

pub use auth::{AcceptAll, AuthTicket, CredentialProvider, IdentityVerifier, StaticCredentials};
pub use error::SessionError;
pub use handshake::{
    ClientAction, ClientHandshake, ClientIdentity, HandshakePolicy, HandshakeState, ServerAction,
    ServerHandshake,
};
pub use password::ServerPassword;
