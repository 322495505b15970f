//! Callback traits: the only way a peer reports anything to its owner.
//!
//! Every method has an empty default body, so a handler implements only
//! the events it cares about. Callbacks run synchronously inside
//! `update()`, `send_password()` or `close()`, on the caller's thread.
//!
//! A callback can't reach back into the peer (the peer is mutably
//! borrowed while it runs). Record what you need and act on it after
//! `update()` returns:
//!
//! ```rust
//! use hullnet::ClientHandler;
//!
//! #[derive(Default)]
//! struct Prompt {
//!     password_wanted: bool,
//! }
//!
//! impl ClientHandler for Prompt {
//!     fn on_request_password(&mut self, _salt: i32, _retries: i32) {
//!         self.password_wanted = true;
//!     }
//! }
//! ```

use hullnet_protocol::ReadOnlyMessage;
use hullnet_transport::Connection;

/// Events raised by a [`ClientPeer`](crate::ClientPeer).
pub trait ClientHandler {
    /// In-game data arrived from the server.
    fn on_message_received(&mut self, _message: &mut ReadOnlyMessage) {}

    /// The server wants a password. `retries` is 0 for a fresh challenge
    /// and counts failed attempts after that.
    fn on_request_password(&mut self, _salt: i32, _retries: i32) {}

    /// The handshake finished. Fires at most once per session.
    fn on_initialization_complete(&mut self) {}

    /// The session ended. `reason` is never empty. Fires exactly once
    /// per started session.
    fn on_disconnect(&mut self, _reason: &str) {}
}

/// Events raised by a [`ServerPeer`](crate::ServerPeer).
pub trait ServerHandler {
    /// In-game data arrived from an admitted client.
    fn on_message_received(&mut self, _connection: &Connection, _message: &mut ReadOnlyMessage) {}

    /// A client finished the handshake. `connection` carries its account id.
    fn on_initialization_complete(&mut self, _connection: &Connection) {}

    /// The client holding the server's owner key was admitted. Fires right
    /// after that client's `on_initialization_complete`, and only while no
    /// other owner is connected.
    fn on_owner_determined(&mut self, _connection: &Connection) {}

    /// An admitted client left or was removed.
    fn on_disconnect(&mut self, _connection: &Connection, _reason: &str) {}

    /// The server closed.
    fn on_shutdown(&mut self) {}
}

impl ClientHandler for () {}

impl ServerHandler for () {}
