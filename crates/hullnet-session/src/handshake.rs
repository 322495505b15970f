//! Connection-initialization state machines.
//!
//! Both machines are pure: they take decoded step messages in and hand
//! back what the peer should do next. No I/O happens here, which keeps
//! every ordering rule testable without a transport.
//!
//! # Ordering
//!
//! The steps only ever move forward:
//!
//! ```text
//!   SteamTicketAndVersion ──▶ Password ──▶ Complete
//!            │                               ▲
//!            └───────(no password set)───────┘
//! ```
//!
//! A step that doesn't fit the current state is a duplicate or a
//! late retransmission. It is dropped without complaint.

use hullnet_protocol::{
    ClientInitMessage, ContentPackageInfo, PasswordChallenge, PasswordResponse, ServerInitMessage,
    TicketAndVersion,
};
use rand::Rng;

use crate::password::{ServerPassword, salted_password_hash};
use crate::{IdentityVerifier, SessionError};

/// Where a connection is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeState {
    SteamTicketAndVersion,
    Password,
    Complete,
}

// ===========================================================================
// Client
// ===========================================================================

/// What the client peer should do after feeding in a server step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send this step to the server.
    Send(ClientInitMessage),
    /// Ask the user for the password.
    RequestPassword { salt: i32, retries: i32 },
    /// The handshake just finished.
    Complete,
}

/// The client's side of the handshake.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    state: HandshakeState,
    ticket: TicketAndVersion,
    salt: Option<i32>,
}

impl ClientHandshake {
    /// Starts a handshake that will identify with `ticket`.
    pub fn new(ticket: TicketAndVersion) -> Self {
        Self {
            state: HandshakeState::SteamTicketAndVersion,
            ticket,
            salt: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == HandshakeState::Complete
    }

    /// The opening step, sent once the transport reports the connection up.
    pub fn on_connected(&self) -> Option<ClientInitMessage> {
        (self.state == HandshakeState::SteamTicketAndVersion)
            .then(|| ClientInitMessage::TicketAndVersion(self.ticket.clone()))
    }

    /// Feeds in one step from the server.
    pub fn on_server_step(&mut self, step: ServerInitMessage) -> Option<ClientAction> {
        match step {
            ServerInitMessage::RequestTicket => self
                .on_connected()
                .map(ClientAction::Send),

            ServerInitMessage::Password(challenge) => {
                if self.state == HandshakeState::Complete {
                    return None;
                }
                match challenge {
                    PasswordChallenge::Salt(salt) => {
                        self.advance(HandshakeState::Password);
                        self.salt = Some(salt);
                        Some(ClientAction::RequestPassword { salt, retries: 0 })
                    }
                    PasswordChallenge::Retry(retries) => {
                        // A retry count only means something against a salt we hold.
                        let salt = self.salt?;
                        Some(ClientAction::RequestPassword { salt, retries })
                    }
                }
            }

            ServerInitMessage::Success => self.complete().then_some(ClientAction::Complete),
        }
    }

    /// Notes that in-game data arrived. Returns `true` if that finished the
    /// handshake, which happens when the server skips the explicit
    /// `Success` step.
    pub fn on_game_data(&mut self) -> bool {
        self.complete()
    }

    /// The password step for `password`, or `None` outside the password
    /// state.
    pub fn password_response(&self, password: &str) -> Option<ClientInitMessage> {
        if self.state != HandshakeState::Password {
            return None;
        }
        let salt = self.salt?;
        Some(ClientInitMessage::Password(PasswordResponse {
            salted_hash: salted_password_hash(password, salt),
        }))
    }

    fn advance(&mut self, next: HandshakeState) {
        if next > self.state {
            tracing::debug!(from = ?self.state, to = ?next, "client handshake advanced");
            self.state = next;
        }
    }

    fn complete(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.advance(HandshakeState::Complete);
        true
    }
}

// ===========================================================================
// Server
// ===========================================================================

/// The server's admission rules, shared by every connection's handshake.
#[derive(Debug, Clone)]
pub struct HandshakePolicy {
    /// Clients must report exactly this version.
    pub version: String,
    /// When set, clients must answer a salted password challenge.
    pub password: Option<ServerPassword>,
    /// Wrong answers allowed before the client is turned away.
    pub max_password_attempts: u32,
    /// Packages every client must have, with matching hashes.
    pub required_packages: Vec<ContentPackageInfo>,
}

impl HandshakePolicy {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            password: None,
            max_password_attempts: 3,
            required_packages: Vec::new(),
        }
    }

    fn check_ticket(&self, ticket: &TicketAndVersion) -> Result<(), SessionError> {
        if ticket.version != self.version {
            return Err(SessionError::VersionMismatch {
                server: self.version.clone(),
                client: ticket.version.clone(),
            });
        }
        if let Some(missing) = self
            .required_packages
            .iter()
            .find(|&required| !ticket.content_packages.contains(required))
        {
            return Err(SessionError::ContentMismatch {
                name: missing.name.clone(),
                hash: missing.hash.clone(),
            });
        }
        Ok(())
    }
}

/// Who a client turned out to be, once its ticket was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub name: String,
    pub account_id: u64,
    /// The owner key the client presented, if any.
    pub owner_key: Option<i32>,
}

/// What the server peer should do after feeding in a client step.
#[derive(Debug)]
pub enum ServerAction {
    /// Send this step to the client.
    Send(ServerInitMessage),
    /// Turn the client away. The error text is the reason it gets.
    Reject(SessionError),
    /// Admit the client.
    Complete(ClientIdentity),
}

/// One connection's side of the handshake, as seen by the server.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    state: HandshakeState,
    identity: Option<ClientIdentity>,
    salt: i32,
    failed_attempts: u32,
}

impl ServerHandshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::SteamTicketAndVersion,
            identity: None,
            salt: 0,
            failed_attempts: 0,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == HandshakeState::Complete
    }

    pub fn identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }

    /// The prompt sent when the connection opens.
    pub fn request(&self) -> Option<ServerInitMessage> {
        (self.state == HandshakeState::SteamTicketAndVersion).then_some(ServerInitMessage::RequestTicket)
    }

    /// Feeds in one step from the client.
    pub fn on_client_step(
        &mut self,
        step: ClientInitMessage,
        policy: &HandshakePolicy,
        verifier: &mut dyn IdentityVerifier,
    ) -> Option<ServerAction> {
        match (self.state, step) {
            (HandshakeState::SteamTicketAndVersion, ClientInitMessage::TicketAndVersion(ticket)) => {
                Some(self.on_ticket(ticket, policy, verifier))
            }
            (HandshakeState::Password, ClientInitMessage::Password(response)) => {
                Some(self.on_password(&response, policy))
            }
            (state, step) => {
                tracing::trace!(?state, step = %step.step(), "ignoring out-of-order handshake step");
                None
            }
        }
    }

    fn on_ticket(
        &mut self,
        ticket: TicketAndVersion,
        policy: &HandshakePolicy,
        verifier: &mut dyn IdentityVerifier,
    ) -> ServerAction {
        if let Err(e) = policy
            .check_ticket(&ticket)
            .and_then(|()| verifier.verify(&ticket))
        {
            return ServerAction::Reject(e);
        }

        let identity = ClientIdentity {
            name: ticket.name,
            account_id: ticket.account_id,
            owner_key: ticket.owner_key,
        };
        self.identity = Some(identity.clone());

        if policy.password.is_none() {
            self.state = HandshakeState::Complete;
            return ServerAction::Complete(identity);
        }

        self.salt = rand::rng().random();
        self.state = HandshakeState::Password;
        ServerAction::Send(ServerInitMessage::Password(PasswordChallenge::Salt(self.salt)))
    }

    fn on_password(&mut self, response: &PasswordResponse, policy: &HandshakePolicy) -> ServerAction {
        let accepted = policy
            .password
            .as_ref()
            .is_none_or(|password| password.verify(&response.salted_hash, self.salt));

        if accepted {
            self.state = HandshakeState::Complete;
            return match self.identity.clone() {
                Some(identity) => ServerAction::Complete(identity),
                None => ServerAction::Reject(SessionError::AuthFailed("no identity on record".into())),
            };
        }

        self.failed_attempts += 1;
        if self.failed_attempts >= policy.max_password_attempts {
            return ServerAction::Reject(SessionError::TooManyPasswordAttempts(self.failed_attempts));
        }
        ServerAction::Send(ServerInitMessage::Password(PasswordChallenge::Retry(
            self.failed_attempts as i32,
        )))
    }
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}
