//! The client-role peer.
//!
//! A [`ClientPeer`] owns one transport, one credential provider and one
//! handler. It never spawns anything: the owner calls
//! [`update`](ClientPeer::update) once per game tick and every callback
//! fires from inside that call.
//!
//! ```text
//!   Idle ──start()──▶ Running ──close() / remote disconnect──▶ Closed
//!    │                  │ ▲
//!    └─close(): no-op   └─┘ start(): no-op
//! ```

use std::net::SocketAddr;

use hullnet_protocol::{
    ClientInitMessage, DeliveryMethod, IncomingPacket, MTU, ReadOnlyMessage, ServerInitMessage,
    TicketAndVersion, WriteMessage, encode_data_packet, encode_disconnect_packet,
};
use hullnet_session::{AuthTicket, ClientAction, ClientHandshake, CredentialProvider, HandshakeState};
use hullnet_transport::{Connection, ConnectionStatus, Transport, TransportEvent};

use crate::{ClientConfig, ClientHandler, HullnetError, DEFAULT_CLOSE_REASON};

/// The live part of a started client.
struct Session {
    server: Connection,
    ticket: AuthTicket,
    handshake: ClientHandshake,
}

enum PeerState {
    Idle,
    Running(Box<Session>),
    Closed,
}

/// The client side of a connection to one server.
pub struct ClientPeer<T, C, H> {
    transport: T,
    credentials: C,
    handler: H,
    config: ClientConfig,
    state: PeerState,
}

impl<T, C, H> ClientPeer<T, C, H>
where
    T: Transport,
    C: CredentialProvider,
    H: ClientHandler,
{
    pub fn new(transport: T, credentials: C, handler: H, config: ClientConfig) -> Self {
        Self {
            transport,
            credentials,
            handler,
            config,
            state: PeerState::Idle,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Obtains an identity ticket and starts connecting to `endpoint`.
    ///
    /// Does nothing if the peer is already running. The handshake itself
    /// happens over the following [`update`](Self::update) calls.
    ///
    /// # Errors
    /// - [`HullnetError::Session`] if no ticket could be obtained. Nothing
    ///   is connected in that case.
    /// - [`HullnetError::Transport`] if the transport refuses to connect.
    /// - [`HullnetError::Closed`] after [`close`](Self::close).
    pub fn start(&mut self, endpoint: SocketAddr) -> Result<(), HullnetError> {
        match self.state {
            PeerState::Running(_) => {
                tracing::debug!(%endpoint, "client already started");
                return Ok(());
            }
            PeerState::Closed => return Err(HullnetError::Closed),
            PeerState::Idle => {}
        }

        let ticket = self.credentials.auth_ticket().inspect_err(|e| {
            tracing::warn!(error = %e, "cannot start without an identity ticket");
        })?;

        let server = match self.transport.connect(endpoint) {
            Ok(server) => server,
            Err(e) => {
                self.credentials.cancel_ticket(ticket);
                return Err(e.into());
            }
        };

        let handshake = ClientHandshake::new(TicketAndVersion {
            name: self.config.name.clone(),
            account_id: self.credentials.account_id(),
            ticket: ticket.data().to_vec(),
            version: self.config.version.clone(),
            content_packages: self.config.content_package_infos(),
            owner_key: self.config.owner_key,
        });

        tracing::info!(server = %server, name = %self.config.name, "client connecting");
        self.state = PeerState::Running(Box::new(Session {
            server,
            ticket,
            handshake,
        }));
        Ok(())
    }

    /// Drains every pending transport event and dispatches it.
    pub fn update(&mut self) {
        while let PeerState::Running(session) = &self.state {
            let server_id = session.server.id();
            let Some(event) = self.transport.poll_event() else {
                break;
            };

            match event {
                TransportEvent::Data { conn, bytes } if conn == server_id => {
                    self.handle_datagram(&bytes);
                }
                TransportEvent::StatusChanged { conn, status } if conn == server_id => match status {
                    ConnectionStatus::Connected => {
                        tracing::debug!(%conn, "transport connected, sending ticket");
                        if let Some(step) = self.session_mut().and_then(|s| s.handshake.on_connected()) {
                            self.send_step(step);
                        }
                    }
                    ConnectionStatus::Disconnected { reason } => self.close(&reason),
                },
                other => tracing::trace!(?other, "ignoring event for unknown connection"),
            }
        }
    }

    /// Sends application data to the server.
    ///
    /// Does nothing before [`start`](Self::start) or after
    /// [`close`](Self::close).
    ///
    /// # Errors
    /// - [`HullnetError::Protocol`] for a read-write message or one over
    ///   the size cap.
    /// - [`HullnetError::Transport`] if the transport rejects the datagram.
    pub fn send(&mut self, message: &impl WriteMessage, delivery: DeliveryMethod) -> Result<(), HullnetError> {
        let PeerState::Running(session) = &self.state else {
            return Ok(());
        };
        let server_id = session.server.id();

        let packet = encode_data_packet(&message.prepare_for_sending()?)?;
        if delivery == DeliveryMethod::Unreliable && packet.len() > MTU {
            tracing::warn!(len = packet.len(), mtu = MTU, "unreliable datagram exceeds MTU");
        }
        self.transport.send(server_id, &packet, delivery.native())?;
        Ok(())
    }

    /// Answers the server's password challenge.
    ///
    /// Does nothing unless the handshake is waiting for a password.
    pub fn send_password(&mut self, password: &str) {
        if let Some(step) = self.session_mut().and_then(|s| s.handshake.password_response(password)) {
            tracing::debug!("sending password");
            self.send_step(step);
        }
    }

    /// Ends the session: tells the server, shuts the transport down,
    /// releases the ticket and fires `on_disconnect` with `reason`.
    ///
    /// Only the first call on a running peer does anything. An empty
    /// `reason` is reported as "Disconnected".
    pub fn close(&mut self, reason: &str) {
        if !self.is_started() {
            return;
        }
        let PeerState::Running(session) = std::mem::replace(&mut self.state, PeerState::Closed) else {
            return;
        };
        let reason = if reason.is_empty() { DEFAULT_CLOSE_REASON } else { reason };

        let packet = encode_disconnect_packet(reason);
        if let Err(e) = self
            .transport
            .send(session.server.id(), &packet, DeliveryMethod::Reliable.native())
        {
            tracing::debug!(server = %session.server, error = %e, "disconnect datagram not sent");
        }
        self.transport.shutdown(reason);
        self.credentials.cancel_ticket(session.ticket);

        tracing::info!(server = %session.server, %reason, "client closed");
        self.handler.on_disconnect(reason);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn is_started(&self) -> bool {
        matches!(self.state, PeerState::Running(_))
    }

    /// Handshake progress, while running.
    pub fn handshake_state(&self) -> Option<HandshakeState> {
        match &self.state {
            PeerState::Running(session) => Some(session.handshake.state()),
            _ => None,
        }
    }

    /// The server connection, while running.
    pub fn server_connection(&self) -> Option<&Connection> {
        match &self.state {
            PeerState::Running(session) => Some(&session.server),
            _ => None,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn session_mut(&mut self) -> Option<&mut Session> {
        match &mut self.state {
            PeerState::Running(session) => Some(session),
            _ => None,
        }
    }

    fn handle_datagram(&mut self, bytes: &[u8]) {
        let Some(session) = self.session_mut() else {
            return;
        };
        let server_id = session.server.id();

        // A bad datagram is dropped here and never reaches the caller.
        let packet = match IncomingPacket::decode(bytes, Some(server_id)) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(conn = %server_id, error = %e, "dropping malformed datagram");
                return;
            }
        };

        match packet {
            IncomingPacket::Initialization { step, mut body } => {
                let message = match ServerInitMessage::read_body(step, &mut body) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::debug!(conn = %server_id, %step, error = %e, "dropping malformed handshake step");
                        return;
                    }
                };
                let action = session.handshake.on_server_step(message);
                self.apply(action);
            }
            IncomingPacket::Data(mut message) => {
                if session.handshake.on_game_data() {
                    self.initialization_complete();
                }
                self.deliver(&mut message);
            }
            IncomingPacket::Disconnect { reason } => self.close(&reason),
        }
    }

    fn apply(&mut self, action: Option<ClientAction>) {
        match action {
            Some(ClientAction::Send(step)) => self.send_step(step),
            Some(ClientAction::RequestPassword { salt, retries }) => {
                tracing::debug!(retries, "server requested password");
                self.handler.on_request_password(salt, retries);
            }
            Some(ClientAction::Complete) => self.initialization_complete(),
            None => tracing::trace!("ignoring out-of-order handshake step"),
        }
    }

    fn initialization_complete(&mut self) {
        tracing::info!("client handshake complete");
        self.handler.on_initialization_complete();
    }

    fn deliver(&mut self, message: &mut ReadOnlyMessage) {
        self.handler.on_message_received(message);
    }

    /// Sends a handshake step. A transport failure here ends the session.
    fn send_step(&mut self, step: ClientInitMessage) {
        let Some(session) = self.session_mut() else {
            return;
        };
        let server_id = session.server.id();

        let result = step
            .to_packet()
            .map_err(HullnetError::from)
            .and_then(|packet| {
                self.transport
                    .send(server_id, &packet, DeliveryMethod::Reliable.native())
                    .map_err(HullnetError::from)
            });
        if let Err(e) = result {
            tracing::warn!(conn = %server_id, step = %step.step(), error = %e, "failed to send handshake step");
            self.close(&format!("Failed to send {} step: {e}", step.step()));
        }
    }
}
