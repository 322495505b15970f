//! The server-role peer.
//!
//! A [`ServerPeer`] wraps a listening transport. Every connection the
//! transport reports gets its own [`ServerHandshake`]; only connections
//! that finish it are "admitted" and see their data delivered to the
//! handler.
//!
//! Like the client, the server never spawns anything. The owner calls
//! [`update`](ServerPeer::update) once per tick.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use hullnet_protocol::{
    ClientInitMessage, DeliveryMethod, IncomingPacket, MTU, ProtocolError, ServerInitMessage,
    WriteMessage, encode_data_packet, encode_disconnect_packet,
};
use hullnet_session::{HandshakePolicy, IdentityVerifier, ServerAction, ServerHandshake};
use hullnet_transport::{Connection, ConnectionId, ConnectionStatus, Transport, TransportEvent};

use crate::{BanList, DEFAULT_CLOSE_REASON, HullnetError, ServerConfig, ServerHandler};

/// Reason sent to clients dropped for repeated malformed datagrams.
const MALFORMED_REASON: &str = "Too many malformed messages";

/// What the server knows about one connected endpoint.
struct RemoteClient {
    connection: Connection,
    handshake: ServerHandshake,
    malformed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeerState {
    Idle,
    Running,
    Closed,
}

/// The server side: accepts clients, runs their handshakes and routes
/// their data.
pub struct ServerPeer<T, V, H> {
    transport: T,
    verifier: V,
    handler: H,
    config: ServerConfig,
    policy: HandshakePolicy,
    state: PeerState,
    clients: HashMap<ConnectionId, RemoteClient>,
    bans: BanList,
    owner: Option<Connection>,
}

impl<T, V, H> ServerPeer<T, V, H>
where
    T: Transport,
    V: IdentityVerifier,
    H: ServerHandler,
{
    /// Wraps a transport that is already listening.
    pub fn new(transport: T, verifier: V, handler: H, config: ServerConfig) -> Self {
        let policy = config.handshake_policy();
        Self {
            transport,
            verifier,
            handler,
            config,
            policy,
            state: PeerState::Idle,
            clients: HashMap::new(),
            bans: BanList::new(),
            owner: None,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts accepting clients. Events queued before this are handled by
    /// the first [`update`](Self::update).
    ///
    /// # Errors
    /// [`HullnetError::Closed`] after [`close`](Self::close).
    pub fn start(&mut self) -> Result<(), HullnetError> {
        match self.state {
            PeerState::Closed => Err(HullnetError::Closed),
            PeerState::Running => Ok(()),
            PeerState::Idle => {
                self.state = PeerState::Running;
                tracing::info!(
                    version = %self.policy.version,
                    password = self.policy.password.is_some(),
                    "server started"
                );
                Ok(())
            }
        }
    }

    /// Drains every pending transport event and dispatches it.
    pub fn update(&mut self) {
        while self.state == PeerState::Running {
            let Some(event) = self.transport.poll_event() else {
                break;
            };
            match event {
                TransportEvent::Incoming(connection) => self.accept(connection),
                TransportEvent::Data { conn, bytes } => self.handle_datagram(conn, &bytes),
                TransportEvent::StatusChanged {
                    conn,
                    status: ConnectionStatus::Disconnected { reason },
                } => self.connection_lost(conn, &reason),
                TransportEvent::StatusChanged { .. } => {}
            }
        }
    }

    /// Sends application data to one client.
    ///
    /// Does nothing unless the server is running.
    ///
    /// # Errors
    /// - [`HullnetError::Protocol`] for a read-write message or one over
    ///   the size cap.
    /// - [`HullnetError::Transport`] if the connection is unknown or the
    ///   transport rejects the datagram.
    pub fn send(
        &mut self,
        message: &impl WriteMessage,
        connection: &Connection,
        delivery: DeliveryMethod,
    ) -> Result<(), HullnetError> {
        if self.state != PeerState::Running {
            return Ok(());
        }
        let packet = encode_data_packet(&message.prepare_for_sending()?)?;
        if delivery == DeliveryMethod::Unreliable && packet.len() > MTU {
            tracing::warn!(conn = %connection.id(), len = packet.len(), mtu = MTU, "unreliable datagram exceeds MTU");
        }
        self.transport.send(connection.id(), &packet, delivery.native())?;
        Ok(())
    }

    /// Removes a client, telling it why.
    pub fn disconnect(&mut self, connection: &Connection, reason: &str) {
        let reason = if reason.is_empty() { DEFAULT_CLOSE_REASON } else { reason };
        self.drop_client(connection.id(), reason);
    }

    /// Bans the client's IP address and removes every client connected
    /// from it. `None` bans forever.
    pub fn ban(&mut self, connection: &Connection, reason: &str, duration: Option<Duration>) {
        let ip = connection.ip();
        let reason = if reason.is_empty() { "Banned" } else { reason };
        self.bans.ban(ip, reason, duration);
        self.kick_address(ip, reason);
    }

    /// Lifts the ban on `ip`. Returns whether there was one.
    pub fn unban(&mut self, ip: IpAddr) -> bool {
        self.bans.unban(ip)
    }

    /// Disconnects every client, shuts the transport down and fires
    /// `on_shutdown`. Only the first call on a running server does
    /// anything.
    pub fn close(&mut self, reason: &str) {
        if self.state != PeerState::Running {
            return;
        }
        let reason = if reason.is_empty() { DEFAULT_CLOSE_REASON } else { reason };

        let ids: Vec<ConnectionId> = self.clients.keys().copied().collect();
        for id in ids {
            self.drop_client(id, reason);
        }
        self.transport.shutdown(reason);
        self.state = PeerState::Closed;

        tracing::info!(%reason, "server closed");
        self.handler.on_shutdown();
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn is_started(&self) -> bool {
        self.state == PeerState::Running
    }

    /// Admitted clients, in no particular order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.clients
            .values()
            .filter(|c| c.handshake.is_complete())
            .map(|c| &c.connection)
    }

    /// Connections still in the handshake.
    pub fn pending_count(&self) -> usize {
        self.clients.values().filter(|c| !c.handshake.is_complete()).count()
    }

    /// The admitted client that presented the configured owner key.
    pub fn owner_connection(&self) -> Option<&Connection> {
        self.owner.as_ref()
    }

    pub fn bans(&mut self) -> &mut BanList {
        &mut self.bans
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn accept(&mut self, connection: Connection) {
        let id = connection.id();
        if let Some(ban) = self.bans.lookup(connection.ip()) {
            let reason = format!("Banned: {}", ban.reason);
            tracing::info!(%connection, %reason, "refusing banned address");
            self.send_goodbye(id, &reason);
            self.transport.disconnect(id, &reason);
            return;
        }

        tracing::debug!(%connection, "connection opened, requesting ticket");
        let handshake = ServerHandshake::new();
        let request = handshake.request();
        self.clients.insert(
            id,
            RemoteClient {
                connection,
                handshake,
                malformed: 0,
            },
        );
        if let Some(step) = request {
            self.send_step(id, step);
        }
    }

    fn handle_datagram(&mut self, id: ConnectionId, bytes: &[u8]) {
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };

        let packet = match IncomingPacket::decode(bytes, Some(id)) {
            Ok(packet) => packet,
            Err(e) => return self.malformed(id, &e),
        };

        match packet {
            IncomingPacket::Initialization { step, mut body } => {
                let message = match ClientInitMessage::read_body(step, &mut body) {
                    Ok(message) => message,
                    Err(e) => return self.malformed(id, &e),
                };
                let action = client
                    .handshake
                    .on_client_step(message, &self.policy, &mut self.verifier);
                match action {
                    Some(ServerAction::Send(step)) => self.send_step(id, step),
                    Some(ServerAction::Reject(e)) => {
                        tracing::info!(conn = %id, reason = %e, "client rejected");
                        self.drop_client(id, &e.to_string());
                    }
                    Some(ServerAction::Complete(identity)) => {
                        client.connection = client.connection.with_account_id(identity.account_id);
                        let connection = client.connection.clone();
                        tracing::info!(%connection, name = %identity.name, "client admitted");
                        let is_owner = self.owner.is_none()
                            && self.config.owner_key.is_some()
                            && identity.owner_key == self.config.owner_key;
                        self.send_step(id, ServerInitMessage::Success);
                        self.handler.on_initialization_complete(&connection);
                        if is_owner && self.clients.contains_key(&id) {
                            tracing::info!(%connection, "owner connected");
                            self.owner = Some(connection.clone());
                            self.handler.on_owner_determined(&connection);
                        }
                    }
                    None => tracing::trace!(conn = %id, %step, "ignoring out-of-order handshake step"),
                }
            }
            IncomingPacket::Data(mut message) => {
                if !client.handshake.is_complete() {
                    tracing::debug!(conn = %id, "dropping data sent before the handshake finished");
                    return;
                }
                self.handler.on_message_received(&client.connection, &mut message);
            }
            IncomingPacket::Disconnect { reason } => {
                tracing::debug!(conn = %id, %reason, "client said goodbye");
                self.transport.disconnect(id, &reason);
                self.connection_lost(id, &reason);
            }
        }
    }

    fn malformed(&mut self, id: ConnectionId, error: &ProtocolError) {
        let Some(client) = self.clients.get_mut(&id) else {
            return;
        };
        client.malformed += 1;
        tracing::debug!(conn = %id, count = client.malformed, error = %error, "dropping malformed datagram");

        let limit = self.config.max_malformed_datagrams;
        if limit > 0 && client.malformed >= limit {
            tracing::info!(conn = %id, count = client.malformed, "too many malformed datagrams");
            self.drop_client(id, MALFORMED_REASON);
        }
    }

    /// The transport already closed this connection.
    fn connection_lost(&mut self, id: ConnectionId, reason: &str) {
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        let reason = if reason.is_empty() { DEFAULT_CLOSE_REASON } else { reason };
        self.forget_owner(id);
        tracing::info!(connection = %client.connection, %reason, "connection lost");
        if client.handshake.is_complete() {
            self.handler.on_disconnect(&client.connection, reason);
        }
    }

    /// Tells a client why, closes its connection and forgets it.
    fn drop_client(&mut self, id: ConnectionId, reason: &str) {
        let Some(client) = self.clients.remove(&id) else {
            return;
        };
        self.send_goodbye(id, reason);
        self.transport.disconnect(id, reason);
        self.forget_owner(id);

        tracing::info!(connection = %client.connection, %reason, "client disconnected");
        if client.handshake.is_complete() {
            self.handler.on_disconnect(&client.connection, reason);
        }
    }

    /// Sends the disconnect datagram. The link is closed right after, so a
    /// failure is only logged.
    fn send_goodbye(&mut self, id: ConnectionId, reason: &str) {
        let packet = encode_disconnect_packet(reason);
        if let Err(e) = self.transport.send(id, &packet, DeliveryMethod::Reliable.native()) {
            tracing::debug!(conn = %id, error = %e, "disconnect datagram not sent");
        }
    }

    fn forget_owner(&mut self, id: ConnectionId) {
        if self.owner.as_ref().is_some_and(|owner| owner.id() == id) {
            self.owner = None;
        }
    }

    fn kick_address(&mut self, ip: IpAddr, reason: &str) {
        let ids: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|c| c.connection.ip() == ip)
            .map(|c| c.connection.id())
            .collect();
        for id in ids {
            self.drop_client(id, reason);
        }
    }

    /// Sends a handshake step. A transport failure drops the client.
    fn send_step(&mut self, id: ConnectionId, step: ServerInitMessage) {
        let result = step
            .to_packet()
            .map_err(HullnetError::from)
            .and_then(|packet| {
                self.transport
                    .send(id, &packet, DeliveryMethod::Reliable.native())
                    .map_err(HullnetError::from)
            });
        if let Err(e) = result {
            tracing::warn!(conn = %id, step = %step.step(), error = %e, "failed to send handshake step");
            let reason = format!("Failed to send {} step: {e}", step.step());
            self.transport.disconnect(id, &reason);
            self.connection_lost(id, &reason);
        }
    }
}
