//! Connection-initialization wire types.
//!
//! The handshake is a short exchange of step messages, each tagged with a
//! [`ConnectionInitialization`] value. Client and server send different
//! payloads under the same step tag, so each direction gets its own enum:
//! [`ClientInitMessage`] and [`ServerInitMessage`].
//!
//! ```text
//! client                                    server
//!   │ ── SteamTicketAndVersion(ticket…) ──▶   │
//!   │ ◀── Password(salt) ──────────────────   │   only if a password is set
//!   │ ── Password(salted hash) ───────────▶   │
//!   │ ◀── Password(retries) ───────────────   │   wrong password, try again
//!   │ ◀── Success ─────────────────────────   │
//! ```

use std::fmt;

use crate::message::{ReadMessage, WriteMessage, WriteOnlyMessage};
use crate::packet::encode_init_packet;
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Step tag
// ---------------------------------------------------------------------------

/// Handshake step carried in byte 1 of an initialization datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionInitialization {
    /// The server accepted the client. No payload.
    Success = 0,
    /// Identity ticket and version exchange.
    SteamTicketAndVersion = 1,
    /// Password challenge and response.
    Password = 2,
}

impl ConnectionInitialization {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ConnectionInitialization {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::SteamTicketAndVersion),
            2 => Ok(Self::Password),
            other => Err(ProtocolError::UnknownStep(other)),
        }
    }
}

impl fmt::Display for ConnectionInitialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "Success",
            Self::SteamTicketAndVersion => "SteamTicketAndVersion",
            Self::Password => "Password",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A content package the client has enabled, identified by name and hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentPackageInfo {
    pub name: String,
    pub hash: String,
}

impl ContentPackageInfo {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
        }
    }
}

/// The client's opening step: who it is and what it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketAndVersion {
    pub name: String,
    pub account_id: u64,
    /// Opaque identity ticket from the credential provider.
    pub ticket: Vec<u8>,
    pub version: String,
    pub content_packages: Vec<ContentPackageInfo>,
    /// Key handed to the hosting player's client by the process that
    /// launched the server. Marks that client as the owner.
    pub owner_key: Option<i32>,
}

/// The server's password step.
///
/// One bit on the wire tells the two cases apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordChallenge {
    /// A fresh salt for the client to hash with.
    Salt(i32),
    /// The previous attempt was wrong; this many attempts have failed.
    Retry(i32),
}

/// The client's salted password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResponse {
    pub salted_hash: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// A handshake step sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInitMessage {
    TicketAndVersion(TicketAndVersion),
    Password(PasswordResponse),
}

impl ClientInitMessage {
    pub fn step(&self) -> ConnectionInitialization {
        match self {
            Self::TicketAndVersion(_) => ConnectionInitialization::SteamTicketAndVersion,
            Self::Password(_) => ConnectionInitialization::Password,
        }
    }

    /// Writes the step-specific fields (not the step tag).
    pub fn write_body(&self, msg: &mut impl WriteMessage) -> Result<(), ProtocolError> {
        match self {
            Self::TicketAndVersion(t) => {
                let ticket_len = u16::try_from(t.ticket.len()).map_err(|_| {
                    ProtocolError::InvalidMessage(format!(
                        "identity ticket of {} bytes does not fit a 16-bit length",
                        t.ticket.len()
                    ))
                })?;
                msg.write_string(&t.name);
                msg.write_u64(t.account_id);
                msg.write_u16(ticket_len);
                msg.write_bytes(&t.ticket);
                msg.write_string(&t.version);
                msg.write_var_u32(t.content_packages.len() as u32);
                for package in &t.content_packages {
                    msg.write_string(&package.name);
                    msg.write_string(&package.hash);
                }
                msg.write_bool(t.owner_key.is_some());
                if let Some(key) = t.owner_key {
                    msg.write_i32(key);
                }
            }
            Self::Password(p) => {
                let len = u8::try_from(p.salted_hash.len()).map_err(|_| {
                    ProtocolError::InvalidMessage("password hash longer than 255 bytes".into())
                })?;
                msg.write_u8(len);
                msg.write_bytes(&p.salted_hash);
            }
        }
        Ok(())
    }

    /// Reads the fields for `step` from a server-side initialization body.
    pub fn read_body(
        step: ConnectionInitialization,
        msg: &mut impl ReadMessage,
    ) -> Result<Self, ProtocolError> {
        match step {
            ConnectionInitialization::SteamTicketAndVersion => {
                let name = msg.read_string()?;
                let account_id = msg.read_u64()?;
                let ticket_len = msg.read_u16()? as usize;
                let ticket = msg.read_bytes(ticket_len)?;
                let version = msg.read_string()?;
                let count = msg.read_var_u32()? as usize;
                // Two empty strings take 16 bits, so a count the body can't
                // hold is rejected before allocating for it.
                let remaining = msg.length_bits().saturating_sub(msg.bit_position());
                if count > remaining / 16 {
                    return Err(ProtocolError::InvalidMessage(format!(
                        "{count} content packages declared in {remaining} bits"
                    )));
                }
                let mut content_packages = Vec::with_capacity(count);
                for _ in 0..count {
                    let name = msg.read_string()?;
                    let hash = msg.read_string()?;
                    content_packages.push(ContentPackageInfo { name, hash });
                }
                let owner_key = if msg.read_bool()? {
                    Some(msg.read_i32()?)
                } else {
                    None
                };
                Ok(Self::TicketAndVersion(TicketAndVersion {
                    name,
                    account_id,
                    ticket,
                    version,
                    content_packages,
                    owner_key,
                }))
            }
            ConnectionInitialization::Password => {
                let len = msg.read_u8()? as usize;
                let salted_hash = msg.read_bytes(len)?;
                Ok(Self::Password(PasswordResponse { salted_hash }))
            }
            ConnectionInitialization::Success => Err(ProtocolError::InvalidMessage(
                "clients do not send the Success step".into(),
            )),
        }
    }

    /// Encodes the full initialization datagram.
    pub fn to_packet(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut body = WriteOnlyMessage::new();
        self.write_body(&mut body)?;
        encode_init_packet(self.step(), &body)
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// A handshake step sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerInitMessage {
    /// Prompts the client to (re)send its ticket and version.
    RequestTicket,
    Password(PasswordChallenge),
    Success,
}

impl ServerInitMessage {
    pub fn step(&self) -> ConnectionInitialization {
        match self {
            Self::RequestTicket => ConnectionInitialization::SteamTicketAndVersion,
            Self::Password(_) => ConnectionInitialization::Password,
            Self::Success => ConnectionInitialization::Success,
        }
    }

    pub fn write_body(&self, msg: &mut impl WriteMessage) {
        if let Self::Password(challenge) = self {
            let (salt_present, value) = match *challenge {
                PasswordChallenge::Salt(salt) => (true, salt),
                PasswordChallenge::Retry(retries) => (false, retries),
            };
            msg.write_bool(salt_present);
            msg.write_pad_bits();
            msg.write_i32(value);
        }
    }

    pub fn read_body(
        step: ConnectionInitialization,
        msg: &mut impl ReadMessage,
    ) -> Result<Self, ProtocolError> {
        Ok(match step {
            ConnectionInitialization::SteamTicketAndVersion => Self::RequestTicket,
            ConnectionInitialization::Success => Self::Success,
            ConnectionInitialization::Password => {
                let salt_present = msg.read_bool()?;
                msg.read_pad_bits()?;
                let value = msg.read_i32()?;
                Self::Password(if salt_present {
                    PasswordChallenge::Salt(value)
                } else {
                    PasswordChallenge::Retry(value)
                })
            }
        })
    }

    pub fn to_packet(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut body = WriteOnlyMessage::new();
        self.write_body(&mut body);
        encode_init_packet(self.step(), &body)
    }
}
