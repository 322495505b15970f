//! Peer configuration.
//!
//! Both structs deserialize from JSON with every field optional, so a
//! config file only has to name what it changes:
//!
//! ```rust
//! use hullnet::ServerConfig;
//!
//! let config = ServerConfig::from_json(r#"{ "password": "hunter2" }"#).unwrap();
//! assert_eq!(config.max_password_attempts, 3);
//! ```

use hullnet_protocol::ContentPackageInfo;
use hullnet_session::{HandshakePolicy, ServerPassword};
use serde::{Deserialize, Serialize};

use crate::HullnetError;

/// Version reported and required when a config doesn't set one.
pub const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Content packages
// ---------------------------------------------------------------------------

/// A content package as it appears in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPackageEntry {
    pub name: String,
    pub hash: String,
}

impl From<&ContentPackageEntry> for ContentPackageInfo {
    fn from(entry: &ContentPackageEntry) -> Self {
        ContentPackageInfo::new(entry.name.clone(), entry.hash.clone())
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// What a client says about itself during the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Display name shown to the server and other players.
    pub name: String,

    /// Game version; must match the server's exactly.
    pub version: String,

    /// Enabled packages that affect multiplayer compatibility.
    pub content_packages: Vec<ContentPackageEntry>,

    /// Set only on the hosting player's client, to the key the server
    /// was launched with.
    pub owner_key: Option<i32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "Player".to_string(),
            version: DEFAULT_VERSION.to_string(),
            content_packages: Vec::new(),
            owner_key: None,
        }
    }
}

impl ClientConfig {
    /// Parses a config from JSON text.
    ///
    /// # Errors
    /// [`HullnetError::Config`] if the text isn't valid JSON or a field
    /// has the wrong type.
    pub fn from_json(text: &str) -> Result<Self, HullnetError> {
        Ok(serde_json::from_str(text)?)
    }

    pub(crate) fn content_package_infos(&self) -> Vec<ContentPackageInfo> {
        self.content_packages.iter().map(Into::into).collect()
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Admission rules and limits for a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Clients reporting any other version are turned away.
    pub version: String,

    /// When set, clients must answer a salted password challenge.
    pub password: Option<String>,

    /// Wrong passwords allowed before the client is disconnected.
    ///
    /// Default: 3.
    pub max_password_attempts: u32,

    /// Packages every client must have enabled, with matching hashes.
    pub required_packages: Vec<ContentPackageEntry>,

    /// Malformed datagrams tolerated from one connection before it is
    /// dropped. 0 disables the limit.
    ///
    /// Default: 10.
    pub max_malformed_datagrams: u32,

    /// The first client admitted with this key becomes the server's owner.
    pub owner_key: Option<i32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            password: None,
            max_password_attempts: 3,
            required_packages: Vec::new(),
            max_malformed_datagrams: 10,
            owner_key: None,
        }
    }
}

impl ServerConfig {
    /// Parses a config from JSON text.
    ///
    /// # Errors
    /// [`HullnetError::Config`] if the text isn't valid JSON or a field
    /// has the wrong type.
    pub fn from_json(text: &str) -> Result<Self, HullnetError> {
        Ok(serde_json::from_str(text)?)
    }

    /// The handshake rules this config describes. An empty password
    /// counts as no password.
    pub fn handshake_policy(&self) -> HandshakePolicy {
        HandshakePolicy {
            version: self.version.clone(),
            password: self
                .password
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(ServerPassword::new),
            max_password_attempts: self.max_password_attempts.max(1),
            required_packages: self.required_packages.iter().map(Into::into).collect(),
        }
    }
}
