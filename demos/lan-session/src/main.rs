//! A password-protected LAN session: one server, one client, over
//! WebSocket on localhost.
//!
//! ```text
//! RUST_LOG=debug cargo run -p lan-session
//! ```

use std::time::{Duration, Instant};

use hullnet::prelude::*;
use tracing_subscriber::EnvFilter;

const PASSWORD: &str = "ballast";

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Crewmate {
    password_wanted: bool,
    joined: bool,
    chat: Vec<String>,
    left: Option<String>,
}

impl ClientHandler for Crewmate {
    fn on_request_password(&mut self, _salt: i32, retries: i32) {
        tracing::info!(retries, "server asked for the password");
        self.password_wanted = true;
    }

    fn on_initialization_complete(&mut self) {
        self.joined = true;
    }

    fn on_message_received(&mut self, message: &mut ReadOnlyMessage) {
        match message.read_string() {
            Ok(line) => self.chat.push(line),
            Err(e) => tracing::warn!(error = %e, "unreadable chat line"),
        }
    }

    fn on_disconnect(&mut self, reason: &str) {
        self.left = Some(reason.to_string());
    }
}

/// Greets every crewmate and echoes what they say back to them.
#[derive(Default)]
struct Host {
    greet: Vec<Connection>,
    echo: Vec<(Connection, String)>,
}

impl ServerHandler for Host {
    fn on_initialization_complete(&mut self, connection: &Connection) {
        self.greet.push(connection.clone());
    }

    fn on_message_received(&mut self, connection: &Connection, message: &mut ReadOnlyMessage) {
        match message.read_string() {
            Ok(line) => self.echo.push((connection.clone(), line)),
            Err(e) => tracing::warn!(%connection, error = %e, "unreadable chat line"),
        }
    }

    fn on_disconnect(&mut self, connection: &Connection, reason: &str) {
        tracing::info!(%connection, %reason, "crewmate left");
    }

    fn on_shutdown(&mut self) {
        tracing::info!("host shut down");
    }
}

fn chat(line: &str) -> WriteOnlyMessage {
    let mut msg = WriteOnlyMessage::new();
    msg.write_string(line);
    msg
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), HullnetError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let transport = WebSocketTransport::listen("127.0.0.1:0")?;
    let Some(addr) = transport.local_addr() else {
        tracing::error!("listener has no local address");
        return Ok(());
    };
    let config = ServerConfig::from_json(&format!(r#"{{ "password": "{PASSWORD}" }}"#))?;
    let mut server = ServerPeer::new(transport, AcceptAll, Host::default(), config);
    server.start()?;

    let mut client = ClientPeer::new(
        WebSocketTransport::client()?,
        StaticCredentials::new(76561198000000001, b"lan-ticket".to_vec()),
        Crewmate::default(),
        ClientConfig {
            name: "Captain".into(),
            ..ClientConfig::default()
        },
    );
    client.start(addr)?;

    let deadline = Instant::now() + Duration::from_secs(10);
    while client.handler().chat.len() < 2 && client.handler().left.is_none() {
        if Instant::now() > deadline {
            tracing::error!("session timed out");
            break;
        }
        server.update();
        client.update();

        if std::mem::take(&mut client.handler_mut().password_wanted) {
            client.send_password(PASSWORD);
        }
        if std::mem::take(&mut client.handler_mut().joined) {
            client.send(&chat("Reactor is stable."), DeliveryMethod::ReliableOrdered)?;
        }
        for connection in std::mem::take(&mut server.handler_mut().greet) {
            server.send(&chat("Welcome aboard."), &connection, DeliveryMethod::ReliableOrdered)?;
        }
        for (connection, line) in std::mem::take(&mut server.handler_mut().echo) {
            server.send(&chat(&format!("echo: {line}")), &connection, DeliveryMethod::Reliable)?;
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    for line in &client.handler().chat {
        tracing::info!(%line, "client received");
    }
    client.close("Leaving the sub");
    server.close("Host closed the lobby");
    Ok(())
}
