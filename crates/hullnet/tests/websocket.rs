//! End-to-end handshake and data exchange over a real WebSocket listener.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::{Duration, Instant};

    use hullnet::prelude::*;

    #[derive(Default)]
    struct Client {
        salt_requests: u32,
        completed: bool,
        received: Vec<String>,
    }

    impl ClientHandler for Client {
        fn on_request_password(&mut self, _salt: i32, _retries: i32) {
            self.salt_requests += 1;
        }

        fn on_initialization_complete(&mut self) {
            self.completed = true;
        }

        fn on_message_received(&mut self, message: &mut ReadOnlyMessage) {
            self.received.push(message.read_string().unwrap());
        }
    }

    #[derive(Default)]
    struct Echo {
        pending: Vec<(Connection, String)>,
    }

    impl ServerHandler for Echo {
        fn on_message_received(&mut self, connection: &Connection, message: &mut ReadOnlyMessage) {
            self.pending
                .push((connection.clone(), message.read_string().unwrap()));
        }
    }

    /// Updates both peers until `done` holds or five seconds pass.
    fn run_until<C, S>(
        server: &mut ServerPeer<WebSocketTransport, AcceptAll, S>,
        client: &mut ClientPeer<WebSocketTransport, StaticCredentials, C>,
        done: impl Fn(&ServerPeer<WebSocketTransport, AcceptAll, S>, &ClientPeer<WebSocketTransport, StaticCredentials, C>) -> bool,
    ) where
        C: ClientHandler,
        S: ServerHandler,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done(server, client) {
            assert!(Instant::now() < deadline, "timed out");
            server.update();
            client.update();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_websocket_password_handshake_and_echo() {
        let transport = WebSocketTransport::listen("127.0.0.1:0").expect("should bind");
        let addr = transport.local_addr().expect("listener has an address");
        let config = ServerConfig {
            password: Some("depth charge".into()),
            ..ServerConfig::default()
        };
        let mut server = ServerPeer::new(transport, AcceptAll, Echo::default(), config);
        server.start().unwrap();

        let mut client = ClientPeer::new(
            WebSocketTransport::client().expect("client runtime"),
            StaticCredentials::new(42, vec![1, 2, 3]),
            Client::default(),
            ClientConfig::default(),
        );
        client.start(addr).unwrap();

        run_until(&mut server, &mut client, |_, c| c.handler().salt_requests == 1);
        client.send_password("depth charge");
        run_until(&mut server, &mut client, |_, c| c.handler().completed);

        let mut msg = WriteOnlyMessage::new();
        msg.write_string("sonar ping");
        client.send(&msg, DeliveryMethod::ReliableOrdered).unwrap();
        run_until(&mut server, &mut client, |s, _| !s.handler().pending.is_empty());

        let (conn, text) = server.handler_mut().pending.remove(0);
        assert_eq!(conn.account_id(), Some(42));
        let mut reply = WriteOnlyMessage::new();
        reply.write_string(&text.to_uppercase());
        server.send(&reply, &conn, DeliveryMethod::Reliable).unwrap();
        run_until(&mut server, &mut client, |_, c| !c.handler().received.is_empty());

        assert_eq!(client.handler().received, vec!["SONAR PING".to_string()]);
        client.close("done");
        server.close("done");
    }
}
