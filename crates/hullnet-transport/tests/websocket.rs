//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on localhost and poll both sides until
//! the expected events show up or a deadline passes.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::{Duration, Instant};

    use hullnet_transport::{
        ConnectionStatus, NativeDelivery, Transport, TransportEvent,
        WebSocketTransport,
    };

    /// Polls until `pred` matches an event or five seconds pass.
    fn wait_for(
        transport: &mut impl Transport,
        pred: impl Fn(&TransportEvent) -> bool,
    ) -> TransportEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            while let Some(event) = transport.poll_event() {
                if pred(&event) {
                    return event;
                }
            }
            assert!(Instant::now() < deadline, "timed out waiting for event");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_websocket_connect_send_receive() {
        let mut server = WebSocketTransport::listen("127.0.0.1:0").expect("should bind");
        let addr = server.local_addr().expect("listener has an address");

        let mut client = WebSocketTransport::client().expect("client runtime");
        let conn = client.connect(addr).expect("connect is queued");

        let connected = wait_for(&mut client, |e| {
            matches!(e, TransportEvent::StatusChanged { status: ConnectionStatus::Connected, .. })
        });
        assert!(matches!(
            connected,
            TransportEvent::StatusChanged { conn: c, .. } if c == conn.id()
        ));

        let incoming = wait_for(&mut server, |e| matches!(e, TransportEvent::Incoming(_)));
        let TransportEvent::Incoming(remote) = incoming else {
            unreachable!()
        };

        client
            .send(conn.id(), b"hello server", NativeDelivery::Unreliable)
            .unwrap();
        let data = wait_for(&mut server, |e| matches!(e, TransportEvent::Data { .. }));
        assert_eq!(
            data,
            TransportEvent::Data {
                conn: remote.id(),
                bytes: b"hello server".to_vec()
            }
        );

        server
            .send(remote.id(), b"hello client", NativeDelivery::ReliableOrdered)
            .unwrap();
        let data = wait_for(&mut client, |e| matches!(e, TransportEvent::Data { .. }));
        assert_eq!(
            data,
            TransportEvent::Data {
                conn: conn.id(),
                bytes: b"hello client".to_vec()
            }
        );
    }

    #[test]
    fn test_websocket_server_disconnect_reaches_client() {
        let mut server = WebSocketTransport::listen("127.0.0.1:0").expect("should bind");
        let addr = server.local_addr().unwrap();
        let mut client = WebSocketTransport::client().unwrap();
        let conn = client.connect(addr).unwrap();

        let TransportEvent::Incoming(remote) =
            wait_for(&mut server, |e| matches!(e, TransportEvent::Incoming(_)))
        else {
            unreachable!()
        };
        server.disconnect(remote.id(), "bye");

        let event = wait_for(&mut client, |e| {
            matches!(e, TransportEvent::StatusChanged { status: ConnectionStatus::Disconnected { .. }, .. })
        });
        assert!(matches!(
            event,
            TransportEvent::StatusChanged { conn: c, .. } if c == conn.id()
        ));
    }

    #[test]
    fn test_websocket_connect_to_closed_port_reports_disconnect() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut client = WebSocketTransport::client().unwrap();
        client.connect(addr).unwrap();

        let event = wait_for(&mut client, |e| matches!(e, TransportEvent::StatusChanged { .. }));
        match event {
            TransportEvent::StatusChanged {
                status: ConnectionStatus::Disconnected { reason },
                ..
            } => assert!(!reason.is_empty()),
            other => panic!("expected a disconnect, got {other:?}"),
        }
    }
}
