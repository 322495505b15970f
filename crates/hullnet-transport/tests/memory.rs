//! Integration tests for the in-process memory transport.

use std::net::SocketAddr;

use hullnet_transport::{
    ConnectionStatus, MemoryNetwork, NativeDelivery, Transport, TransportError,
    TransportEvent,
};

fn server_addr() -> SocketAddr {
    "127.0.0.1:27015".parse().unwrap()
}

/// Drains every queued event.
fn drain(transport: &mut impl Transport) -> Vec<TransportEvent> {
    std::iter::from_fn(|| transport.poll_event()).collect()
}

#[test]
fn test_connect_reports_incoming_and_connected() {
    let network = MemoryNetwork::new();
    let mut server = network.listen(server_addr()).unwrap();
    let mut client = network.client();

    let conn = client.connect(server_addr()).unwrap();
    assert_eq!(conn.addr(), server_addr());

    let server_events = drain(&mut server);
    assert_eq!(server_events.len(), 1);
    match &server_events[0] {
        TransportEvent::Incoming(remote) => {
            assert_eq!(remote.id(), conn.id());
            assert_eq!(remote.addr(), client.local_addr());
        }
        other => panic!("expected Incoming, got {other:?}"),
    }

    assert_eq!(
        drain(&mut client),
        vec![TransportEvent::StatusChanged {
            conn: conn.id(),
            status: ConnectionStatus::Connected,
        }]
    );
}

#[test]
fn test_connect_without_listener_is_unreachable() {
    let network = MemoryNetwork::new();
    let mut client = network.client();

    let result = client.connect(server_addr());

    assert!(matches!(result, Err(TransportError::Unreachable(a)) if a == server_addr()));
}

#[test]
fn test_listen_twice_on_same_address_fails() {
    let network = MemoryNetwork::new();
    let _first = network.listen(server_addr()).unwrap();

    assert!(matches!(
        network.listen(server_addr()),
        Err(TransportError::BindFailed(_))
    ));
}

#[test]
fn test_data_arrives_in_send_order() {
    let network = MemoryNetwork::new();
    let mut server = network.listen(server_addr()).unwrap();
    let mut client = network.client();
    let conn = client.connect(server_addr()).unwrap();
    drain(&mut server);

    for i in 0..10u8 {
        client
            .send(conn.id(), &[i], NativeDelivery::ReliableOrdered)
            .unwrap();
    }

    let received: Vec<u8> = drain(&mut server)
        .into_iter()
        .filter_map(|e| match e {
            TransportEvent::Data { bytes, .. } => Some(bytes[0]),
            _ => None,
        })
        .collect();
    assert_eq!(received, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_send_to_unknown_connection_fails() {
    let network = MemoryNetwork::new();
    let mut client = network.client();

    let result = client.send(
        hullnet_transport::ConnectionId::new(999),
        &[1],
        NativeDelivery::Unreliable,
    );

    assert!(matches!(result, Err(TransportError::UnknownConnection(_))));
}

#[test]
fn test_disconnect_reports_reason_to_remote() {
    let network = MemoryNetwork::new();
    let mut server = network.listen(server_addr()).unwrap();
    let mut client = network.client();
    let conn = client.connect(server_addr()).unwrap();
    drain(&mut server);
    drain(&mut client);

    server.disconnect(conn.id(), "kicked");

    assert_eq!(
        drain(&mut client),
        vec![TransportEvent::StatusChanged {
            conn: conn.id(),
            status: ConnectionStatus::Disconnected {
                reason: "kicked".into()
            },
        }]
    );
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_shutdown_closes_links_and_unregisters_listener() {
    let network = MemoryNetwork::new();
    let mut server = network.listen(server_addr()).unwrap();
    let mut client = network.client();
    let conn = client.connect(server_addr()).unwrap();
    drain(&mut server);
    drain(&mut client);

    server.shutdown("server closing");

    assert!(drain(&mut client).contains(&TransportEvent::StatusChanged {
        conn: conn.id(),
        status: ConnectionStatus::Disconnected {
            reason: "server closing".into()
        },
    }));
    let mut late = network.client();
    assert!(matches!(
        late.connect(server_addr()),
        Err(TransportError::Unreachable(_))
    ));
}

#[test]
fn test_memory_transport_upgrades_every_mode_to_reliable_ordered() {
    let network = MemoryNetwork::new();
    let client = network.client();
    assert_eq!(
        client.effective_delivery(NativeDelivery::Unreliable),
        NativeDelivery::ReliableOrdered
    );
}
