//! Integration tests for raig-client.
//!
//! These drive a full session over the in-memory transport, playing the
//! server's side through the transport handle.

use raig_client::protocol::{Command, Event, FrameLayout, ProtocolCodec};
use raig_client::transport::{MemoryHandle, MemoryTransport};
use raig_client::{AiService, Cell, Client, ConnectionState, RequestState};

fn session() -> (Client<MemoryTransport>, MemoryHandle) {
    let (transport, handle) = MemoryTransport::new();
    let client = Client::builder().build_with(transport);
    (client, handle)
}

fn connected() -> (Client<MemoryTransport>, MemoryHandle) {
    let (mut client, handle) = session();
    client.init_connection("127.0.0.1", "27000").unwrap();
    (client, handle)
}

fn decode_sent(handle: &MemoryHandle) -> Vec<Command> {
    let codec = ProtocolCodec::default();
    handle
        .sent()
        .iter()
        .map(|frame| codec.decode_command(frame).unwrap())
        .collect()
}

fn encode_events(events: &[Event]) -> Vec<u8> {
    let codec = ProtocolCodec::default();
    events
        .iter()
        .flat_map(|event| codec.encode_event(event).unwrap())
        .collect()
}

fn coords(client: &Client<MemoryTransport>) -> Vec<(u32, u32)> {
    client.get_path().iter().map(|c| (c.x, c.z)).collect()
}

/// Test the full world setup, request and streamed reply.
#[test]
fn test_end_to_end_path_request() {
    let (mut client, handle) = connected();

    client.create_game_world(20, 15, AiService::AStar);
    assert!(client.find_path(Cell::new(0, 0, 0), Cell::new(5, 0, 5)));
    assert!(!client.is_pathfinding_complete());

    // Exact bytes on the wire
    let sent = handle.sent();
    assert_eq!(&sent[0][..], b"00_020_015_0000000");
    assert_eq!(&sent[1][..], b"01_000_000_005_005");

    handle.push_inbound(&encode_events(&[
        Event::Node { seq: 1, x: 5, z: 5 },
        Event::End { seq: 2, x: 0, z: 0 },
    ]));
    client.update();

    assert!(client.is_pathfinding_complete());
    assert_eq!(coords(&client), vec![(0, 0), (5, 5)]);
}

/// Test that path nodes carry their sequence ids and sit on the ground plane.
#[test]
fn test_path_cells_carry_sequence_ids() {
    let (mut client, handle) = connected();
    client.find_path(Cell::new(0, 0, 0), Cell::new(2, 0, 2));

    handle.push_inbound(&encode_events(&[
        Event::Node { seq: 1, x: 2, z: 2 },
        Event::Node { seq: 2, x: 1, z: 1 },
        Event::End { seq: 3, x: 0, z: 0 },
    ]));
    client.update();

    let path = client.get_path();
    let ids: Vec<Option<u32>> = path.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![Some(3), Some(2), Some(1)]);
    assert!(path.iter().all(|c| c.y == 0));
    assert_eq!(path.start(), Some(&Cell::new(0, 0, 0)));
    assert_eq!(path.goal(), Some(&Cell::new(2, 0, 2)));
}

/// Test that a second request while one is pending sends nothing.
#[test]
fn test_find_path_while_pending_is_rejected() {
    let (mut client, handle) = connected();
    assert!(client.find_path(Cell::new(0, 0, 0), Cell::new(5, 0, 5)));
    handle.take_sent();

    assert!(!client.find_path(Cell::new(1, 0, 1), Cell::new(4, 0, 4)));
    assert_eq!(handle.send_count(), 0);
    assert_eq!(client.request_state(), RequestState::Pending);
}

/// Test that a request with a blocked endpoint sends nothing.
#[test]
fn test_find_path_with_blocked_endpoint_is_rejected() {
    let (mut client, handle) = connected();
    client.set_cell_blocked(Cell::new(3, 0, 3));
    handle.take_sent();

    assert!(!client.find_path(Cell::new(3, 0, 3), Cell::new(5, 0, 5)));
    assert!(!client.find_path(Cell::new(0, 0, 0), Cell::new(3, 0, 3)));
    assert_eq!(handle.send_count(), 0);
    assert_eq!(client.request_state(), RequestState::Idle);

    // Opening the cell lifts the restriction
    client.set_cell_open(Cell::new(3, 0, 3));
    assert!(client.find_path(Cell::new(3, 0, 3), Cell::new(5, 0, 5)));
}

/// Test that a reconnect replays the world and blocked cells in order.
#[test]
fn test_reconnect_replays_world_then_blocked_cells() {
    let (mut client, handle) = connected();

    client.create_game_world(10, 10, AiService::Bfs);
    client.create_game_world(20, 15, AiService::AStar);
    client.set_cell_blocked(Cell::new(3, 0, 3));
    client.set_cell_blocked(Cell::new(1, 0, 7));
    client.set_cell_blocked(Cell::new(4, 0, 2));
    client.set_cell_open(Cell::new(1, 0, 7));
    client.set_cell_blocked(Cell::new(1, 0, 7));
    client.find_path(Cell::new(0, 0, 0), Cell::new(9, 0, 9));
    assert_eq!(client.request_state(), RequestState::Pending);

    // Server drops us mid-request
    handle.take_sent();
    handle.hang_up();
    client.update();

    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert_eq!(client.request_state(), RequestState::Idle);
    assert_eq!(handle.connect_count(), 2);
    assert_eq!(
        decode_sent(&handle),
        vec![
            Command::InitWorld {
                width: 20,
                height: 15,
                service: AiService::AStar,
            },
            Command::SetBlocked {
                cell: Cell::new(3, 0, 3)
            },
            Command::SetBlocked {
                cell: Cell::new(4, 0, 2)
            },
            Command::SetBlocked {
                cell: Cell::new(1, 0, 7)
            },
        ]
    );
}

/// Test that a reconnect without a cached world sends only blocked cells.
#[test]
fn test_reconnect_without_world_skips_world_frame() {
    let (mut client, handle) = connected();
    client.set_cell_blocked(Cell::new(2, 0, 2));

    handle.take_sent();
    handle.hang_up();
    client.update();

    assert_eq!(
        decode_sent(&handle),
        vec![Command::SetBlocked {
            cell: Cell::new(2, 0, 2)
        }]
    );
}

/// Test that mutations made while the server is down are replayed.
#[test]
fn test_changes_while_failed_are_replayed() {
    let (mut client, handle) = connected();

    handle.refuse_connections(true);
    handle.hang_up();
    client.update();
    assert_eq!(client.connection_state(), ConnectionState::Failed);

    client.create_game_world(8, 8, AiService::Dfs);
    client.set_cell_blocked(Cell::new(5, 0, 5));
    assert!(!client.find_path(Cell::new(0, 0, 0), Cell::new(1, 0, 1)));
    assert_eq!(handle.send_count(), 0);

    handle.refuse_connections(false);
    client.update();

    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert_eq!(
        decode_sent(&handle),
        vec![
            Command::InitWorld {
                width: 8,
                height: 8,
                service: AiService::Dfs,
            },
            Command::SetBlocked {
                cell: Cell::new(5, 0, 5)
            },
        ]
    );
}

/// Test frames split at every possible boundary.
#[test]
fn test_fragmented_frames() {
    let bytes = encode_events(&[
        Event::Node { seq: 1, x: 4, z: 4 },
        Event::Node { seq: 2, x: 2, z: 3 },
        Event::End { seq: 3, x: 0, z: 0 },
    ]);

    for split in 1..bytes.len() {
        let (mut client, handle) = connected();
        client.find_path(Cell::new(0, 0, 0), Cell::new(4, 0, 4));

        handle.push_inbound(&bytes[..split]);
        client.update();
        handle.push_inbound(&bytes[split..]);
        client.update();

        assert!(client.is_pathfinding_complete(), "split at {}", split);
        assert_eq!(coords(&client), vec![(0, 0), (2, 3), (4, 4)]);
    }
}

/// Test byte-at-a-time delivery across many ticks.
#[test]
fn test_byte_at_a_time_delivery() {
    let (mut client, handle) = connected();
    client.find_path(Cell::new(0, 0, 0), Cell::new(1, 0, 1));

    let bytes = encode_events(&[
        Event::Node { seq: 1, x: 1, z: 1 },
        Event::End { seq: 2, x: 0, z: 0 },
    ]);
    for byte in &bytes {
        handle.push_inbound(std::slice::from_ref(byte));
        client.update();
    }

    assert!(client.is_pathfinding_complete());
    assert_eq!(coords(&client), vec![(0, 0), (1, 1)]);
}

/// Test duplicate deliveries of the same node.
#[test]
fn test_duplicate_nodes_are_dropped() {
    let (mut client, handle) = connected();
    client.find_path(Cell::new(0, 0, 0), Cell::new(1, 0, 1));

    handle.push_inbound(&encode_events(&[
        Event::Node { seq: 1, x: 1, z: 1 },
        Event::Node { seq: 1, x: 1, z: 1 },
        Event::End { seq: 2, x: 0, z: 0 },
        Event::End { seq: 2, x: 0, z: 0 },
    ]));
    client.update();

    assert_eq!(coords(&client), vec![(0, 0), (1, 1)]);
}

/// Test that garbage between valid frames is skipped.
#[test]
fn test_malformed_frames_are_skipped() {
    let (mut client, handle) = connected();
    client.find_path(Cell::new(0, 0, 0), Cell::new(1, 0, 1));

    let mut bytes = encode_events(&[Event::Node { seq: 1, x: 1, z: 1 }]);
    bytes.extend_from_slice(b"02_abc_000_0000000");
    bytes.extend_from_slice(b"00_020_015_0000000"); // outbound code from the server
    bytes.extend(encode_events(&[Event::Empty, Event::End { seq: 2, x: 0, z: 0 }]));
    handle.push_inbound(&bytes);
    client.update();

    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert!(client.is_pathfinding_complete());
    assert_eq!(coords(&client), vec![(0, 0), (1, 1)]);
}

/// Test that well-formed frames with unknown codes do not disturb a NODE
/// split across deliveries.
#[test]
fn test_unknown_codes_before_split_frame() {
    let node = encode_events(&[Event::Node { seq: 1, x: 5, z: 5 }]);
    let end = encode_events(&[Event::End { seq: 2, x: 0, z: 0 }]);
    let mut first = b"07_000_000_0000000".repeat(3);
    first.extend_from_slice(&node[..5]);
    let mut second = node[5..].to_vec();
    second.extend_from_slice(&end);

    let (mut client, handle) = connected();
    client.find_path(Cell::new(0, 0, 0), Cell::new(5, 0, 5));
    handle.push_inbound(&first);
    client.update();
    assert!(!client.is_pathfinding_complete());
    handle.push_inbound(&second);
    client.update();

    assert!(client.is_pathfinding_complete());
    assert_eq!(coords(&client), vec![(0, 0), (5, 5)]);

    // Same bytes in one delivery
    let (mut whole, handle) = connected();
    whole.find_path(Cell::new(0, 0, 0), Cell::new(5, 0, 5));
    handle.push_inbound(&[first, second].concat());
    whole.update();

    assert_eq!(coords(&whole), coords(&client));
}

/// Test that a stream shifted by stray bytes is realigned on the next
/// frame, however it is chunked.
#[test]
fn test_misaligned_stream_recovers() {
    let mut bytes = b"xxxxx".to_vec();
    bytes.extend(encode_events(&[
        Event::Empty,
        Event::Empty,
        Event::Node { seq: 1, x: 5, z: 5 },
        Event::End { seq: 2, x: 0, z: 0 },
    ]));

    let (mut client, handle) = connected();
    client.find_path(Cell::new(0, 0, 0), Cell::new(5, 0, 5));
    handle.push_inbound(&bytes);
    client.update();

    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert!(client.is_pathfinding_complete());
    assert_eq!(coords(&client), vec![(0, 0), (5, 5)]);

    let (mut trickled, handle) = connected();
    trickled.find_path(Cell::new(0, 0, 0), Cell::new(5, 0, 5));
    for byte in &bytes {
        handle.push_inbound(&[*byte]);
        trickled.update();
    }

    assert!(trickled.is_pathfinding_complete());
    assert_eq!(coords(&trickled), vec![(0, 0), (5, 5)]);
}

/// Test back-to-back requests get independent paths.
#[test]
fn test_sequential_requests() {
    let (mut client, handle) = connected();

    client.find_path(Cell::new(0, 0, 0), Cell::new(1, 0, 1));
    handle.push_inbound(&encode_events(&[
        Event::Node { seq: 1, x: 1, z: 1 },
        Event::End { seq: 2, x: 0, z: 0 },
    ]));
    client.update();
    assert_eq!(coords(&client), vec![(0, 0), (1, 1)]);

    assert!(client.find_path(Cell::new(2, 0, 2), Cell::new(3, 0, 3)));
    // Previous path stays readable until the next one completes
    assert_eq!(coords(&client), vec![(0, 0), (1, 1)]);

    handle.push_inbound(&encode_events(&[
        Event::Node { seq: 1, x: 3, z: 3 },
        Event::End { seq: 2, x: 2, z: 2 },
    ]));
    client.update();
    assert_eq!(coords(&client), vec![(2, 2), (3, 3)]);
}

/// Test a session with a narrower field width.
#[test]
fn test_two_digit_layout() {
    let layout = FrameLayout::new(2).unwrap();
    let codec = ProtocolCodec::new(layout);
    let (transport, handle) = MemoryTransport::new();
    let mut client = Client::builder().layout(layout).build_with(transport);
    client.init_connection("h", "s").unwrap();

    client.find_path(Cell::new(0, 0, 0), Cell::new(9, 0, 9));
    assert_eq!(&handle.sent()[0][..], b"01_00_00_09_09");

    let mut bytes = codec.encode_event(&Event::Node { seq: 1, x: 9, z: 9 }).unwrap().to_vec();
    bytes.extend_from_slice(&codec.encode_event(&Event::End { seq: 2, x: 0, z: 0 }).unwrap());
    handle.push_inbound(&bytes);
    client.update();

    assert_eq!(coords(&client), vec![(0, 0), (9, 9)]);
}

/// Test a path over a real TCP socket.
#[test]
fn test_tcp_round_trip() {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = [0u8; 18];
        stream.read_exact(&mut request).unwrap();
        assert_eq!(&request, b"01_000_000_002_002");
        stream.write_all(b"02_001_002_0020000").unwrap();
        stream.write_all(b"03_002_000_0000000").unwrap();
    });

    let mut client = Client::new();
    client.init_connection("127.0.0.1", &port.to_string()).unwrap();
    assert!(client.find_path(Cell::new(0, 0, 0), Cell::new(2, 0, 2)));

    let deadline = Instant::now() + Duration::from_secs(5);
    while !client.is_pathfinding_complete() && Instant::now() < deadline {
        client.update();
        std::thread::sleep(Duration::from_millis(1));
    }
    server.join().unwrap();

    let path: Vec<(u32, u32)> = client.get_path().iter().map(|c| (c.x, c.z)).collect();
    assert_eq!(path, vec![(0, 0), (2, 2)]);
}
