//! Offline - run a session against a scripted in-memory server.
//!
//! This example demonstrates:
//! - Driving the client over [`MemoryTransport`] with no server process
//! - Answering path requests by decoding the client's frames
//! - Reconnection replaying the world and blocked cells
//!
//! # Running
//!
//! ```text
//! RUST_LOG=raig_client=trace cargo run --example offline
//! ```

use raig_client::protocol::{Command, Event, ProtocolCodec};
use raig_client::transport::{MemoryHandle, MemoryTransport};
use raig_client::{AiService, Cell, Client};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Answer every path request with a straight staircase, goal first.
fn serve(handle: &MemoryHandle, codec: &ProtocolCodec) {
    for frame in handle.take_sent() {
        let command = match codec.decode_command(&frame) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, "Server got a bad frame");
                continue;
            }
        };
        println!("server <- {:?}", command);

        if let Command::RequestPath { start, goal } = command {
            let mut steps = Vec::new();
            let (mut x, mut z) = (goal.x, goal.z);
            while (x, z) != (start.x, start.z) {
                steps.push((x, z));
                if x > start.x {
                    x -= 1;
                } else if x < start.x {
                    x += 1;
                }
                if z > start.z {
                    z -= 1;
                } else if z < start.z {
                    z += 1;
                }
            }

            let mut reply = Vec::new();
            for (i, &(x, z)) in steps.iter().enumerate() {
                let seq = i as u32 + 1;
                if let Ok(bytes) = codec.encode_event(&Event::Node { seq, x, z }) {
                    reply.extend_from_slice(&bytes);
                }
            }
            let end = Event::End {
                seq: steps.len() as u32 + 1,
                x: start.x,
                z: start.z,
            };
            if let Ok(bytes) = codec.encode_event(&end) {
                reply.extend_from_slice(&bytes);
            }

            // Deliver in awkward pieces to exercise reassembly
            for piece in reply.chunks(7) {
                handle.push_inbound(piece);
            }
        }
    }
}

fn run_request(client: &mut Client<MemoryTransport>, handle: &MemoryHandle, start: Cell, goal: Cell) {
    let codec = ProtocolCodec::new(client.config().layout);
    if !client.find_path(start, goal) {
        println!("request {:?} -> {:?} rejected", start, goal);
        return;
    }

    while !client.is_pathfinding_complete() {
        serve(handle, &codec);
        client.update();
    }

    let cells: Vec<(u32, u32)> = client.get_path().iter().map(|c| (c.x, c.z)).collect();
    println!("path: {:?}", cells);
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let (transport, handle) = MemoryTransport::new();
    let mut client = Client::builder().build_with(transport);
    let codec = ProtocolCodec::new(client.config().layout);

    if let Err(e) = client.init_connection("offline", "0") {
        eprintln!("connect failed: {}", e);
        return;
    }
    client.create_game_world(20, 15, AiService::AStar);
    client.set_cell_blocked(Cell::new(3, 0, 3));
    client.set_cell_blocked(Cell::new(4, 0, 4));
    serve(&handle, &codec);

    run_request(&mut client, &handle, Cell::new(0, 0, 0), Cell::new(5, 0, 2));
    run_request(&mut client, &handle, Cell::new(0, 0, 0), Cell::new(3, 0, 3));

    println!("-- server hangs up --");
    handle.hang_up();
    client.update();
    serve(&handle, &codec);
    println!("connection: {:?}", client.connection_state());

    run_request(&mut client, &handle, Cell::new(6, 0, 1), Cell::new(1, 0, 6));
}
