//! Pathfind - request one path from a running server over TCP.
//!
//! This example demonstrates:
//! - Building a client with telemetry forwarded to a background task
//! - Setting up a world with blocked cells
//! - Driving the session from a fixed-rate game loop
//!
//! # Running
//!
//! ```text
//! RUST_LOG=raig_client=debug cargo run --example pathfind -- 127.0.0.1 27000
//! ```

use std::time::Duration;

use raig_client::telemetry::ChannelTelemetry;
use raig_client::{AiService, Cell, Client, ConnectionState};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const TICK: Duration = Duration::from_millis(16);
const MAX_TICKS: usize = 600;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let service = args.next().unwrap_or_else(|| "27000".to_string());

    // Telemetry goes to a task that prints JSON lines
    let (sink, mut events) = ChannelTelemetry::channel(64);
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Ok(json) = event.to_json() {
                println!("telemetry: {}", json);
            }
        }
    });

    let mut client = Client::builder()
        .reconnect_interval(Duration::from_millis(500))
        .telemetry(sink)
        .build();

    if let Err(e) = client.init_connection(&host, &service) {
        tracing::warn!(error = %e, "Server not reachable yet, will keep retrying");
    }

    client.create_game_world(20, 15, AiService::AStar);
    for z in 0..4 {
        client.set_cell_blocked(Cell::new(3, 0, z));
    }

    let start = Cell::new(0, 0, 0);
    let goal = Cell::new(5, 0, 5);
    let mut requested = false;

    let mut ticker = tokio::time::interval(TICK);
    for _ in 0..MAX_TICKS {
        ticker.tick().await;
        client.update();

        if !requested && client.connection_state() == ConnectionState::Connected {
            requested = client.find_path(start, goal);
        }

        if requested && client.is_pathfinding_complete() {
            let path = client.get_path();
            println!("path with {} cells:", path.len());
            for cell in path {
                println!("  ({}, {})", cell.x, cell.z);
            }
            break;
        }
    }

    if !client.is_pathfinding_complete() || !requested {
        tracing::error!("No path received");
    }

    // Dropping the client drops the telemetry sender, which ends the reporter
    drop(client);
    reporter.await?;
    Ok(())
}
