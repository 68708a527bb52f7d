//! # raig-client
//!
//! Rust client for a remote pathfinding server.
//!
//! A game keeps a grid world on a separate server process: it sends the
//! world size, which cells are blocked, and path requests; the server streams
//! the path back one node at a time. This crate owns that conversation.
//!
//! ## Architecture
//!
//! - **Wire protocol**: fixed-width ASCII frames over TCP
//!   (`CC_FFF_FFF_FFF...`, zero padded to a constant width)
//! - **Session**: non-blocking; the host calls [`Client::update`] once per
//!   tick and polls [`Client::is_pathfinding_complete`]
//! - **Recovery**: after a dropped connection the session reconnects and
//!   replays the world and every blocked cell
//!
//! ## Example
//!
//! ```ignore
//! use raig_client::{AiService, Cell, Client};
//!
//! let mut client = Client::builder().build();
//! client.init_connection("127.0.0.1", "27000")?;
//! client.create_game_world(20, 15, AiService::AStar);
//! client.find_path(Cell::new(0, 0, 0), Cell::new(5, 0, 5));
//!
//! while !client.is_pathfinding_complete() {
//!     client.update();
//! }
//! println!("{} cells", client.get_path().len());
//! ```

pub mod error;
pub mod protocol;
pub mod telemetry;
pub mod transport;

mod client;
mod path;
mod world;

pub use client::{
    Client, ClientBuilder, ClientConfig, ConnectionState, RequestState,
    DEFAULT_MAX_READS_PER_UPDATE, DEFAULT_READ_BUFFER_SIZE,
};
pub use error::{RaigError, Result};
pub use path::{Cell, Path, PathAccumulator};
pub use world::{AiService, BlockedCells, WorldSpec};
