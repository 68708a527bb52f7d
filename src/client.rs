//! Client builder and session state machine.
//!
//! The [`ClientBuilder`] configures framing, read limits, reconnection and
//! telemetry. The [`Client`] is the session the host drives:
//! 1. `init_connection` opens the stream and remembers the endpoint
//! 2. Mutators (`create_game_world`, `set_cell_*`, `find_path`) update the
//!    cached state and send commands while connected
//! 3. `update`, once per tick, drains the stream, applies path events and
//!    reconnects (replaying cached state) after a failure
//!
//! Nothing here blocks and nothing here is shared: the host's thread owns
//! the session and calls every method.
//!
//! # Example
//!
//! ```ignore
//! use raig_client::{AiService, Cell, Client};
//!
//! let mut client = Client::new();
//! client.init_connection("127.0.0.1", "27000")?;
//! client.create_game_world(20, 15, AiService::AStar);
//! client.set_cell_blocked(Cell::new(3, 0, 3));
//! client.find_path(Cell::new(0, 0, 0), Cell::new(5, 0, 5));
//!
//! loop {
//!     client.update();
//!     if client.is_pathfinding_complete() {
//!         for cell in client.get_path() {
//!             println!("({}, {})", cell.x, cell.z);
//!         }
//!         break;
//!     }
//! }
//! ```

use std::fmt::Display;
use std::time::{Duration, Instant};

use crate::error::{RaigError, Result};
use crate::path::{Cell, Path, PathAccumulator};
use crate::protocol::{
    Command, Event, Frame, FrameBuffer, FrameLayout, ProtocolCodec, DEFAULT_RESYNC_THRESHOLD,
};
use crate::telemetry::{NoopTelemetry, TelemetryEvent, TelemetrySink};
use crate::transport::{ConnectStatus, TcpTransport, Transport, DEFAULT_CONNECT_TIMEOUT};
use crate::world::{AiService, BlockedCells, WorldSpec};

/// Default size of the per-read scratch buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4 * 1024;

/// Default cap on transport reads in one `update`.
pub const DEFAULT_MAX_READS_PER_UPDATE: usize = 64;

/// Connection status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or disconnected by the host.
    Disconnected,
    /// Stream is open.
    Connected,
    /// Connection lost or refused; `update` keeps retrying.
    Failed,
}

/// Path request status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Ready for a new `find_path`.
    Idle,
    /// A request is in flight.
    Pending,
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Frame geometry; must match the server's.
    pub layout: FrameLayout,
    /// Scratch buffer size for each transport read.
    pub read_buffer_size: usize,
    /// Cap on transport reads per `update`, so one tick cannot spin forever
    /// on a fast stream.
    pub max_reads_per_update: usize,
    /// Time allowed for one TCP connect attempt. Bounds the blocking
    /// `init_connection`; a reconnect still pending after this long fails.
    pub connect_timeout: Duration,
    /// Minimum time between reconnection attempts. `None` retries on every
    /// `update`.
    pub reconnect_interval: Option<Duration>,
    /// Consecutive misshapen frames after which the stream is taken to be
    /// misaligned and rescanned for a frame boundary. Frames that are well
    /// formed but carry an unknown code never count. 0 disables resync.
    pub resync_threshold: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            layout: FrameLayout::default(),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_reads_per_update: DEFAULT_MAX_READS_PER_UPDATE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_interval: None,
            resync_threshold: DEFAULT_RESYNC_THRESHOLD,
        }
    }
}

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    telemetry: Box<dyn TelemetrySink + Send>,
}

impl ClientBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            telemetry: Box::new(NoopTelemetry),
        }
    }

    /// Set the frame layout.
    ///
    /// Default: 3-digit fields (18-byte frames)
    pub fn layout(mut self, layout: FrameLayout) -> Self {
        self.config.layout = layout;
        self
    }

    /// Set the scratch buffer size for each read.
    ///
    /// Default: 4 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size.max(1);
        self
    }

    /// Set the cap on reads per `update`.
    ///
    /// Default: 64
    pub fn max_reads_per_update(mut self, reads: usize) -> Self {
        self.config.max_reads_per_update = reads.max(1);
        self
    }

    /// Set the TCP connect timeout, which bounds both the blocking first
    /// connect and each non-blocking reconnect. Only used by
    /// [`ClientBuilder::build`].
    ///
    /// Default: 2 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Wait at least `interval` between reconnection attempts.
    ///
    /// Default: retry on every `update`
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = Some(interval);
        self
    }

    /// Set how many consecutive misshapen frames trigger a resync.
    ///
    /// Default: 3
    pub fn resync_threshold(mut self, threshold: usize) -> Self {
        self.config.resync_threshold = threshold;
        self
    }

    /// Report milestones to `sink`.
    ///
    /// Default: discard
    pub fn telemetry<S>(mut self, sink: S) -> Self
    where
        S: TelemetrySink + Send + 'static,
    {
        self.telemetry = Box::new(sink);
        self
    }

    /// Build a client that talks TCP.
    pub fn build(self) -> Client<TcpTransport> {
        let transport = TcpTransport::with_timeout(self.config.connect_timeout);
        self.build_with(transport)
    }

    /// Build a client over a custom transport.
    pub fn build_with<T: Transport>(self, transport: T) -> Client<T> {
        Client::from_parts(self.config, transport, self.telemetry)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A pathfinding session with a remote server.
///
/// At most one path request is in flight at a time. The world spec and the
/// blocked-cell set are cached for the life of the session and replayed to
/// the server after every (re)connection.
pub struct Client<T: Transport = TcpTransport> {
    transport: T,
    config: ClientConfig,
    codec: ProtocolCodec,
    frames: FrameBuffer,
    read_buf: Vec<u8>,
    /// Host and service of the last `init_connection`, for reconnects.
    endpoint: Option<(String, String)>,
    connection: ConnectionState,
    request: RequestState,
    world: Option<WorldSpec>,
    blocked: BlockedCells,
    accumulator: PathAccumulator,
    /// Most recently finished path.
    path: Path,
    last_reconnect_attempt: Option<Instant>,
    /// A reconnect handshake was started and has not settled yet.
    reconnect_pending: bool,
    telemetry: Box<dyn TelemetrySink + Send>,
}

impl Client<TcpTransport> {
    /// Create a TCP client with default settings.
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl Default for Client<TcpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Client<T> {
    fn from_parts(
        config: ClientConfig,
        transport: T,
        telemetry: Box<dyn TelemetrySink + Send>,
    ) -> Self {
        let frames = FrameBuffer::new(config.layout).with_resync_threshold(config.resync_threshold);
        Self {
            transport,
            codec: ProtocolCodec::new(config.layout),
            frames,
            read_buf: vec![0u8; config.read_buffer_size],
            config,
            endpoint: None,
            connection: ConnectionState::Disconnected,
            request: RequestState::Idle,
            world: None,
            blocked: BlockedCells::new(),
            accumulator: PathAccumulator::new(),
            path: Path::default(),
            last_reconnect_attempt: None,
            reconnect_pending: false,
            telemetry,
        }
    }

    /// Connect to the server at `host:service`.
    ///
    /// This is the one call that may block: it resolves the endpoint and
    /// waits up to the connect timeout. The resolved endpoint is remembered
    /// whether or not the connect succeeds; after a failure `update` keeps
    /// retrying it without blocking. If the name does not resolve there is
    /// nothing to retry, and another `init_connection` is needed. On success
    /// any cached world and blocked cells are sent straight away.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the connection could not be opened.
    pub fn init_connection(&mut self, host: &str, service: &str) -> Result<()> {
        self.endpoint = Some((host.to_string(), service.to_string()));
        self.reconnect_pending = false;

        if let Err(e) = self.transport.connect(host, service) {
            tracing::warn!(host, service, error = %e, "Connection failed");
            self.connection = ConnectionState::Failed;
            return Err(e);
        }

        tracing::info!(host, service, "Connected");
        self.telemetry.record(&TelemetryEvent::Connected {
            host: host.to_string(),
            service: service.to_string(),
        });
        self.establish();
        Ok(())
    }

    /// Set the world parameters.
    ///
    /// Always cached; sent now if connected, otherwise on the next
    /// successful connection.
    pub fn create_game_world(&mut self, width: u32, height: u32, service: AiService) {
        self.world = Some(WorldSpec::new(width, height, service));

        if self.is_connected() {
            self.send_command(Command::InitWorld {
                width,
                height,
                service,
            });
        }
    }

    /// Clear a cell's blocked mark.
    ///
    /// Opening a cell that is not blocked leaves the set alone but still
    /// sends the command.
    pub fn set_cell_open(&mut self, cell: Cell) {
        self.blocked.remove(&cell);

        if self.is_connected() {
            self.send_command(Command::SetOpen { cell });
        }
    }

    /// Mark a cell impassable.
    ///
    /// Blocking a cell twice keeps one entry (at its first position) but
    /// still sends the command.
    pub fn set_cell_blocked(&mut self, cell: Cell) {
        self.blocked.insert(cell);

        if self.is_connected() {
            self.send_command(Command::SetBlocked { cell });
        }
    }

    /// Request a path from `start` to `goal`.
    ///
    /// Rejected without sending anything (returns `false`) when not
    /// connected, when a request is already pending, or when either
    /// endpoint is blocked. Poll [`is_pathfinding_complete`] before issuing
    /// the next request.
    ///
    /// [`is_pathfinding_complete`]: Client::is_pathfinding_complete
    pub fn find_path(&mut self, start: Cell, goal: Cell) -> bool {
        if !self.is_connected() {
            tracing::debug!("Path request rejected: not connected");
            return false;
        }
        if self.request == RequestState::Pending {
            tracing::debug!("Path request rejected: previous request still pending");
            return false;
        }
        if self.blocked.contains(&start) || self.blocked.contains(&goal) {
            tracing::debug!(?start, ?goal, "Path request rejected: endpoint is blocked");
            return false;
        }

        let command = Command::RequestPath { start, goal };
        let bytes = match self.codec.encode(&command) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(?start, ?goal, error = %e, "Path request rejected");
                return false;
            }
        };

        self.request = RequestState::Pending;
        self.accumulator.reset();
        tracing::debug!(?start, ?goal, "Path requested");
        self.telemetry
            .record(&TelemetryEvent::PathRequested { start, goal });

        self.send_bytes(&bytes);
        true
    }

    /// Check if no path request is in flight.
    #[inline]
    pub fn is_pathfinding_complete(&self) -> bool {
        self.request == RequestState::Idle
    }

    /// The most recently finished path, start to goal. Empty before the
    /// first request completes.
    #[inline]
    pub fn get_path(&self) -> &Path {
        &self.path
    }

    /// Drive the session. Call once per tick.
    ///
    /// Flushes queued output, reads everything available (up to
    /// `max_reads_per_update` reads), applies the decoded events, and if the
    /// connection is down starts a reconnection or checks on the one in
    /// progress. Never waits on the network.
    pub fn update(&mut self) {
        if self.is_connected() {
            if let Err(e) = self.transport.flush() {
                self.connection_lost(e);
            }
        }

        if self.is_connected() {
            self.pump();
        }

        if !self.is_connected() {
            self.try_reconnect();
        }
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Cached world and blocked cells are kept; a later `init_connection`
    /// replays them. A pending request is abandoned.
    pub fn disconnect(&mut self) {
        self.transport.close();
        self.endpoint = None;
        self.reconnect_pending = false;
        self.connection = ConnectionState::Disconnected;
        self.request = RequestState::Idle;
        self.accumulator.reset();
        self.frames.clear();
        tracing::info!("Disconnected");
    }

    /// Current connection status.
    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Current request status.
    #[inline]
    pub fn request_state(&self) -> RequestState {
        self.request
    }

    /// Cells currently blocked, in insertion order.
    #[inline]
    pub fn blocked_cells(&self) -> &BlockedCells {
        &self.blocked
    }

    /// Cached world parameters.
    #[inline]
    pub fn world_spec(&self) -> Option<WorldSpec> {
        self.world
    }

    /// Session configuration.
    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying transport.
    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Read until the transport runs dry, the stream closes, or the read cap
    /// is hit.
    fn pump(&mut self) {
        for _ in 0..self.config.max_reads_per_update {
            let n = match self.transport.try_recv(&mut self.read_buf) {
                Ok(None) => return,
                Ok(Some(0)) => {
                    self.connection_lost(RaigError::ConnectionClosed);
                    return;
                }
                Ok(Some(n)) => n,
                Err(e) => {
                    self.connection_lost(e);
                    return;
                }
            };

            tracing::trace!(bytes = n, "Received");
            let frames = self.frames.push(&self.read_buf[..n]);
            for frame in &frames {
                self.apply(frame);
            }
        }
    }

    /// Decode one frame and apply it to the request state.
    fn apply(&mut self, frame: &Frame) {
        let event = self.codec.decode(frame.as_bytes());

        if let Event::ProtocolError(reason) = &event {
            tracing::warn!(frame = %frame.as_text(), %reason, "Dropping malformed frame");
            self.telemetry.record(&TelemetryEvent::ProtocolError {
                reason: reason.clone(),
            });
            return;
        }

        match (self.request, event) {
            (_, Event::Empty) => tracing::trace!("Keepalive"),
            (RequestState::Idle, event) => {
                tracing::debug!(?event, "Stray path frame with no request pending");
            }
            (RequestState::Pending, Event::Node { seq, x, z }) => {
                self.accumulator.on_node(seq, x, z);
            }
            (RequestState::Pending, Event::End { seq, x, z }) => {
                if let Some(path) = self.accumulator.on_end(seq, x, z) {
                    tracing::debug!(length = path.len(), "Path complete");
                    self.telemetry
                        .record(&TelemetryEvent::PathCompleted { length: path.len() });
                    self.path = path;
                    self.request = RequestState::Idle;
                }
            }
            (RequestState::Pending, Event::ProtocolError(_)) => {}
        }
    }

    fn try_reconnect(&mut self) {
        if self.endpoint.is_none() {
            return;
        }
        if self.reconnect_pending {
            self.poll_reconnect();
            return;
        }

        if let (Some(interval), Some(last)) =
            (self.config.reconnect_interval, self.last_reconnect_attempt)
        {
            if last.elapsed() < interval {
                return;
            }
        }
        self.last_reconnect_attempt = Some(Instant::now());

        match self.transport.begin_reconnect() {
            Ok(()) => {
                self.reconnect_pending = true;
                self.poll_reconnect();
            }
            Err(e) => {
                tracing::debug!(error = %e, "Reconnection failed");
                self.connection = ConnectionState::Failed;
            }
        }
    }

    fn poll_reconnect(&mut self) {
        match self.transport.poll_connect() {
            Ok(ConnectStatus::Pending) => tracing::trace!("Reconnection in progress"),
            Ok(ConnectStatus::Connected) => {
                self.reconnect_pending = false;
                self.establish();

                // Replay can lose the fresh stream again
                if self.is_connected() {
                    tracing::info!(endpoint = ?self.endpoint, "Reconnected");
                    self.telemetry.record(&TelemetryEvent::Reconnected {
                        blocked_cells: self.blocked.len(),
                    });
                }
            }
            Err(e) => {
                self.reconnect_pending = false;
                tracing::debug!(error = %e, "Reconnection failed");
                self.connection = ConnectionState::Failed;
            }
        }
    }

    /// Enter `Connected` on a fresh stream and replay cached state.
    ///
    /// An in-flight request is abandoned, not resumed.
    fn establish(&mut self) {
        self.connection = ConnectionState::Connected;
        self.frames.clear();
        self.accumulator.reset();
        self.request = RequestState::Idle;
        self.replay();
    }

    /// Send the cached world, then every blocked cell in insertion order.
    fn replay(&mut self) {
        if let Some(world) = self.world {
            self.send_command(Command::InitWorld {
                width: world.width,
                height: world.height,
                service: world.service,
            });
        }

        let cells: Vec<Cell> = self.blocked.iter().copied().collect();
        for cell in cells {
            if !self.is_connected() {
                return;
            }
            self.send_command(Command::SetBlocked { cell });
        }
    }

    fn send_command(&mut self, command: Command) {
        match self.codec.encode(&command) {
            Ok(bytes) => self.send_bytes(&bytes),
            Err(e) => tracing::warn!(?command, error = %e, "Command not sent"),
        }
    }

    fn send_bytes(&mut self, bytes: &[u8]) {
        tracing::trace!(frame = %String::from_utf8_lossy(bytes), "Sending");
        if let Err(e) = self.transport.send(bytes) {
            self.connection_lost(e);
        }
    }

    /// Mark the connection failed. The request state is left alone: a
    /// pending request stalls until the next reconnection clears it.
    fn connection_lost(&mut self, reason: impl Display) {
        if self.is_connected() {
            tracing::warn!(%reason, "Connection lost");
            self.telemetry.record(&TelemetryEvent::ConnectionLost);
        }
        self.connection = ConnectionState::Failed;
        self.transport.close();
    }
}

impl<T: Transport> Drop for Client<T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}
