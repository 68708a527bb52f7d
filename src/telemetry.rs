//! Fire-and-forget telemetry.
//!
//! The session reports connection and request milestones to a
//! [`TelemetrySink`]. Recording must never block the game loop and never
//! fail visibly: a sink that cannot deliver an event drops it.
//!
//! [`ChannelTelemetry`] hands events to a `tokio` channel so a background
//! task (for example one posting to a dashboard) can consume them.
//!
//! # Example
//!
//! ```
//! use raig_client::telemetry::{ChannelTelemetry, TelemetryEvent, TelemetrySink};
//!
//! let (sink, mut rx) = ChannelTelemetry::channel(16);
//! sink.record(&TelemetryEvent::ConnectionLost);
//!
//! let event = rx.try_recv().unwrap();
//! assert_eq!(event.to_json().unwrap(), r#"{"event":"connection_lost"}"#);
//! ```

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::path::Cell;

/// A milestone worth reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// `init_connection` succeeded.
    Connected {
        /// Server host.
        host: String,
        /// Server service (port).
        service: String,
    },
    /// The stream closed or a send failed.
    ConnectionLost,
    /// A reconnection succeeded and cached state was replayed.
    Reconnected {
        /// Blocked cells replayed.
        blocked_cells: usize,
    },
    /// A path request was sent.
    PathRequested {
        /// Start cell.
        start: Cell,
        /// Goal cell.
        goal: Cell,
    },
    /// A path request finished.
    PathCompleted {
        /// Cells in the finished path.
        length: usize,
    },
    /// An inbound frame was malformed.
    ProtocolError {
        /// Why the frame was rejected.
        reason: String,
    },
}

impl TelemetryEvent {
    /// Serialize as a single JSON object.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Destination for telemetry events.
pub trait TelemetrySink {
    /// Record an event. Must not block; failures are swallowed.
    fn record(&self, event: &TelemetryEvent);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    #[inline]
    fn record(&self, _event: &TelemetryEvent) {}
}

/// Sink that forwards events to a bounded `tokio` channel.
///
/// Uses `try_send`, so a full or closed channel drops the event instead of
/// waiting.
#[derive(Debug, Clone)]
pub struct ChannelTelemetry {
    tx: mpsc::Sender<TelemetryEvent>,
}

impl ChannelTelemetry {
    /// Wrap an existing sender.
    pub fn new(tx: mpsc::Sender<TelemetryEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn record(&self, event: &TelemetryEvent) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::trace!("Telemetry channel full, event dropped")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::trace!("Telemetry channel closed, event dropped")
                }
            }
        }
    }
}
