//! In-memory transport driven through a shared handle.
//!
//! The session owns a [`MemoryTransport`]; the test (or a host running
//! without a server) keeps the [`MemoryHandle`] and plays the server's part:
//! queue inbound bytes, hang up, refuse reconnects, inspect what was sent.
//!
//! # Example
//!
//! ```
//! use raig_client::transport::{MemoryTransport, Transport};
//!
//! let (mut transport, handle) = MemoryTransport::new();
//! transport.connect("server", "27000").unwrap();
//!
//! transport.send(b"hello").unwrap();
//! assert_eq!(handle.sent_bytes(), b"hello");
//!
//! handle.push_inbound(b"world");
//! let mut buf = [0u8; 16];
//! assert_eq!(transport.try_recv(&mut buf).unwrap(), Some(5));
//! ```

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use super::{ConnectStatus, Transport};
use crate::error::{RaigError, Result};

/// One scripted inbound delivery.
#[derive(Debug)]
enum Inbound {
    Data(Bytes),
    Close,
}

#[derive(Debug, Default)]
struct MemoryState {
    open: bool,
    refuse_connect: bool,
    fail_sends: bool,
    inbound: VecDeque<Inbound>,
    sent: Vec<Bytes>,
    connects: usize,
    endpoint: Option<(String, String)>,
    /// Endpoint of the last `connect`, kept for reconnects.
    target: Option<(String, String)>,
    /// Reconnect handshake in progress.
    connecting: bool,
    /// Keep reconnects pending until released.
    hold_connects: bool,
}

fn refused() -> RaigError {
    RaigError::Io(std::io::Error::new(
        ErrorKind::ConnectionRefused,
        "connection refused",
    ))
}

impl MemoryState {
    fn complete_connect(&mut self) {
        self.open = true;
        self.connecting = false;
        self.connects += 1;
        self.endpoint = self.target.clone();
    }
}

/// Transport half owned by the session.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

/// Control half kept by the test or host.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    state: Arc<Mutex<MemoryState>>,
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryTransport {
    /// Create a transport and its control handle.
    pub fn new() -> (Self, MemoryHandle) {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        (
            Self {
                state: state.clone(),
            },
            MemoryHandle { state },
        )
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, host: &str, service: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.open = false;
        state.connecting = false;
        state.target = Some((host.to_string(), service.to_string()));
        if state.refuse_connect {
            return Err(refused());
        }
        state.complete_connect();
        Ok(())
    }

    fn begin_reconnect(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.open = false;
        state.connecting = false;
        if state.target.is_none() {
            return Err(RaigError::NoEndpoint("last endpoint".to_string()));
        }
        if state.refuse_connect {
            return Err(refused());
        }
        state.connecting = true;
        Ok(())
    }

    fn poll_connect(&mut self) -> Result<ConnectStatus> {
        let mut state = lock(&self.state);
        if !state.connecting {
            return if state.open {
                Ok(ConnectStatus::Connected)
            } else {
                Err(RaigError::NotConnected)
            };
        }
        if state.hold_connects {
            return Ok(ConnectStatus::Pending);
        }
        if state.refuse_connect {
            state.connecting = false;
            return Err(refused());
        }
        state.complete_connect();
        Ok(ConnectStatus::Connected)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(RaigError::NotConnected);
        }
        if state.fail_sends {
            state.open = false;
            return Err(RaigError::Io(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        state.sent.push(Bytes::copy_from_slice(bytes));
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(RaigError::NotConnected);
        }

        match state.inbound.pop_front() {
            None => Ok(None),
            Some(Inbound::Close) => {
                state.open = false;
                Ok(Some(0))
            }
            Some(Inbound::Data(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    // Caller's buffer was short; the rest stays at the front
                    let rest = chunk.split_off(n);
                    state.inbound.push_front(Inbound::Data(rest));
                }
                Ok(Some(n))
            }
        }
    }

    fn close(&mut self) {
        let mut state = lock(&self.state);
        state.open = false;
        state.connecting = false;
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }
}

impl MemoryHandle {
    /// Queue bytes for the client to read. Each call is one delivery; a
    /// delivery is never merged with the next one.
    pub fn push_inbound(&self, bytes: &[u8]) {
        lock(&self.state)
            .inbound
            .push_back(Inbound::Data(Bytes::copy_from_slice(bytes)));
    }

    /// Close the stream from the server side after already queued deliveries.
    pub fn hang_up(&self) {
        lock(&self.state).inbound.push_back(Inbound::Close);
    }

    /// Make subsequent connect attempts fail (or succeed again). A reconnect
    /// already in progress fails on its next poll.
    pub fn refuse_connections(&self, refuse: bool) {
        lock(&self.state).refuse_connect = refuse;
    }

    /// Keep reconnect handshakes pending (or let them finish again).
    pub fn hold_connects(&self, hold: bool) {
        lock(&self.state).hold_connects = hold;
    }

    /// Check if a reconnect handshake is in progress.
    pub fn is_connecting(&self) -> bool {
        lock(&self.state).connecting
    }

    /// Make subsequent sends fail and drop the connection.
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.state).fail_sends = fail;
    }

    /// Every successful send, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        lock(&self.state).sent.clone()
    }

    /// Every successful send concatenated.
    pub fn sent_bytes(&self) -> Vec<u8> {
        lock(&self.state)
            .sent
            .iter()
            .flat_map(|b| b.iter().copied())
            .collect()
    }

    /// Remove and return the sends recorded so far.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut lock(&self.state).sent)
    }

    /// Number of successful sends.
    pub fn send_count(&self) -> usize {
        lock(&self.state).sent.len()
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        lock(&self.state).connects
    }

    /// Host and service of the last successful connect.
    pub fn endpoint(&self) -> Option<(String, String)> {
        lock(&self.state).endpoint.clone()
    }

    /// Check if the client side is connected.
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Deliveries not yet read by the client.
    pub fn pending_inbound(&self) -> usize {
        lock(&self.state).inbound.len()
    }
}
