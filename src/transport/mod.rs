//! Transport module - non-blocking byte stream to the server.
//!
//! Provides:
//! - [`Transport`] - the seam the session talks through
//! - [`TcpTransport`] - TCP via `mio` non-blocking sockets
//! - [`MemoryTransport`] - scripted in-memory stream for tests and offline hosts

mod memory;
mod tcp;

pub use memory::{MemoryHandle, MemoryTransport};
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};

use crate::error::Result;

/// Progress of a reconnect started with [`Transport::begin_reconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// Handshake still in progress; poll again later.
    Pending,
    /// Stream is open.
    Connected,
}

/// A non-blocking, reconnectable byte stream.
///
/// Only [`Transport::connect`] may block, bounded by the transport's connect
/// timeout. Everything else returns immediately: reads with nothing
/// available return `Ok(None)`, and reconnects are started and then polled.
pub trait Transport {
    /// Open a connection, replacing any existing one.
    ///
    /// Resolves `host:service` and remembers the result for later
    /// reconnects, even when the connect itself fails.
    fn connect(&mut self, host: &str, service: &str) -> Result<()>;

    /// Start connecting again to the endpoint of the last `connect`,
    /// without waiting for the handshake.
    ///
    /// # Errors
    ///
    /// `NoEndpoint` if `connect` never resolved an address, or the error of
    /// an attempt that failed straight away.
    fn begin_reconnect(&mut self) -> Result<()>;

    /// Check on a reconnect started by `begin_reconnect`.
    ///
    /// An error means the attempt failed and the transport is closed.
    fn poll_connect(&mut self) -> Result<ConnectStatus>;

    /// Queue one frame for sending and push out as much as the socket takes.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever is available.
    ///
    /// - `Ok(None)`: no data right now
    /// - `Ok(Some(0))`: the peer closed the stream
    /// - `Ok(Some(n))`: `n` bytes were written into `buf`
    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Push out bytes a previous `send` could not write.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drop the connection. Safe to call when already closed.
    fn close(&mut self);

    /// Check if a connection is open.
    fn is_open(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, host: &str, service: &str) -> Result<()> {
        (**self).connect(host, service)
    }

    fn begin_reconnect(&mut self) -> Result<()> {
        (**self).begin_reconnect()
    }

    fn poll_connect(&mut self) -> Result<ConnectStatus> {
        (**self).poll_connect()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        (**self).try_recv(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}
