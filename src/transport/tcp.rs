//! TCP transport over a non-blocking `mio` socket.
//!
//! [`Transport::connect`] resolves the endpoint and connects with a bounded
//! blocking attempt, so the first connect either succeeds or fails before
//! returning. The resolved addresses are kept. Reconnects never resolve or
//! block: `begin_reconnect` starts a non-blocking connect to the next kept
//! address and `poll_connect` reports when the handshake has finished,
//! failed, or run past the connect timeout.
//!
//! # Example
//!
//! ```ignore
//! use raig_client::transport::{TcpTransport, Transport};
//!
//! let mut transport = TcpTransport::new();
//! transport.connect("127.0.0.1", "27000")?;
//! ```

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use mio::net::TcpStream;

use super::{ConnectStatus, Transport};
use crate::error::{RaigError, Result};

/// Default time allowed for one connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Non-blocking TCP connection to the server.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    /// Bytes accepted by `send` but not yet written to the socket.
    outbound: BytesMut,
    connect_timeout: Duration,
    /// Addresses resolved by the last `connect`.
    addrs: Vec<SocketAddr>,
    /// Next address `begin_reconnect` tries.
    next_addr: usize,
    /// Start of the handshake in progress, if any.
    connecting: Option<Instant>,
}

impl TcpTransport {
    /// Create an unconnected transport with the default connect timeout.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create an unconnected transport with a custom connect timeout.
    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self {
            stream: None,
            outbound: BytesMut::new(),
            connect_timeout,
            addrs: Vec::new(),
            next_addr: 0,
            connecting: None,
        }
    }

    /// Bytes waiting to be written.
    #[inline]
    pub fn pending_bytes(&self) -> usize {
        self.outbound.len()
    }

    /// Check if a reconnect handshake is in progress.
    #[inline]
    pub fn is_connecting(&self) -> bool {
        self.connecting.is_some()
    }

    /// The stream, once the handshake has finished.
    fn live_stream(&mut self) -> Result<&mut TcpStream> {
        if self.connecting.is_some() {
            return Err(RaigError::NotConnected);
        }
        self.stream.as_mut().ok_or(RaigError::NotConnected)
    }

    fn open(&self) -> Result<TcpStream> {
        let mut last_err = None;

        for addr in &self.addrs {
            match std::net::TcpStream::connect_timeout(addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    return Ok(TcpStream::from_std(stream));
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "Connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(e) => RaigError::Io(e),
            None => RaigError::NoEndpoint("last endpoint".to_string()),
        })
    }

    /// Drop a failed handshake and report why it failed.
    fn abandon(&mut self, error: std::io::Error) -> RaigError {
        tracing::debug!(error = %error, "Reconnect attempt failed");
        self.close();
        RaigError::Io(error)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, service: &str) -> Result<()> {
        self.close();

        let target = format!("{}:{}", host, service);
        self.addrs = target.to_socket_addrs()?.collect();
        self.next_addr = 0;

        let stream = self.open().map_err(|e| match e {
            RaigError::NoEndpoint(_) => RaigError::NoEndpoint(target),
            e => e,
        })?;
        self.stream = Some(stream);
        Ok(())
    }

    fn begin_reconnect(&mut self) -> Result<()> {
        self.close();
        if self.addrs.is_empty() {
            return Err(RaigError::NoEndpoint("last endpoint".to_string()));
        }

        // Rotate so one dead address does not shadow the rest
        let addr = self.addrs[self.next_addr % self.addrs.len()];
        self.next_addr = self.next_addr.wrapping_add(1);

        tracing::trace!(%addr, "Starting reconnect");
        self.stream = Some(TcpStream::connect(addr)?);
        self.connecting = Some(Instant::now());
        Ok(())
    }

    fn poll_connect(&mut self) -> Result<ConnectStatus> {
        let Some(started) = self.connecting else {
            return if self.stream.is_some() {
                Ok(ConnectStatus::Connected)
            } else {
                Err(RaigError::NotConnected)
            };
        };
        let Some(stream) = self.stream.as_ref() else {
            self.connecting = None;
            return Err(RaigError::NotConnected);
        };

        match stream.take_error() {
            Ok(Some(e)) | Err(e) => return Err(self.abandon(e)),
            Ok(None) => {}
        }

        match stream.peer_addr() {
            Ok(_) => {
                if let Err(e) = stream.set_nodelay(true) {
                    return Err(self.abandon(e));
                }
                self.connecting = None;
                Ok(ConnectStatus::Connected)
            }
            Err(e) if e.kind() == ErrorKind::NotConnected => {
                if started.elapsed() >= self.connect_timeout {
                    let timeout = std::io::Error::new(ErrorKind::TimedOut, "connect timed out");
                    return Err(self.abandon(timeout));
                }
                Ok(ConnectStatus::Pending)
            }
            Err(e) => Err(self.abandon(e)),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.live_stream()?;
        self.outbound.extend_from_slice(bytes);
        self.flush()
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let stream = self.live_stream()?;
        match stream.read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(RaigError::Io(e)),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if self.connecting.is_some() {
            return Err(RaigError::NotConnected);
        }
        let stream = self.stream.as_mut().ok_or(RaigError::NotConnected)?;

        while !self.outbound.is_empty() {
            match stream.write(&self.outbound) {
                Ok(0) => {
                    return Err(RaigError::Io(std::io::Error::new(
                        ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    )));
                }
                Ok(n) => self.outbound.advance(n),
                // Kernel buffer full; the rest goes out on a later flush
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(RaigError::Io(e)),
            }
        }

        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.outbound.clear();
        self.connecting = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some() && self.connecting.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;
    use std::time::Instant;

    fn recv_until(transport: &mut TcpTransport, want: usize) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while out.len() < want && Instant::now() < deadline {
            match transport.try_recv(&mut buf).unwrap() {
                Some(0) => break,
                Some(n) => out.extend_from_slice(&buf[..n]),
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        out
    }

    #[test]
    fn test_not_connected_errors() {
        let mut transport = TcpTransport::new();
        let mut buf = [0u8; 8];

        assert!(!transport.is_open());
        assert!(matches!(transport.send(b"x"), Err(RaigError::NotConnected)));
        assert!(matches!(
            transport.try_recv(&mut buf),
            Err(RaigError::NotConnected)
        ));
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let mut transport = TcpTransport::with_timeout(Duration::from_millis(500));
        assert!(transport.connect("127.0.0.1", &port.to_string()).is_err());
        assert!(!transport.is_open());
    }

    #[test]
    fn test_send_and_receive() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", &port.to_string()).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        // Nothing sent yet: non-blocking read comes back empty
        let mut buf = [0u8; 16];
        assert_eq!(transport.try_recv(&mut buf).unwrap(), None);

        transport.send(b"04000000000000").unwrap();
        let mut got = [0u8; 14];
        server.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"04000000000000");

        server.write_all(b"hello").unwrap();
        assert_eq!(recv_until(&mut transport, 5), b"hello");
    }

    #[test]
    fn test_peer_close_reads_zero() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", &port.to_string()).unwrap();
        let (server, _) = listener.accept().unwrap();
        drop(server);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut buf = [0u8; 16];
        let mut closed = false;
        while Instant::now() < deadline {
            match transport.try_recv(&mut buf) {
                Ok(Some(0)) | Err(_) => {
                    closed = true;
                    break;
                }
                _ => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        assert!(closed);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut transport = TcpTransport::new();
        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert_eq!(transport.pending_bytes(), 0);
    }

    fn poll_until_settled(transport: &mut TcpTransport) -> Result<ConnectStatus> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match transport.poll_connect() {
                Ok(ConnectStatus::Pending) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(1));
                }
                other => return other,
            }
        }
    }

    #[test]
    fn test_reconnect_without_endpoint() {
        let mut transport = TcpTransport::new();
        assert!(matches!(
            transport.begin_reconnect(),
            Err(RaigError::NoEndpoint(_))
        ));
        assert!(!transport.is_connecting());
    }

    #[test]
    fn test_reconnect_completes_without_blocking() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", &port.to_string()).unwrap();
        let _first = listener.accept().unwrap();

        transport.begin_reconnect().unwrap();
        assert!(!transport.is_open());
        assert!(matches!(transport.send(b"x"), Err(RaigError::NotConnected)));

        assert_eq!(
            poll_until_settled(&mut transport).unwrap(),
            ConnectStatus::Connected
        );
        assert!(transport.is_open());
        assert!(!transport.is_connecting());

        let (mut server, _) = listener.accept().unwrap();
        transport.send(b"04000000000000").unwrap();
        let mut got = [0u8; 14];
        server.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"04000000000000");
    }

    #[test]
    fn test_reconnect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = TcpTransport::new();
        transport.connect("127.0.0.1", &port.to_string()).unwrap();
        drop(listener);

        // Refusal may surface at once or on a later poll
        let failed = match transport.begin_reconnect() {
            Err(_) => true,
            Ok(()) => poll_until_settled(&mut transport).is_err(),
        };
        assert!(failed);
        assert!(!transport.is_open());
        assert!(!transport.is_connecting());
    }
}
