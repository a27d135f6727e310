//! Byte-stream transport used by the [`Client`](crate::Client).
//!
//! The [`Transport`] trait is the only seam that touches the network; the
//! client drives it with whole encoded frames on the way out and arbitrary
//! chunks on the way in. [`TcpTransport`] is the production implementation.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Default STOMP port.
pub const DEFAULT_PORT: u16 = 61613;

/// Failures while establishing a transport connection.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The host name could not be resolved, or resolved to nothing.
    #[error("failed to resolve {host}: {source}")]
    Dns {
        host: String,
        #[source]
        source: io::Error,
    },
    /// Every candidate address refused the connection or was unreachable.
    #[error("connection to {addr} failed: {source}")]
    RefusedOrUnreachable {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// No candidate address accepted the connection within the timeout.
    #[error("connection to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },
}

/// Failures on an established transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer closed the stream, or the transport was never connected.
    #[error("connection closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// A bidirectional byte stream to the broker.
///
/// Implementations hold at most one open connection. `receive` must be
/// bounded in time: when nothing arrives before the implementation's read
/// timeout it returns an empty `Bytes` rather than blocking forever.
#[async_trait]
pub trait Transport: Send {
    /// Open a connection to `host:port`.
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), ConnectError>;

    /// Write all of `bytes` to the stream.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max_bytes`. An empty result means the read timed out.
    async fn receive(&mut self, max_bytes: usize) -> Result<Bytes, TransportError>;

    /// Close the connection. Safe to call repeatedly or before `connect`.
    async fn close(&mut self);

    /// Whether a connection is currently open.
    fn is_open(&self) -> bool;
}

/// Which resolved addresses [`TcpTransport`] attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressPolicy {
    /// Try every resolved address in order until one connects.
    #[default]
    AllAddresses,
    /// Only try the first resolved address.
    FirstOnly,
}

/// Options for [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Upper bound for each individual address connect attempt.
    pub connect_timeout: Duration,
    /// Upper bound for a single `receive` call.
    pub read_timeout: Duration,
    pub address_policy: AddressPolicy,
    /// Disable Nagle's algorithm on the socket.
    pub nodelay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_millis(500),
            address_policy: AddressPolicy::AllAddresses,
            nodelay: true,
        }
    }
}

impl TcpTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn address_policy(mut self, policy: AddressPolicy) -> Self {
        self.address_policy = policy;
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

/// TCP implementation of [`Transport`] on top of tokio.
///
/// The socket is released when the transport is closed or dropped.
#[derive(Debug, Default)]
pub struct TcpTransport {
    config: TcpTransportConfig,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TcpTransportConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.config
    }

    /// Address of the connected peer, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ConnectError> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| ConnectError::Dns {
                host: host.to_string(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(ConnectError::Dns {
                host: host.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            });
        }
        Ok(match self.config.address_policy {
            AddressPolicy::AllAddresses => addrs,
            AddressPolicy::FirstOnly => addrs.into_iter().take(1).collect(),
        })
    }

    /// Try `addrs` in order and keep the first connection that succeeds.
    ///
    /// The address policy is not applied here; [`Transport::connect`]
    /// applies it while resolving. The error of the last failed address is
    /// returned when none connects.
    pub async fn connect_addrs(&mut self, addrs: &[SocketAddr]) -> Result<(), ConnectError> {
        self.close().await;
        let mut last_err = None;
        for &addr in addrs {
            debug!(%addr, "trying broker address");
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr)).await
            {
                Ok(Ok(stream)) => {
                    if self.config.nodelay {
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!(%addr, error = %e, "failed to set TCP_NODELAY");
                        }
                    }
                    self.stream = Some(stream);
                    return Ok(());
                }
                Ok(Err(source)) => {
                    debug!(%addr, error = %source, "address refused or unreachable");
                    last_err = Some(ConnectError::RefusedOrUnreachable {
                        addr: addr.to_string(),
                        source,
                    });
                }
                Err(_) => {
                    debug!(%addr, "connect attempt timed out");
                    last_err = Some(ConnectError::Timeout {
                        addr: addr.to_string(),
                        timeout: self.config.connect_timeout,
                    });
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ConnectError::RefusedOrUnreachable {
            addr: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "no addresses to try"),
        }))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), ConnectError> {
        self.close().await;
        let addrs = self.resolve(host, port).await?;
        self.connect_addrs(&addrs).await
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self, max_bytes: usize) -> Result<Bytes, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let mut buf = BytesMut::with_capacity(max_bytes);
        let read = tokio::time::timeout(self.config.read_timeout, stream.read_buf(&mut buf)).await;
        match read {
            Err(_) => Ok(Bytes::new()),
            Ok(Ok(0)) => {
                self.stream = None;
                Err(TransportError::Closed)
            }
            Ok(Ok(_)) => Ok(buf.freeze()),
            Ok(Err(e)) => Err(TransportError::Io(e)),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "socket shutdown failed");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
