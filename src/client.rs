use bytes::BytesMut;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use crate::codec::{CodecError, StompCodec, encode_into};
use crate::frame::{Command, Frame};
use crate::parser::{DEFAULT_MAX_FRAME_SIZE, ProtocolError};
use crate::subscription::{DEFAULT_SUBSCRIPTION_ID, Subscription};
use crate::transport::{ConnectError, DEFAULT_PORT, Transport, TransportError};

/// Lifecycle of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why a CONNECT/CONNECTED exchange did not produce a session.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// The broker answered CONNECT with an ERROR frame.
    #[error("server rejected connection: {message}")]
    Rejected {
        message: String,
        body: Option<String>,
    },
    #[error("expected CONNECTED, got {0}")]
    UnexpectedCommand(Command),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The broker closed the stream before answering.
    #[error("connection closed before CONNECTED was received")]
    Closed,
    #[error("no CONNECTED frame within {0:?}")]
    Timeout(Duration),
}

impl From<TransportError> for HandshakeError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Closed => HandshakeError::Closed,
            TransportError::Io(e) => HandshakeError::Io(e),
        }
    }
}

impl From<CodecError> for HandshakeError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Protocol(e) => HandshakeError::Protocol(e),
            CodecError::Io(e) => HandshakeError::Io(e),
        }
    }
}

/// Errors returned by [`Client`] operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The operation is not valid in the client's current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
    /// Only one subscription per connection is supported.
    #[error("already subscribed as '{0}'")]
    AlreadySubscribed(String),
    #[error("handshake failed: {0}")]
    HandshakeFailed(#[from] HandshakeError),
    /// Writing a frame to the transport failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] TransportError),
    /// Reading from the transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl From<CodecError> for ClientError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Protocol(e) => ClientError::Protocol(e),
            CodecError::Io(e) => ClientError::Transport(TransportError::Io(e)),
        }
    }
}

/// Options for a [`Client`], in builder style.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker host; also sent as the CONNECT `host` header.
    pub host: String,
    pub port: u16,
    /// Value of the CONNECT `accept-version` header.
    pub accept_version: String,
    /// Value of the CONNECT `heart-beat` header ("cx,cy" in milliseconds).
    pub heartbeat: String,
    /// Upper bound for the whole CONNECT/CONNECTED exchange.
    pub handshake_timeout: Duration,
    /// Largest frame accepted from the broker.
    pub max_frame_size: usize,
    /// Maximum bytes requested from the transport per receive.
    pub read_chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            accept_version: "1.0,1.1,1.2".to_string(),
            heartbeat: "0,0".to_string(),
            handshake_timeout: Duration::from_secs(5),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_chunk_size: 4096,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn accept_version(mut self, version: impl Into<String>) -> Self {
        self.accept_version = version.into();
        self
    }

    pub fn heartbeat(mut self, heartbeat: impl Into<String>) -> Self {
        self.heartbeat = heartbeat.into();
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }
}

/// Parse the STOMP `heart-beat` header value (format: "cx,cy").
///
/// Returns a tuple `(cx, cy)` in milliseconds. Missing or invalid fields
/// default to `0`.
pub fn parse_heartbeat_header(header: &str) -> (u64, u64) {
    let mut parts = header.split(',');
    let cx = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let cy = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    (cx, cy)
}

/// Negotiate heartbeat intervals between client and server.
///
/// Returns `(outgoing, incoming)`, each `None` when disabled in that
/// direction. An enabled direction uses the larger of the two sides' values.
pub fn negotiate_heartbeats(
    client_out: u64,
    client_in: u64,
    server_out: u64,
    server_in: u64,
) -> (Option<Duration>, Option<Duration>) {
    let enabled = |ours: u64, theirs: u64| {
        if ours == 0 || theirs == 0 {
            None
        } else {
            Some(Duration::from_millis(ours.max(theirs)))
        }
    };
    (enabled(client_out, server_in), enabled(client_in, server_out))
}

/// What the broker reported in its CONNECTED frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionInfo {
    /// Protocol version chosen by the broker (absent means 1.0).
    pub version: Option<String>,
    pub server: Option<String>,
    pub session: Option<String>,
    /// Negotiated client-to-broker heart-beat interval. Never scheduled.
    pub heartbeat_out: Option<Duration>,
    /// Negotiated broker-to-client heart-beat interval. Never enforced.
    pub heartbeat_in: Option<Duration>,
}

impl SessionInfo {
    fn from_connected(frame: &Frame, client_heartbeat: &str) -> Self {
        let (cx, cy) = parse_heartbeat_header(client_heartbeat);
        let (sx, sy) = parse_heartbeat_header(frame.get_header("heart-beat").unwrap_or("0,0"));
        let (heartbeat_out, heartbeat_in) = negotiate_heartbeats(cx, cy, sx, sy);
        Self {
            version: frame.get_header("version").map(str::to_string),
            server: frame.get_header("server").map(str::to_string),
            session: frame.get_header("session").map(str::to_string),
            heartbeat_out,
            heartbeat_in,
        }
    }
}

/// A single STOMP connection serving both the sending and receiving roles.
///
/// The client owns its transport and a reassembly buffer. Frames rarely line
/// up with transport reads, so received bytes accumulate in the buffer and
/// complete frames are split off the front; bytes belonging to the next
/// frame stay buffered for the following call.
///
/// All methods take `&mut self`: one task owns the client and issues one
/// call at a time. Dropping the client drops the transport, which releases
/// the socket even when [`disconnect`](Client::disconnect) was never called.
pub struct Client<T: Transport> {
    transport: T,
    config: ClientConfig,
    state: ConnectionState,
    buffer: BytesMut,
    codec: StompCodec,
    subscription: Option<Subscription>,
    session: Option<SessionInfo>,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let codec = StompCodec::with_max_frame_size(config.max_frame_size);
        Self {
            transport,
            config,
            state: ConnectionState::Disconnected,
            buffer: BytesMut::new(),
            codec,
            subscription: None,
            session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Session details from the last successful handshake.
    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Number of received bytes not yet consumed as a frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn require_connected(&self, operation: &'static str) -> Result<(), ClientError> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ClientError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let mut out = BytesMut::new();
        encode_into(&frame, &mut out);
        debug!(command = %frame.command, bytes = out.len(), "sending frame");
        self.transport.send(&out).await
    }

    /// Connect the transport and perform the CONNECT/CONNECTED exchange.
    ///
    /// Only valid from `Disconnected`. On failure the transport is closed,
    /// buffered bytes are discarded and the client returns to
    /// `Disconnected`, so the call may be retried.
    pub async fn handshake(&mut self) -> Result<(), ClientError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ClientError::InvalidState {
                operation: "handshake",
                state: self.state,
            });
        }
        self.state = ConnectionState::Connecting;

        match self.exchange_connect().await {
            Ok(session) => {
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    version = session.version.as_deref().unwrap_or("1.0"),
                    "connected to broker"
                );
                self.session = Some(session);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                warn!(host = %self.config.host, port = self.config.port, error = %e, "handshake failed");
                self.transport.close().await;
                self.buffer.clear();
                self.state = ConnectionState::Disconnected;
                Err(ClientError::HandshakeFailed(e))
            }
        }
    }

    async fn exchange_connect(&mut self) -> Result<SessionInfo, HandshakeError> {
        self.buffer.clear();
        self.transport
            .connect(&self.config.host, self.config.port)
            .await?;

        let connect = Frame::new(Command::Connect)
            .header("accept-version", &self.config.accept_version)
            .header("host", &self.config.host)
            .header("heart-beat", &self.config.heartbeat);
        self.write_frame(connect).await?;

        let deadline = Instant::now() + self.config.handshake_timeout;
        let frame = loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                break frame;
            }
            let read = tokio::time::timeout_at(
                deadline,
                self.transport.receive(self.config.read_chunk_size),
            )
            .await;
            match read {
                Err(_) => return Err(HandshakeError::Timeout(self.config.handshake_timeout)),
                Ok(chunk) => {
                    let chunk = chunk?;
                    if chunk.is_empty() && Instant::now() >= deadline {
                        return Err(HandshakeError::Timeout(self.config.handshake_timeout));
                    }
                    self.buffer.extend_from_slice(&chunk);
                }
            }
        };

        match frame.command {
            Command::Connected => Ok(SessionInfo::from_connected(&frame, &self.config.heartbeat)),
            Command::Error => Err(HandshakeError::Rejected {
                message: frame
                    .get_header("message")
                    .unwrap_or("unknown error")
                    .to_string(),
                body: (!frame.body.is_empty()).then(|| frame.body_text()),
            }),
            other => Err(HandshakeError::UnexpectedCommand(other)),
        }
    }

    /// Subscribe to `destination` with the default id `sub-1`.
    pub async fn subscribe(&mut self, destination: &str) -> Result<(), ClientError> {
        self.subscribe_with_id(destination, DEFAULT_SUBSCRIPTION_ID)
            .await
    }

    /// Send a SUBSCRIBE frame with `ack:auto`.
    ///
    /// No response is awaited. A write failure leaves the client
    /// `Connected`; whether to retry or disconnect is the caller's call.
    pub async fn subscribe_with_id(&mut self, destination: &str, id: &str) -> Result<(), ClientError> {
        self.require_connected("subscribe")?;
        if let Some(existing) = &self.subscription {
            return Err(ClientError::AlreadySubscribed(existing.id().to_string()));
        }

        let subscription = Subscription::new(id, destination);
        self.write_frame(subscription.to_frame())
            .await
            .map_err(ClientError::SendFailed)?;
        info!(destination, id, "subscribed");
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Send `body` as a `text/plain` message to `destination`.
    ///
    /// The body must not contain NUL bytes; it is written verbatim with a
    /// matching `content-length` header.
    pub async fn send_message(&mut self, destination: &str, body: &str) -> Result<(), ClientError> {
        self.require_connected("send")?;
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "text/plain")
            .header("content-length", body.len().to_string())
            .set_body(body.as_bytes().to_vec());
        self.write_frame(frame)
            .await
            .map_err(ClientError::SendFailed)
    }

    fn decode_buffered(&mut self) -> Result<Option<Frame>, ClientError> {
        match self.codec.decode(&mut self.buffer) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                // framing is lost; nothing buffered can be trusted
                self.buffer.clear();
                Err(e.into())
            }
        }
    }

    /// Return the next MESSAGE frame if one is available.
    ///
    /// A frame already complete in the buffer is returned without touching
    /// the transport. Otherwise one bounded receive is performed and at most
    /// one frame decoded. Frames other than MESSAGE are consumed and
    /// ignored. `Ok(None)` means nothing complete arrived; pacing between
    /// calls is up to the caller.
    pub async fn poll_frame(&mut self) -> Result<Option<Frame>, ClientError> {
        self.require_connected("poll")?;

        let frame = match self.decode_buffered()? {
            Some(frame) => Some(frame),
            None => {
                let chunk = self.transport.receive(self.config.read_chunk_size).await?;
                if chunk.is_empty() {
                    return Ok(None);
                }
                self.buffer.extend_from_slice(&chunk);
                self.decode_buffered()?
            }
        };

        match frame {
            Some(frame) if frame.command == Command::Message => Ok(Some(frame)),
            Some(frame) if frame.command == Command::Error => {
                warn!(
                    error_message = frame.get_header("message").unwrap_or(""),
                    body = %frame.body_text(),
                    "broker sent ERROR frame"
                );
                Ok(None)
            }
            Some(frame) => {
                debug!(command = %frame.command, "ignoring frame");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Return the body of the next MESSAGE frame as text, if one is
    /// available. See [`poll_frame`](Client::poll_frame).
    pub async fn poll_message(&mut self) -> Result<Option<String>, ClientError> {
        Ok(self.poll_frame().await?.map(|frame| frame.body_text()))
    }

    /// Close the session.
    ///
    /// From `Connected` a DISCONNECT frame is sent first (no receipt is
    /// requested). The transport is closed in every state and the client
    /// ends `Closed`; calling again is a no-op. A failed DISCONNECT write is
    /// reported but the client is still closed.
    pub async fn disconnect(&mut self) -> Result<(), ClientError> {
        let sent = match self.state {
            ConnectionState::Closed => return Ok(()),
            ConnectionState::Connected => self
                .write_frame(Frame::new(Command::Disconnect))
                .await
                .map_err(ClientError::SendFailed),
            ConnectionState::Disconnected | ConnectionState::Connecting => Ok(()),
        };

        self.transport.close().await;
        self.buffer.clear();
        self.subscription = None;
        self.state = ConnectionState::Closed;
        match &sent {
            Ok(()) => info!(host = %self.config.host, "disconnected from broker"),
            Err(e) => warn!(host = %self.config.host, error = %e, "DISCONNECT not delivered"),
        }
        sent
    }
}
