//! Minimal STOMP client.
//!
//! - [`Frame`] and the [`parser`]/[`codec`] modules turn frames into wire
//!   bytes and back, tolerating frames split across reads.
//! - [`Transport`] abstracts the byte stream; [`TcpTransport`] is the tokio
//!   implementation.
//! - [`Client`] runs a single connection: handshake, one subscription,
//!   sending, polling for messages and disconnecting.
//! - [`connect_with_retry`] retries the handshake with backoff at startup.
//!
//! ```ignore
//! use stompline::{Client, ClientConfig, RetryPolicy, TcpTransport, connect_with_retry};
//!
//! let mut client = Client::new(TcpTransport::new(), ClientConfig::new("activemq", 61613));
//! connect_with_retry(&mut client, &RetryPolicy::default()).await?;
//! client.send_message("/queue/ProjectQueue", "hello").await?;
//! client.disconnect().await?;
//! ```

pub mod client;
pub mod codec;
pub mod frame;
pub mod parser;
pub mod subscription;
pub mod supervisor;
pub mod transport;

pub use client::{
    Client, ClientConfig, ClientError, ConnectionState, HandshakeError, SessionInfo,
    negotiate_heartbeats, parse_heartbeat_header,
};
pub use codec::{CodecError, StompCodec, encode, encode_into};
pub use frame::{Command, Frame};
pub use parser::{DEFAULT_MAX_FRAME_SIZE, ProtocolError, decode, decode_with_limit};
pub use subscription::{AckMode, DEFAULT_SUBSCRIPTION_ID, Subscription};
pub use supervisor::{Backoff, ExhaustedError, RetryPolicy, connect_with_retry};
pub use transport::{
    AddressPolicy, ConnectError, DEFAULT_PORT, TcpTransport, TcpTransportConfig, Transport,
    TransportError,
};
