pub mod args;
pub mod consumer;
pub mod producer;

use std::time::Duration;
use stompline::{
    AddressPolicy, Client, ClientConfig, ClientError, ConnectError, ExhaustedError,
    HandshakeError, RetryPolicy, TcpTransport, TcpTransportConfig, Transport, connect_with_retry,
};
use tracing::{error, info};

use args::Cli;

/// Exit codes for different error conditions
pub mod exit_codes {
    /// Successful execution
    pub const SUCCESS: u8 = 0;
    /// Network/connection error (e.g., host unreachable, connection refused)
    pub const NETWORK_ERROR: u8 = 1;
    /// The broker answered CONNECT with an ERROR frame
    pub const REJECTED: u8 = 2;
    /// Protocol error (e.g., unexpected server response)
    pub const PROTOCOL_ERROR: u8 = 3;
}

/// Build a TCP client from the command line and connect it with retries.
pub async fn connect(cli: &Cli) -> Result<Client<TcpTransport>, (String, u8)> {
    let policy = if cli.first_address_only {
        AddressPolicy::FirstOnly
    } else {
        AddressPolicy::AllAddresses
    };
    let transport = TcpTransport::with_config(TcpTransportConfig::new().address_policy(policy));
    let mut client = Client::new(transport, ClientConfig::new(&cli.host, cli.port));

    let retry = RetryPolicy::fixed(cli.max_attempts, Duration::from_millis(cli.retry_delay_ms));
    let attempts = connect_with_retry(&mut client, &retry)
        .await
        .map_err(|e| format_exhausted(&e, &cli.host, cli.port))?;
    info!(attempts, "connected to {}:{}", cli.host, cli.port);
    Ok(client)
}

/// Disconnect, logging a DISCONNECT that could not be delivered.
///
/// Returns whether the broker was told about the disconnect; the client is
/// `Closed` either way.
pub async fn disconnect_logged<T: Transport>(client: &mut Client<T>) -> bool {
    match client.disconnect().await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "disconnect failed");
            false
        }
    }
}

/// Map a startup failure to a message and exit code.
pub fn format_exhausted(err: &ExhaustedError, host: &str, port: u16) -> (String, u8) {
    let prefix = format!(
        "Failed to connect to {}:{} after {} attempt(s)",
        host, port, err.attempts
    );
    match &err.last {
        ClientError::HandshakeFailed(HandshakeError::Connect(ConnectError::Dns { .. })) => (
            format!("{}: could not resolve host", prefix),
            exit_codes::NETWORK_ERROR,
        ),
        ClientError::HandshakeFailed(HandshakeError::Rejected { message, body }) => {
            let mut msg = format!("{}: broker rejected connection: {}", prefix, message);
            if let Some(body) = body {
                msg.push_str(&format!(" ({})", body));
            }
            (msg, exit_codes::REJECTED)
        }
        ClientError::HandshakeFailed(
            HandshakeError::Protocol(_) | HandshakeError::UnexpectedCommand(_),
        ) => (
            format!("{}: {}", prefix, err.last),
            exit_codes::PROTOCOL_ERROR,
        ),
        other => (format!("{}: {}", prefix, other), exit_codes::NETWORK_ERROR),
    }
}
