use std::time::Duration;
use stompline::ClientError;
use tracing::{error, info, warn};

use super::args::Cli;
use super::exit_codes;

/// Connect, subscribe and wait until `count` messages have arrived.
///
/// Protocol errors drop the unparseable bytes and keep polling. Transport
/// failures end the run; there is no reconnect once subscribed.
pub async fn run(cli: &Cli, count: u32, poll_interval: Duration) -> Result<(), (String, u8)> {
    let mut client = super::connect(cli).await?;

    if let Err(e) = client.subscribe(&cli.destination).await {
        super::disconnect_logged(&mut client).await;
        return Err((
            format!("Failed to subscribe to {}: {}", cli.destination, e),
            exit_codes::NETWORK_ERROR,
        ));
    }

    info!(destination = %cli.destination, expected = count, "waiting for messages");
    let mut received = 0u32;
    while received < count {
        match client.poll_message().await {
            Ok(Some(message)) => {
                received += 1;
                info!("received message {}/{}: {}", received, count, message);
            }
            Ok(None) => tokio::time::sleep(poll_interval).await,
            Err(ClientError::Protocol(e)) => {
                warn!(error = %e, "discarding malformed input");
            }
            Err(e) => {
                error!(error = %e, received, "lost connection to broker");
                super::disconnect_logged(&mut client).await;
                return Err((
                    format!("Connection lost after {} of {} messages: {}", received, count, e),
                    exit_codes::NETWORK_ERROR,
                ));
            }
        }
    }

    info!(received, "all messages received, shutting down");
    super::disconnect_logged(&mut client).await;
    Ok(())
}
