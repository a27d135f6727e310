use chrono::Local;
use std::time::Duration;
use tracing::{error, info};

use super::args::Cli;

/// Message id in the form `MSG_<yyyymmdd>_<hhmmss>_INDEX_<n>`.
pub fn message_id(index: u32) -> String {
    format!("MSG_{}_INDEX_{}", Local::now().format("%Y%m%d_%H%M%S"), index)
}

/// Connect, send `count` messages `interval` apart, then disconnect.
///
/// A message that fails to send is logged and skipped; the run still counts
/// as successful once the broker connection was established.
pub async fn run(cli: &Cli, count: u32, interval: Duration) -> Result<(), (String, u8)> {
    let mut client = super::connect(cli).await?;

    info!(count, destination = %cli.destination, "sending messages");
    for i in 1..=count {
        let body = format!("Hello from stompline producer - {}", message_id(i));
        info!("sending message {}/{}: {}", i, count, body);
        match client.send_message(&cli.destination, &body).await {
            Ok(()) => info!("message {} sent", i),
            Err(e) => error!(error = %e, "failed to send message {}", i),
        }
        if i < count {
            tokio::time::sleep(interval).await;
        }
    }

    info!("all messages sent, disconnecting");
    super::disconnect_logged(&mut client).await;
    Ok(())
}
