use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::args::{Cli, Role};
use cli::exit_codes;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stompline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.role {
        Role::Produce { count, interval_ms } => {
            cli::producer::run(&cli, count, Duration::from_millis(interval_ms)).await
        }
        Role::Consume {
            count,
            poll_interval_ms,
        } => cli::consumer::run(&cli, count, Duration::from_millis(poll_interval_ms)).await,
    };

    match result {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err((message, code)) => {
            tracing::error!("{}", message);
            ExitCode::from(code)
        }
    }
}
