use clap::{Parser, Subcommand};
use stompline::DEFAULT_PORT;

#[derive(Parser)]
#[command(name = "stompline")]
#[command(version)]
#[command(about = "Send or receive a fixed number of STOMP messages")]
pub struct Cli {
    /// Broker host name (also sent as the CONNECT host header)
    #[arg(long, global = true, env = "STOMP_HOST", default_value = "activemq")]
    pub host: String,

    /// Broker STOMP port
    #[arg(long, global = true, env = "STOMP_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Queue or topic to send to / subscribe to
    #[arg(short, long, global = true, env = "STOMP_DESTINATION", default_value = "/queue/ProjectQueue")]
    pub destination: String,

    /// Connection attempts before giving up
    #[arg(long, global = true, env = "STOMP_MAX_ATTEMPTS", default_value_t = 10)]
    pub max_attempts: u32,

    /// Pause between connection attempts in milliseconds
    #[arg(long, global = true, env = "STOMP_RETRY_DELAY_MS", default_value_t = 3000)]
    pub retry_delay_ms: u64,

    /// Only try the first address the host resolves to
    #[arg(long, global = true)]
    pub first_address_only: bool,

    #[command(subcommand)]
    pub role: Role,
}

#[derive(Subcommand)]
pub enum Role {
    /// Send numbered text messages to the destination
    Produce {
        /// Number of messages to send
        #[arg(short = 'n', long, env = "STOMP_MESSAGE_COUNT", default_value_t = 10)]
        count: u32,

        /// Pause between messages in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Subscribe to the destination and wait for messages
    Consume {
        /// Number of messages to wait for
        #[arg(short = 'n', long, env = "STOMP_MESSAGE_COUNT", default_value_t = 10)]
        count: u32,

        /// Pause after an empty poll in milliseconds
        #[arg(long, default_value_t = 100)]
        poll_interval_ms: u64,
    },
}
