//! Bounded-retry connection establishment.
//!
//! Brokers often come up after their clients (for example when started
//! together by a container orchestrator), so startup retries the handshake
//! a fixed number of times before giving up.

use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::client::{Client, ClientError};
use crate::transport::Transport;

/// Delay schedule between handshake attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same pause after every failed attempt.
    Fixed(Duration),
    /// Start at `initial` and double after each failure, never exceeding `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Pause to apply after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(d) => d,
            Backoff::Exponential { initial, max } => {
                let factor = 1u32 << attempt.saturating_sub(1).min(31);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// How many times to attempt the handshake and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Backoff::Fixed(Duration::from_secs(3)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// `max_attempts` attempts separated by a fixed pause.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }
}

/// The retry budget ran out, or a failure occurred that retrying cannot fix.
#[derive(Error, Debug)]
#[error("failed to connect after {attempts} attempt(s): {last}")]
pub struct ExhaustedError {
    /// Attempts actually made.
    pub attempts: u32,
    /// Failure reported by the final attempt.
    #[source]
    pub last: ClientError,
}

/// Drive [`Client::handshake`] until it succeeds or the policy is exhausted.
///
/// Sleeps between attempts but never after the last one, so a broker that
/// never comes up costs `(max_attempts - 1)` backoff delays plus the attempts
/// themselves. Only handshake failures are retried; any other error (such as
/// calling this on a client that is not `Disconnected`) is returned at once.
///
/// Returns the number of the attempt that succeeded.
pub async fn connect_with_retry<T: Transport>(
    client: &mut Client<T>,
    policy: &RetryPolicy,
) -> Result<u32, ExhaustedError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        info!(attempt, max_attempts, "connection attempt");
        match client.handshake().await {
            Ok(()) => return Ok(attempt),
            Err(e @ ClientError::HandshakeFailed(_)) if attempt < max_attempts => {
                let delay = policy.backoff.delay(attempt);
                warn!(attempt, error = %e, "retrying in {:?}", delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(last) => {
                warn!(attempts = attempt, error = %last, "giving up on broker connection");
                return Err(ExhaustedError {
                    attempts: attempt,
                    last,
                });
            }
        }
    }
}
