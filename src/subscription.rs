use crate::frame::{Command, Frame};

/// Subscription id used when the caller does not pick one.
pub const DEFAULT_SUBSCRIPTION_ID: &str = "sub-1";

/// Subscription acknowledgement modes.
///
/// Only `auto` is supported: the broker considers a message acknowledged as
/// soon as it is sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    Auto,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
        }
    }
}

/// The single active subscription of a [`Client`](crate::Client).
///
/// Created by `Client::subscribe` and dropped when the client disconnects;
/// there is no UNSUBSCRIBE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: String,
    destination: String,
    ack: AckMode,
}

impl Subscription {
    pub(crate) fn new(id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            ack: AckMode::Auto,
        }
    }

    /// Returns the local subscription id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the destination this subscription listens to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn ack(&self) -> AckMode {
        self.ack
    }

    /// The SUBSCRIBE frame announcing this subscription to the broker.
    pub(crate) fn to_frame(&self) -> Frame {
        Frame::new(Command::Subscribe)
            .header("destination", &self.destination)
            .header("id", &self.id)
            .header("ack", self.ack.as_str())
    }
}
