//! Hand-off of decoded replies to downstream consumers

use cmwlight_core::message::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Classification tag attached to every published message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Update,
    Exception,
}

impl EventKind {
    /// Exception bodies publish as `exception`, everything else as `update`
    pub fn of(message: &Message) -> Self {
        match message.body().and_then(|body| body.exception()) {
            Some(_) => Self::Exception,
            None => Self::Update,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Exception => "exception",
        }
    }
}

/// Receiver of decoded messages; buffering and backpressure are its own concern
pub trait EventPublisher {
    fn publish(&mut self, kind: EventKind, address: &str, message: Message) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub kind: EventKind,
    pub address: String,
    pub message: Message,
}

/// Publisher that forwards events into an unbounded tokio channel
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<PublishedEvent>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end consumers read from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PublishedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&mut self, kind: EventKind, address: &str, message: Message) -> Result<()> {
        self.tx
            .send(PublishedEvent {
                kind,
                address: address.to_string(),
                message,
            })
            .map_err(|_| Error::Custom("Event consumer dropped".to_string()))
    }
}

impl EventPublisher for Vec<PublishedEvent> {
    fn publish(&mut self, kind: EventKind, address: &str, message: Message) -> Result<()> {
        self.push(PublishedEvent {
            kind,
            address: address.to_string(),
            message,
        });
        Ok(())
    }
}
