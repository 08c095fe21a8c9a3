use cmwlight_core::message::MessageType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encode/decode failure of a protocol message
    #[error("Protocol error: {0}")]
    Protocol(#[from] cmwlight_core::Error),

    /// Body payload codec failure
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("{0} timeout exceeded")]
    Timeout(&'static str),

    #[error("Not connected")]
    NotConnected,

    #[error("Unexpected reply: expected {expected}, got {actual:?}")]
    UnexpectedReply {
        expected: &'static str,
        actual: MessageType,
    },

    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch { client: String, server: String },

    #[error("Unknown subscription {0}")]
    UnknownSubscription(u64),

    #[error("Cannot resolve device '{device}': {reason}")]
    Resolve { device: String, reason: String },

    #[error("{0}")]
    Custom(String),
}

pub type Result<T> = std::result::Result<T, Error>;
