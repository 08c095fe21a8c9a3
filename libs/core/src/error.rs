use thiserror::Error;

use crate::wire::ValueType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The trailing descriptor frame is empty or does not start with HEADER.
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    /// The descriptor does not agree with the frames the request type requires.
    #[error("Descriptor mismatch: expected {expected:?}, got {actual:?}")]
    DescriptorMismatch { expected: Vec<u8>, actual: Vec<u8> },

    #[error("Unknown field tag '{tag}' in {context}")]
    UnknownFieldTag { context: &'static str, tag: String },

    #[error("Unsupported value type {value_type:?} for key '{key}'")]
    UnsupportedValueType { key: String, value_type: ValueType },

    #[error("Duplicate key '{0}' in wire map")]
    DuplicateKey(String),

    #[error("Missing field '{tag}' in {context}")]
    MissingField { context: &'static str, tag: &'static str },

    #[error("Field '{tag}' has type {actual:?}, expected {expected:?}")]
    UnexpectedFieldType {
        tag: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("Unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),

    #[error("Unknown request type {0}")]
    UnknownRequestType(i32),

    #[error("Unknown update type {0}")]
    UnknownUpdateType(i32),

    #[error("Unknown wire type code 0x{0:02x}")]
    UnknownTypeCode(u8),

    #[error("Missing frame: {0}")]
    MissingFrame(&'static str),

    #[error("Unexpected frames: {0}")]
    UnexpectedFrames(String),

    #[error("Truncated input: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Invalid UTF-8 in wire string")]
    InvalidUtf8,

    #[error("Unbalanced start/end markers: {0}")]
    UnbalancedMarkers(String),

    /// Fields inconsistent with the message's request type or direction.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
