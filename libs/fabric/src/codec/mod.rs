use cmwlight_core::message::Body;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod bincode;

pub use self::bincode::BincodeCodec;

/// Codec trait for the opaque payload carried in SET, REPLY and
/// NOTIFICATION_DATA bodies
///
/// The protocol layer never looks inside a payload; a codec is how a caller
/// turns its own types into those bytes and back.
pub trait Codec: Send + Sync {
    /// Encode a value into bytes
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode bytes into a value
    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T>;

    /// Decode the payload of a message body
    fn decode_body<T: for<'de> Deserialize<'de>>(&self, body: &Body) -> Result<T> {
        let bytes = body.data().ok_or_else(|| {
            Error::Codec(format!("{:?} body carries no payload", body.request_type()))
        })?;
        self.decode(bytes)
    }
}
