use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};

/// Bincode payload codec
///
/// Uses the same fixed-width layout as `bincode::serialize`. An optional
/// byte limit bounds both encoding and decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec {
    limit: Option<u64>,
}

impl BincodeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject payloads larger than `bytes`
    pub fn with_limit(bytes: u64) -> Self {
        Self { limit: Some(bytes) }
    }
}

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let options = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes();
        match self.limit {
            Some(limit) => options.with_limit(limit).serialize(value),
            None => options.serialize(value),
        }
        .map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T> {
        let options = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes();
        match self.limit {
            Some(limit) => options.with_limit(limit).deserialize(bytes),
            None => options.deserialize(bytes),
        }
        .map_err(|e| Error::Codec(e.to_string()))
    }
}
