//! Accumulates stream bytes until a whole multi-frame message is present
//!
//! Bytes stay in the buffer until a complete message is extracted, so a
//! read abandoned halfway (for example on a receive timeout) loses nothing;
//! the next read just continues filling the same buffer.

use bytes::{Buf, BytesMut};

use crate::error::{Error, Result};
use crate::transport::{MAX_FRAMES, MAX_FRAME_SIZE};

const PREFIX: usize = 4;

/// Initial capacity and minimum free space before each socket read
pub(crate) const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug)]
pub struct FrameBuffer {
    buffer: BytesMut,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Append raw stream bytes
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet part of an extracted message
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Space for the next socket read, with at least [`READ_CHUNK`] free
    pub(crate) fn read_target(&mut self) -> &mut BytesMut {
        self.buffer.reserve(READ_CHUNK);
        &mut self.buffer
    }

    /// Remove and return the next complete message, if all of it has arrived
    ///
    /// Limits are checked as soon as the relevant prefix is buffered, so an
    /// oversized claim fails before its bytes arrive.
    pub fn try_extract(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        let Some(count) = read_prefix(&self.buffer, 0) else {
            return Ok(None);
        };
        if count == 0 || count > MAX_FRAMES {
            return Err(Error::InvalidFrame(format!(
                "Message declares {count} frames"
            )));
        }

        let mut offset = PREFIX;
        let mut lengths = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(len) = read_prefix(&self.buffer, offset) else {
                return Ok(None);
            };
            if len > MAX_FRAME_SIZE {
                return Err(Error::InvalidFrame(format!(
                    "Frame too large: {len} bytes"
                )));
            }
            offset += PREFIX + len;
            lengths.push(len);
        }
        if self.buffer.len() < offset {
            return Ok(None);
        }

        let mut message = self.buffer.split_to(offset);
        message.advance(PREFIX);
        let frames = lengths
            .into_iter()
            .map(|len| {
                message.advance(PREFIX);
                message.split_to(len).to_vec()
            })
            .collect();
        Ok(Some(frames))
    }
}

fn read_prefix(buffer: &[u8], offset: usize) -> Option<usize> {
    let bytes = buffer.get(offset..offset + PREFIX)?;
    let mut prefix = [0u8; PREFIX];
    prefix.copy_from_slice(bytes);
    Some(u32::from_be_bytes(prefix) as usize)
}
