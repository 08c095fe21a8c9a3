use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

pub mod frame_buffer;
pub mod memory;
pub mod tcp;

pub use self::frame_buffer::FrameBuffer;
pub use self::memory::MemoryTransport;
pub use self::tcp::{TcpTransport, TcpTransportBuilder, TcpTransportListener};

/// Largest single frame accepted from a peer (100MB)
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Most frames accepted in one message
pub const MAX_FRAMES: usize = 64;

/// Transport trait for sending and receiving multi-frame messages
///
/// Each transport instance represents a single connection. Frames of one
/// message arrive together and in order; nothing pairs requests with replies.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one message made of `frames`
    async fn send(&mut self, frames: &[Vec<u8>]) -> Result<()>;

    /// Receive the next complete message
    async fn receive(&mut self) -> Result<Vec<Vec<u8>>>;

    /// Close the transport connection
    async fn close(&mut self) -> Result<()>;

    /// Address of the remote end
    fn peer(&self) -> String;
}

/// Accepts incoming connections as transports
#[async_trait::async_trait]
pub trait TransportListener: Send + Sync {
    type Transport: Transport;

    async fn accept(&self) -> Result<Self::Transport>;

    async fn close(&mut self) -> Result<()>;
}

/// Write `frames` as `u32 count` followed by `u32 length` + bytes per frame
pub(crate) async fn write_message<W>(writer: &mut W, frames: &[Vec<u8>]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if frames.is_empty() || frames.len() > MAX_FRAMES {
        return Err(Error::InvalidFrame(format!(
            "Cannot send a message of {} frames",
            frames.len()
        )));
    }

    let total: usize = frames.iter().map(|f| f.len() + 4).sum::<usize>() + 4;
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&(frames.len() as u32).to_be_bytes());
    for frame in frames {
        let len = u32::try_from(frame.len())
            .map_err(|_| Error::InvalidFrame(format!("Frame too large: {} bytes", frame.len())))?;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(frame);
    }

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Run `op`, failing with [`Error::Timeout`] naming `what` once `limit` passes
pub(crate) async fn with_timeout<T, F>(
    limit: Option<Duration>,
    what: &'static str,
    op: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, op)
            .await
            .map_err(|_| Error::Timeout(what))?,
        None => op.await,
    }
}
