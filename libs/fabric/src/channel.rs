use std::net::SocketAddr;

use cmwlight_core::message::Message;
use cmwlight_core::protocol::Protocol;
use tracing::trace;

use crate::error::Result;
use crate::transport::{TcpTransport, Transport};

/// Message-level channel over one connection
///
/// Combines a transport with the frame codec. The codec's scratch buffers
/// belong to this channel alone.
pub struct Channel {
    transport: Box<dyn Transport>,
    protocol: Protocol,
}

impl Channel {
    /// Create a channel from an existing transport
    pub fn from_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            protocol: Protocol::new(),
        }
    }

    /// Open a TCP channel
    pub async fn tcp(addr: SocketAddr) -> Result<Self> {
        let transport = TcpTransport::connect(addr).await?;
        Ok(Self::from_transport(transport))
    }

    /// Encode and send one message
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frames = self.protocol.encode(message)?;
        trace!(
            message_type = ?message.message_type(),
            frames = frames.len(),
            "sending"
        );
        let sent = self.transport.send(&frames).await;
        self.protocol.recycle(frames);
        sent
    }

    /// Receive and decode one message
    pub async fn receive(&mut self) -> Result<Message> {
        let frames = self.receive_frames().await?;
        self.decode(frames)
    }

    /// Receive one message without decoding it
    pub async fn receive_frames(&mut self) -> Result<Vec<Vec<u8>>> {
        let frames = self.transport.receive().await?;
        trace!(frames = frames.len(), "received");
        Ok(frames)
    }

    /// Decode frames obtained from [`Channel::receive_frames`]
    pub fn decode(&mut self, frames: Vec<Vec<u8>>) -> Result<Message> {
        Ok(self.protocol.decode(frames)?)
    }

    /// Address of the remote end
    pub fn peer(&self) -> String {
        self.transport.peer()
    }

    /// Close the channel
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }
}
