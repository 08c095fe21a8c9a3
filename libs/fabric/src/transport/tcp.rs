use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::transport::{
    with_timeout, write_message, FrameBuffer, Transport, TransportListener,
};

/// TCP transport carrying multi-frame messages
///
/// Every message is a 4-byte big-endian frame count followed by each frame
/// with its own 4-byte big-endian length prefix. Received bytes collect in a
/// [`FrameBuffer`] that outlives each `receive` call, so a receive that times
/// out halfway through a message can simply be retried.
pub struct TcpTransport {
    reader: OwnedReadHalf,
    inbound: FrameBuffer,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl TcpTransport {
    /// Connect without any timeouts
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::builder().address(addr).connect().await
    }

    pub async fn connect_timeout(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        Self::builder()
            .address(addr)
            .connect_timeout(timeout)
            .connect()
            .await
    }

    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::default()
    }

    /// Wrap an accepted or externally opened stream
    pub fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: read,
            inbound: FrameBuffer::new(),
            writer: write,
            peer,
            send_timeout: None,
            receive_timeout: None,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.writer.local_addr()?)
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frames: &[Vec<u8>]) -> Result<()> {
        let op = write_message(&mut self.writer, frames);
        with_timeout(self.send_timeout, "Send", op).await
    }

    async fn receive(&mut self) -> Result<Vec<Vec<u8>>> {
        let limit = self.receive_timeout;
        let op = async {
            loop {
                if let Some(frames) = self.inbound.try_extract()? {
                    return Ok(frames);
                }
                // read_buf is cancel safe: bytes are either in the buffer or unread
                if self.reader.read_buf(self.inbound.read_target()).await? == 0 {
                    return Err(Error::ConnectionClosed);
                }
            }
        };
        with_timeout(limit, "Receive", op).await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    fn peer(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

/// Server side: hands out one [`TcpTransport`] per accepted connection
pub struct TcpTransportListener {
    listener: TcpListener,
}

impl TcpTransportListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
        })
    }

    /// Accept a connection, returning it with the remote address
    pub async fn accept(&self) -> Result<(TcpTransport, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((TcpTransport::from_stream(stream, peer), peer))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The socket itself is released on drop
    pub async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl TransportListener for TcpTransportListener {
    type Transport = TcpTransport;

    async fn accept(&self) -> Result<TcpTransport> {
        TcpTransportListener::accept(self)
            .await
            .map(|(transport, _)| transport)
    }

    async fn close(&mut self) -> Result<()> {
        TcpTransportListener::close(self).await
    }
}

/// Client-side connection settings
#[derive(Debug, Default, Clone)]
pub struct TcpTransportBuilder {
    address: Option<SocketAddr>,
    connect_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    receive_timeout: Option<Duration>,
}

impl TcpTransportBuilder {
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.address = Some(addr);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Limit on writing one whole message
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Limit on waiting for the next message
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    pub async fn connect(self) -> Result<TcpTransport> {
        let addr = self
            .address
            .ok_or_else(|| Error::Custom("No address to connect to".to_string()))?;

        let stream = with_timeout(self.connect_timeout, "Connect", async {
            Ok(TcpStream::connect(addr).await?)
        })
        .await?;
        stream.set_nodelay(true)?;

        let mut transport = TcpTransport::from_stream(stream, addr);
        transport.send_timeout = self.send_timeout;
        transport.receive_timeout = self.receive_timeout;
        Ok(transport)
    }
}
