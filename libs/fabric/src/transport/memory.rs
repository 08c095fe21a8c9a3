use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::transport::Transport;

static NEXT_PAIR: AtomicU64 = AtomicU64::new(0);

type Queue = Vec<Vec<u8>>;

/// In-process transport, one half of a connected pair
///
/// Messages are moved through unbounded tokio channels, so `send` never
/// blocks. Closing one half makes the other half's `receive` fail with
/// [`Error::ConnectionClosed`] once it has drained what was already sent.
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<Queue>>,
    rx: mpsc::UnboundedReceiver<Queue>,
    peer: String,
}

impl MemoryTransport {
    /// Create two connected halves
    pub fn pair() -> (Self, Self) {
        let n = NEXT_PAIR.fetch_add(1, Ordering::Relaxed);
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(a_tx),
                rx: b_rx,
                peer: format!("memory://{n}/b"),
            },
            Self {
                tx: Some(b_tx),
                rx: a_rx,
                peer: format!("memory://{n}/a"),
            },
        )
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frames: &[Vec<u8>]) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(Error::ConnectionClosed)?;
        tx.send(frames.to_vec()).map_err(|_| Error::ConnectionClosed)
    }

    async fn receive(&mut self) -> Result<Vec<Vec<u8>>> {
        self.rx.recv().await.ok_or(Error::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}
