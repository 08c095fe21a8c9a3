//! CMW-Light fabric - transports and the client connection
//!
//! Moves the frame sets produced by `cmwlight-core` over a connection and
//! runs the client side of the protocol: handshake, request ids, heartbeats
//! and subscription bookkeeping.
//!
//! # Example
//!
//! ```no_run
//! use cmwlight_core::message::RequestContext;
//! use cmwlight_fabric::{publisher::ChannelPublisher, Client, ClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let addr = "127.0.0.1:7500".parse()?;
//! let mut client = Client::connect_tcp(addr, ClientConfig::new()).await?;
//!
//! let id = client
//!     .subscribe("testdev", "testprop", RequestContext::new("FAIR.SELECTOR.ALL"))
//!     .await?;
//!
//! let (mut publisher, mut events) = ChannelPublisher::channel();
//! loop {
//!     client.poll(&mut publisher).await?;
//!     while let Ok(event) = events.try_recv() {
//!         println!("{} {} {:?}", event.kind.as_str(), event.address, event.message);
//!     }
//! #   let _ = id;
//! }
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod publisher;
pub mod request;
pub mod subscription;
pub mod transport;

// Re-exports for convenience
pub use channel::Channel;
pub use client::{Client, ConnectionState, Housekeeping};
pub use config::ClientConfig;
pub use error::{Error, Result};
