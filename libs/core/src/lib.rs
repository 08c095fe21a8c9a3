//! CMW-Light Core - Message model and wire codec
//!
//! Pure, I/O-free building blocks of the CMW-Light client protocol: the
//! self-describing wire-value encoding, the message model and the frame
//! codec that maps a [`Message`] to the frames exchanged on the socket.
//!
//! # Example
//!
//! ```
//! use cmwlight_core::message::{Body, Header, Message, RequestContext};
//! use cmwlight_core::protocol::Protocol;
//!
//! let mut protocol = Protocol::new();
//! let message = Message::Request {
//!     header: Header::new(1, "testdev", "testprop").session_id("testsession"),
//!     body: Body::Get(RequestContext::new("FAIR.SELECTOR.ALL")),
//! };
//!
//! let frames = protocol.encode(&message)?;
//! assert_eq!(frames.len(), 4);
//! assert_eq!(protocol.decode(frames)?, message);
//! # Ok::<(), cmwlight_core::Error>(())
//! ```

pub mod error;
pub mod message;
pub mod protocol;
pub mod tags;
pub mod wire;

// Re-exports for convenience
pub use error::{Error, Result};
pub use message::{Body, Header, Message};
pub use protocol::Protocol;
