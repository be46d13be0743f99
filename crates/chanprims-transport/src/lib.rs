//! Byte-channel transport capability.
//!
//! A transport moves opaque payloads between two endpoints by channel name.
//! It knows nothing about codecs: messengers sit on top of it, hand it
//! correlation tokens for replies, and receive incoming traffic through a
//! [`TransportSink`].
//!
//! [`LoopbackTransport`] connects two endpoints inside one process.

pub mod error;
pub mod loopback;
pub mod traits;

pub use error::{Result, TransportError};
pub use loopback::LoopbackTransport;
pub use traits::{ReplyId, ResponseHandle, Transport, TransportSink};
