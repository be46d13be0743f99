//! Named channels over a binary messenger.
//!
//! A [`DefaultBinaryMessenger`] sits on a byte-channel transport, correlates
//! replies to outgoing sends and dispatches incoming messages to per-channel
//! handlers. Typed channels bind a name and a codec to a messenger:
//!
//! - [`BasicMessageChannel`] for plain messages,
//! - [`MethodChannel`] for method calls with result envelopes,
//! - [`EventChannel`] for single-subscriber event streams.

pub mod basic;
pub mod config;
pub mod error;
pub mod event;
pub mod messenger;
pub mod method;

pub use basic::BasicMessageChannel;
pub use config::{MessengerConfig, DEFAULT_MAX_PAYLOAD};
pub use error::{ChannelError, MethodError, MethodResult, Result};
pub use event::{EventChannel, EventResult, EventSink, EventStream, FnStreamHandler, StreamHandler};
pub use futures_util::future::BoxFuture;
pub use messenger::{BinaryMessageHandler, BinaryMessenger, DefaultBinaryMessenger};
pub use method::{MethodChannel, GENERIC_ERROR_CODE};
