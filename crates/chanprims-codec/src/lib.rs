//! Binary codecs for named platform channels.
//!
//! The standard encoding is self-describing: every value starts with a
//! one-byte type tag, variable-length sizes prefix strings and collections,
//! and numeric blocks are aligned from the start of the buffer. Method calls
//! and result envelopes are layered on top of it.
//!
//! Codecs are stateless values and can be shared across threads freely.

pub mod basic;
pub mod error;
#[cfg(feature = "json")]
pub mod json;
pub mod method;
pub mod standard;
pub mod value;
pub mod wire;

pub use basic::{BinaryCodec, MessageCodec, StringCodec};
pub use error::{CodecError, Result};
pub use method::{
    error_trace, Envelope, EnvelopeError, MethodCall, MethodCodec, RemoteError,
    StandardMethodCodec,
};
pub use num_bigint::BigInt;
pub use standard::StandardMessageCodec;
pub use value::{Value, ValueMap};
pub use wire::{write_alignment, write_size, WireReader};
