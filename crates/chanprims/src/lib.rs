//! Named platform channels over a byte-oriented transport.
//!
//! chanprims carries typed messages, method calls and event streams between a
//! host and its embedder over a single byte-channel transport, using a
//! bit-exact standard binary codec.
//!
//! # Crate Structure
//!
//! - [`codec`]: the standard value codec, method codec and pass-through codecs
//! - [`transport`]: the transport capability and an in-process loopback pair
//! - [`channel`]: binary messenger dispatch plus message, method and event channels
//! - [`plugin`]: plugin attach/detach registry (behind `plugin` feature)

/// Re-export codec types.
pub mod codec {
    pub use chanprims_codec::*;
}

/// Re-export transport types.
pub mod transport {
    pub use chanprims_transport::*;
}

/// Re-export channel types.
pub mod channel {
    pub use chanprims_channel::*;
}

/// Re-export plugin types (requires `plugin` feature).
#[cfg(feature = "plugin")]
pub mod plugin {
    pub use chanprims_plugin::*;
}
