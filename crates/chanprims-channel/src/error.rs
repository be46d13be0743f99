use std::error::Error;

use chanprims_codec::{CodecError, EnvelopeError, RemoteError};
use chanprims_transport::TransportError;

/// Errors that can occur in messenger and channel operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    /// Channel names must be non-empty.
    #[error("channel name must not be empty")]
    EmptyName,

    /// Encoding or decoding failed locally.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport rejected the operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The peer answered with an error envelope.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The peer has no handler for the channel or method.
    #[error("no handler for method '{method}' on channel '{channel}'")]
    MissingPlugin { channel: String, method: String },

    /// An outgoing payload exceeds the configured limit.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// No tokio runtime was available to run message handlers.
    #[error("no tokio runtime available for message dispatch")]
    NoRuntime,

    /// The messenger was dropped before the reply arrived.
    #[error("reply on channel '{channel}' dropped before completion")]
    ReplyDropped { channel: String },
}

impl From<EnvelopeError> for ChannelError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Remote(remote) => Self::Remote(remote),
            EnvelopeError::Codec(codec) => Self::Codec(codec),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Failure returned by method call and stream handlers.
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    /// Sent back as an error envelope with this code, message and details.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// No handler for the method. Answered with an empty reply, which the
    /// caller sees as [`ChannelError::MissingPlugin`].
    #[error("method not implemented")]
    NotImplemented,

    /// Any other failure, sent back with the code `"error"`.
    #[error(transparent)]
    Failed(Box<dyn Error + Send + Sync>),
}

impl MethodError {
    pub fn failed(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }
}

impl From<ChannelError> for MethodError {
    fn from(err: ChannelError) -> Self {
        Self::Failed(Box::new(err))
    }
}

pub type MethodResult = std::result::Result<chanprims_codec::Value, MethodError>;
