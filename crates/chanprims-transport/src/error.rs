/// Errors that can occur in byte-channel transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No sink is attached on the receiving side.
    #[error("no sink attached to receive on channel '{channel}'")]
    Detached { channel: String },

    /// The response handle is unknown or has already been answered.
    #[error("unknown response handle {0}")]
    UnknownResponse(u64),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
