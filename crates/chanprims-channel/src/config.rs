/// Default maximum outgoing payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Configuration for a [`DefaultBinaryMessenger`](crate::DefaultBinaryMessenger).
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// Maximum size of an outgoing message in bytes. Default: 16 MiB.
    ///
    /// Responses to incoming messages are not limited.
    pub max_payload_size: usize,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
