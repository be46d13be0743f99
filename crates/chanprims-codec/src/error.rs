/// Errors that can occur while encoding or decoding channel messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The buffer is truncated, carries an unknown tag, or has trailing bytes.
    #[error("message corrupted at offset {offset}: {reason}")]
    MessageCorrupted { offset: usize, reason: &'static str },

    /// A method call did not decode to a string method name and one argument value.
    #[error("method call corrupted")]
    MethodCallCorrupted,

    /// A result envelope has an unknown flag or a malformed field layout.
    #[error("envelope corrupted")]
    EnvelopeCorrupted,

    /// The value has no representation in the standard encoding.
    #[error("unsupported value: '{value}' of type '{type_name}'")]
    UnsupportedValue {
        type_name: &'static str,
        value: String,
    },

    /// A length or element count does not fit the 32-bit signed size field.
    #[error("size {0} does not fit the wire size field")]
    SizeOutOfRange(usize),

    /// A string message is not valid UTF-8.
    #[error("invalid UTF-8 in string message: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

impl CodecError {
    pub(crate) fn corrupted(offset: usize, reason: &'static str) -> Self {
        Self::MessageCorrupted { offset, reason }
    }

    /// Returns true for every corruption condition (message, call or envelope).
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::MessageCorrupted { .. } | Self::MethodCallCorrupted | Self::EnvelopeCorrupted
        )
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
