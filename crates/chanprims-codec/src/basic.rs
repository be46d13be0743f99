use bytes::Bytes;

use crate::error::Result;

/// Encodes typed messages to bytes and back.
///
/// A `None` message encodes to no bytes, and no bytes decode to `None`.
/// Implementations are stateless and shared freely between channels.
pub trait MessageCodec: Send + Sync {
    type Message;

    fn encode_message(&self, message: Option<&Self::Message>) -> Result<Option<Bytes>>;

    fn decode_message(&self, message: Option<&[u8]>) -> Result<Option<Self::Message>>;
}

/// Pass-through codec for raw byte messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl MessageCodec for BinaryCodec {
    type Message = Bytes;

    fn encode_message(&self, message: Option<&Bytes>) -> Result<Option<Bytes>> {
        Ok(message.cloned())
    }

    fn decode_message(&self, message: Option<&[u8]>) -> Result<Option<Bytes>> {
        Ok(message.map(Bytes::copy_from_slice))
    }
}

/// UTF-8 string codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl MessageCodec for StringCodec {
    type Message = String;

    fn encode_message(&self, message: Option<&String>) -> Result<Option<Bytes>> {
        Ok(message.map(|text| Bytes::copy_from_slice(text.as_bytes())))
    }

    fn decode_message(&self, message: Option<&[u8]>) -> Result<Option<String>> {
        message
            .map(|bytes| Ok(std::str::from_utf8(bytes)?.to_owned()))
            .transpose()
    }
}
