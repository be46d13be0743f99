use std::fmt;
use std::sync::Weak;

use bytes::Bytes;

use crate::error::Result;

/// Correlation token attached to a send that expects a reply.
///
/// Allocated by the sender and handed back unchanged through
/// [`TransportSink::on_reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplyId(pub u64);

impl fmt::Display for ReplyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token used to answer one incoming message.
///
/// Allocated by the transport; exactly one response is accepted per handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseHandle(pub u64);

impl fmt::Display for ResponseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives traffic delivered by a [`Transport`].
pub trait TransportSink: Send + Sync {
    /// A message arrived on `channel`. The receiver must answer it through
    /// [`Transport::send_response`] with `response`, with or without a payload.
    fn on_message(&self, channel: &str, payload: Option<Bytes>, response: ResponseHandle);

    /// The reply to an earlier [`Transport::send_with_reply`] arrived.
    fn on_reply(&self, reply: ReplyId, payload: Option<Bytes>);
}

/// A byte-channel transport between this endpoint and its peer.
///
/// Payloads are borrowed only for the duration of each call.
pub trait Transport: Send + Sync {
    /// Route incoming traffic for this endpoint to `sink`.
    fn attach(&self, sink: Weak<dyn TransportSink>);

    /// Fire-and-forget send.
    fn send(&self, channel: &str, payload: Option<&[u8]>) -> Result<()>;

    /// Send a message whose answer is delivered to the sink's `on_reply`
    /// tagged with `reply`.
    fn send_with_reply(&self, channel: &str, payload: Option<&[u8]>, reply: ReplyId)
        -> Result<()>;

    /// Answer an incoming message.
    fn send_response(&self, response: ResponseHandle, payload: Option<&[u8]>) -> Result<()>;

    /// Tell the transport whether this endpoint handles `channel`.
    fn set_listening(&self, channel: &str, listening: bool) -> Result<()>;
}
