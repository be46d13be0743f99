//! Single-subscriber event streams.
//!
//! The subscriber controls the stream with two method calls on the channel,
//! `listen` and `cancel`. The producer answers them and pushes events back on
//! the same channel name: a success envelope per event, an error envelope per
//! error event, and a message with no bytes at end of stream.
//!
//! At most one stream is active per channel. A `listen` while a stream is
//! active cancels the old one first, and sinks of superseded or cancelled
//! streams silently drop whatever they are asked to send.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use bytes::Bytes;
use chanprims_codec::{
    CodecError, EnvelopeError, MethodCodec, RemoteError, StandardMethodCodec, Value,
};
use futures_core::Stream;
use futures_util::future::{self, FutureExt};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::error::{MethodError, Result};
use crate::messenger::{lock, BinaryMessageHandler, BinaryMessenger};
use crate::method::{MethodChannel, GENERIC_ERROR_CODE};

const LISTEN: &str = "listen";
const CANCEL: &str = "cancel";

/// Producer-side callbacks of an [`EventChannel`].
pub trait StreamHandler: Send + Sync {
    /// A subscriber started listening. Events go through `sink`, which may
    /// be used from inside this call.
    fn on_listen(&self, arguments: Value, sink: EventSink) -> std::result::Result<(), MethodError>;

    /// The current stream is being torn down. Arguments are null when the
    /// stream is superseded by a new `listen`.
    fn on_cancel(&self, arguments: Value) -> std::result::Result<(), MethodError>;
}

/// [`StreamHandler`] built from two closures.
pub struct FnStreamHandler<L, C> {
    listen: L,
    cancel: C,
}

impl<L, C> FnStreamHandler<L, C>
where
    L: Fn(Value, EventSink) -> std::result::Result<(), MethodError> + Send + Sync,
    C: Fn(Value) -> std::result::Result<(), MethodError> + Send + Sync,
{
    pub fn new(listen: L, cancel: C) -> Self {
        Self { listen, cancel }
    }
}

impl<L, C> StreamHandler for FnStreamHandler<L, C>
where
    L: Fn(Value, EventSink) -> std::result::Result<(), MethodError> + Send + Sync,
    C: Fn(Value) -> std::result::Result<(), MethodError> + Send + Sync,
{
    fn on_listen(&self, arguments: Value, sink: EventSink) -> std::result::Result<(), MethodError> {
        (self.listen)(arguments, sink)
    }

    fn on_cancel(&self, arguments: Value) -> std::result::Result<(), MethodError> {
        (self.cancel)(arguments)
    }
}

/// Write side of one stream session.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    session: u64,
    channel: String,
    codec: Arc<dyn MethodCodec>,
    messenger: Weak<dyn BinaryMessenger>,
    active: Arc<AtomicU64>,
    ended: AtomicBool,
}

impl EventSink {
    /// Whether this sink's session is current and not ended.
    pub fn is_active(&self) -> bool {
        !self.inner.ended.load(Ordering::Acquire)
            && self.inner.active.load(Ordering::Acquire) == self.inner.session
    }

    /// Send an event. A no-op on an inactive sink.
    pub fn success(&self, event: impl Into<Value>) -> Result<()> {
        if !self.is_active() {
            trace!(
                channel = %self.inner.channel,
                session = self.inner.session,
                "dropping event from inactive sink"
            );
            return Ok(());
        }
        let bytes = self.inner.codec.encode_success_envelope(&event.into())?;
        self.emit(Some(bytes))
    }

    /// Send an error event. A no-op on an inactive sink.
    pub fn error(
        &self,
        code: &str,
        message: Option<&str>,
        details: impl Into<Value>,
    ) -> Result<()> {
        if !self.is_active() {
            trace!(
                channel = %self.inner.channel,
                session = self.inner.session,
                "dropping error from inactive sink"
            );
            return Ok(());
        }
        let bytes = self
            .inner
            .codec
            .encode_error_envelope(code, message, &details.into(), None)?;
        self.emit(Some(bytes))
    }

    /// Signal end of stream. Only the first call on an active sink sends.
    pub fn end_of_stream(&self) -> Result<()> {
        if self.inner.active.load(Ordering::Acquire) != self.inner.session
            || self.inner.ended.swap(true, Ordering::AcqRel)
        {
            return Ok(());
        }
        debug!(channel = %self.inner.channel, session = self.inner.session, "end of stream");
        self.emit(None)
    }

    fn emit(&self, payload: Option<Bytes>) -> Result<()> {
        let Some(messenger) = self.inner.messenger.upgrade() else {
            trace!(channel = %self.inner.channel, "messenger gone, dropping event");
            return Ok(());
        };
        messenger.send(&self.inner.channel, payload)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("channel", &self.inner.channel)
            .field("session", &self.inner.session)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Producer-side state behind a registered stream handler.
struct IncomingStreams {
    channel: String,
    codec: Arc<dyn MethodCodec>,
    messenger: Weak<dyn BinaryMessenger>,
    handler: Arc<dyn StreamHandler>,
    active: Arc<AtomicU64>,
    next_session: AtomicU64,
}

impl IncomingStreams {
    fn on_message(&self, bytes: Option<Bytes>) -> Option<Bytes> {
        let Some(bytes) = bytes else {
            warn!(channel = %self.channel, "stream control call without payload");
            return None;
        };
        let call = match self.codec.decode_method_call(&bytes) {
            Ok(call) => call,
            Err(err) => {
                warn!(
                    channel = %self.channel,
                    error = %err,
                    "dropping undecodable stream control call"
                );
                return None;
            }
        };
        match call.method.as_str() {
            LISTEN => self.listen(call.arguments),
            CANCEL => self.cancel(call.arguments),
            other => {
                debug!(channel = %self.channel, method = other, "unknown stream control method");
                None
            }
        }
    }

    fn listen(&self, arguments: Value) -> Option<Bytes> {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let previous = self.active.swap(session, Ordering::AcqRel);
        if previous != 0 {
            debug!(channel = %self.channel, previous, session, "superseding event stream");
            if let Err(err) = self.handler.on_cancel(Value::Null) {
                error!(
                    channel = %self.channel,
                    error = %err,
                    "failed to close existing event stream"
                );
            }
        }

        let sink = EventSink {
            inner: Arc::new(SinkInner {
                session,
                channel: self.channel.clone(),
                codec: Arc::clone(&self.codec),
                messenger: Weak::clone(&self.messenger),
                active: Arc::clone(&self.active),
                ended: AtomicBool::new(false),
            }),
        };
        match self.handler.on_listen(arguments, sink) {
            Ok(()) => {
                debug!(channel = %self.channel, session, "event stream opened");
                self.reply(self.codec.encode_success_envelope(&Value::Null))
            }
            Err(err) => {
                let _ = self
                    .active
                    .compare_exchange(session, 0, Ordering::AcqRel, Ordering::Acquire);
                error!(channel = %self.channel, error = %err, "failed to open event stream");
                self.error_reply(&err.to_string())
            }
        }
    }

    fn cancel(&self, arguments: Value) -> Option<Bytes> {
        let previous = self.active.swap(0, Ordering::AcqRel);
        if previous == 0 {
            return self.error_reply("No active stream to cancel.");
        }
        match self.handler.on_cancel(arguments) {
            Ok(()) => {
                debug!(channel = %self.channel, session = previous, "event stream cancelled");
                self.reply(self.codec.encode_success_envelope(&Value::Null))
            }
            Err(err) => {
                error!(channel = %self.channel, error = %err, "failed to close event stream");
                self.error_reply(&err.to_string())
            }
        }
    }

    fn error_reply(&self, message: &str) -> Option<Bytes> {
        self.reply(self.codec.encode_error_envelope(
            GENERIC_ERROR_CODE,
            Some(message),
            &Value::Null,
            None,
        ))
    }

    fn reply(&self, encoded: std::result::Result<Bytes, CodecError>) -> Option<Bytes> {
        encoded
            .inspect_err(|err| {
                warn!(channel = %self.channel, error = %err, "failed to encode stream reply");
            })
            .ok()
    }
}

/// A named channel for streams of events.
#[derive(Clone, Debug)]
pub struct EventChannel {
    control: MethodChannel,
}

impl EventChannel {
    /// Channel using the [`StandardMethodCodec`].
    pub fn new(name: impl Into<String>, messenger: Arc<dyn BinaryMessenger>) -> Result<Self> {
        Self::with_codec(name, Arc::new(StandardMethodCodec::default()), messenger)
    }

    pub fn with_codec(
        name: impl Into<String>,
        codec: Arc<dyn MethodCodec>,
        messenger: Arc<dyn BinaryMessenger>,
    ) -> Result<Self> {
        Ok(Self {
            control: MethodChannel::with_codec(name, codec, messenger)?,
        })
    }

    pub fn name(&self) -> &str {
        self.control.name()
    }

    /// Serve streams on this channel through `handler`.
    pub fn set_stream_handler(&self, handler: Arc<dyn StreamHandler>) -> Result<()> {
        let streams = Arc::new(IncomingStreams {
            channel: self.name().to_string(),
            codec: Arc::clone(self.control.codec()),
            messenger: Arc::downgrade(self.control.messenger()),
            handler,
            active: Arc::new(AtomicU64::new(0)),
            next_session: AtomicU64::new(1),
        });
        let binary: BinaryMessageHandler = Arc::new(move |bytes: Option<Bytes>| {
            future::ready(streams.on_message(bytes)).boxed()
        });
        self.control
            .messenger()
            .set_message_handler(self.name(), Some(binary))
    }

    pub fn clear_stream_handler(&self) -> Result<()> {
        self.control.messenger().set_message_handler(self.name(), None)
    }

    /// Subscribe to the peer's stream on this channel.
    ///
    /// Installs a handler for incoming events, then sends `listen`. If the
    /// peer rejects the subscription the handler is removed again.
    pub async fn receive_stream(&self, arguments: impl Into<Value>) -> Result<EventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        let tx = Mutex::new(Some(tx));
        let codec = Arc::clone(self.control.codec());
        let channel = self.name().to_string();
        let binary: BinaryMessageHandler = Arc::new(move |bytes: Option<Bytes>| {
            forward_event(&channel, &*codec, &tx, bytes);
            future::ready(None).boxed()
        });
        let messenger = self.control.messenger();
        messenger.set_message_handler(self.name(), Some(binary))?;

        if let Err(err) = self
            .control
            .invoke_method_and_await_reply(LISTEN, arguments)
            .await
        {
            if let Err(clear_err) = messenger.set_message_handler(self.name(), None) {
                warn!(channel = %self.name(), error = %clear_err, "failed to remove event handler");
            }
            return Err(err);
        }
        Ok(EventStream {
            control: self.control.clone(),
            rx,
        })
    }
}

/// Result of one received event: the event value or an error event.
pub type EventResult = std::result::Result<Value, RemoteError>;

fn forward_event(
    channel: &str,
    codec: &dyn MethodCodec,
    tx: &Mutex<Option<mpsc::UnboundedSender<EventResult>>>,
    bytes: Option<Bytes>,
) {
    let mut tx = lock(tx);
    let Some(bytes) = bytes else {
        if tx.take().is_some() {
            debug!(channel, "event stream ended by peer");
        }
        return;
    };
    let event = match codec.decode_envelope(&bytes) {
        Ok(value) => Ok(value),
        Err(EnvelopeError::Remote(err)) => Err(err),
        Err(EnvelopeError::Codec(err)) => {
            warn!(channel, error = %err, "dropping undecodable event");
            return;
        }
    };
    match tx.as_ref() {
        Some(sender) => {
            if sender.send(event).is_err() {
                trace!(channel, "event stream receiver dropped");
            }
        }
        None => trace!(channel, "event after end of stream"),
    }
}

/// Subscriber side of an event stream.
///
/// Yields events until the producer ends the stream. Also usable as a
/// [`futures_core::Stream`].
pub struct EventStream {
    control: MethodChannel,
    rx: mpsc::UnboundedReceiver<EventResult>,
}

impl EventStream {
    /// The next event, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<EventResult> {
        self.rx.recv().await
    }

    /// Stop receiving and ask the producer to cancel the stream.
    pub async fn cancel(self, arguments: impl Into<Value>) -> Result<()> {
        let messenger = self.control.messenger();
        messenger.set_message_handler(self.control.name(), None)?;
        self.control
            .invoke_method_and_await_reply(CANCEL, arguments)
            .await?;
        Ok(())
    }
}

impl Stream for EventStream {
    type Item = EventResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("channel", &self.control.name())
            .finish()
    }
}
