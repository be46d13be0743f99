use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use chanprims_transport::{ReplyId, ResponseHandle, Transport, TransportSink};
use futures_util::future::{self, BoxFuture, FutureExt};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

use crate::config::MessengerConfig;
use crate::error::{ChannelError, Result};

/// Untyped handler for one channel.
///
/// The closure itself runs inline when a message arrives, so work done
/// before building the returned future happens in arrival order. The future
/// is then awaited on the runtime and its output, or no bytes for `None`, is
/// sent back as the response.
pub type BinaryMessageHandler =
    Arc<dyn Fn(Option<Bytes>) -> BoxFuture<'static, Option<Bytes>> + Send + Sync>;

/// Sends byte messages on named channels and dispatches incoming ones.
pub trait BinaryMessenger: Send + Sync {
    /// Fire-and-forget send.
    fn send(&self, channel: &str, message: Option<Bytes>) -> Result<()>;

    /// Send and wait for the peer's reply. `Ok(None)` means the peer had no
    /// handler or answered with no bytes.
    ///
    /// A zero-length reply is reported as `Ok(None)` too, matching native
    /// embedder transports where the two are indistinguishable.
    ///
    /// The message is handed to the transport before this returns; only the
    /// reply is awaited.
    fn send_with_reply(
        &self,
        channel: &str,
        message: Option<Bytes>,
    ) -> BoxFuture<'static, Result<Option<Bytes>>>;

    /// Install the handler for `channel`, or remove it with `None`.
    fn set_message_handler(&self, channel: &str, handler: Option<BinaryMessageHandler>)
        -> Result<()>;
}

struct PendingReply {
    channel: String,
    tx: oneshot::Sender<Option<Bytes>>,
}

/// [`BinaryMessenger`] on top of a [`Transport`].
///
/// Correlated sends get a monotonically increasing reply id; each reply is
/// resolved at most once, and replies for unknown ids are ignored. There is
/// no timeout: a reply that never arrives stays pending until the messenger
/// is dropped, at which point waiters fail with
/// [`ChannelError::ReplyDropped`].
pub struct DefaultBinaryMessenger {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    config: MessengerConfig,
    handlers: Mutex<HashMap<String, BinaryMessageHandler>>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    next_reply_id: AtomicU64,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DefaultBinaryMessenger {
    /// Create a messenger attached to `transport`, running handlers on the
    /// current tokio runtime.
    pub fn new(transport: impl Transport + 'static, config: MessengerConfig) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;
        Ok(Self::with_runtime(transport, config, runtime))
    }

    /// Create a messenger that runs handlers on `runtime`.
    pub fn with_runtime(
        transport: impl Transport + 'static,
        config: MessengerConfig,
        runtime: Handle,
    ) -> Arc<Self> {
        let messenger = Arc::new(Self {
            transport: Arc::new(transport),
            runtime,
            config,
            handlers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_reply_id: AtomicU64::new(0),
        });
        let sink: Weak<dyn TransportSink> = Arc::downgrade(&messenger) as Weak<dyn TransportSink>;
        messenger.transport.attach(sink);
        messenger
    }

    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    /// Number of correlated sends still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Whether a handler is installed for `channel`.
    pub fn has_handler(&self, channel: &str) -> bool {
        lock(&self.handlers).contains_key(channel)
    }

    fn check_size(&self, message: Option<&Bytes>) -> Result<()> {
        let size = message.map_or(0, Bytes::len);
        if size > self.config.max_payload_size {
            return Err(ChannelError::PayloadTooLarge {
                size,
                max: self.config.max_payload_size,
            });
        }
        Ok(())
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(cause: &(dyn Any + Send)) -> &str {
    cause
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| cause.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn respond(
    transport: &dyn Transport,
    channel: &str,
    response: ResponseHandle,
    reply: Option<Bytes>,
) {
    trace!(
        channel,
        %response,
        len = reply.as_ref().map_or(0, Bytes::len),
        "sending response"
    );
    if let Err(err) = transport.send_response(response, reply.as_deref()) {
        warn!(channel, %response, error = %err, "failed to send response");
    }
}

impl BinaryMessenger for DefaultBinaryMessenger {
    fn send(&self, channel: &str, message: Option<Bytes>) -> Result<()> {
        self.check_size(message.as_ref())?;
        trace!(channel, len = message.as_ref().map_or(0, Bytes::len), "send");
        self.transport.send(channel, message.as_deref())?;
        Ok(())
    }

    fn send_with_reply(
        &self,
        channel: &str,
        message: Option<Bytes>,
    ) -> BoxFuture<'static, Result<Option<Bytes>>> {
        if let Err(err) = self.check_size(message.as_ref()) {
            return future::ready(Err(err)).boxed();
        }

        let id = self.next_reply_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(
            id,
            PendingReply {
                channel: channel.to_string(),
                tx,
            },
        );
        debug!(channel, reply_id = id, "send with reply");

        if let Err(err) = self
            .transport
            .send_with_reply(channel, message.as_deref(), ReplyId(id))
        {
            lock(&self.pending).remove(&id);
            return future::ready(Err(err.into())).boxed();
        }

        let channel = channel.to_string();
        async move { rx.await.map_err(|_| ChannelError::ReplyDropped { channel }) }.boxed()
    }

    fn set_message_handler(
        &self,
        channel: &str,
        handler: Option<BinaryMessageHandler>,
    ) -> Result<()> {
        let listening = handler.is_some();
        {
            let mut handlers = lock(&self.handlers);
            match handler {
                Some(handler) => {
                    handlers.insert(channel.to_string(), handler);
                }
                None => {
                    handlers.remove(channel);
                }
            }
        }
        debug!(channel, listening, "message handler updated");
        self.transport.set_listening(channel, listening)?;
        Ok(())
    }
}

impl TransportSink for DefaultBinaryMessenger {
    fn on_message(&self, channel: &str, payload: Option<Bytes>, response: ResponseHandle) {
        let handler = lock(&self.handlers).get(channel).cloned();
        let Some(handler) = handler else {
            debug!(channel, "no handler registered, sending empty response");
            respond(&*self.transport, channel, response, None);
            return;
        };

        // A panicking handler still answers, with no bytes.
        let reply = match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            Ok(reply) => reply,
            Err(cause) => {
                error!(channel, panic = panic_message(&*cause), "message handler panicked");
                respond(&*self.transport, channel, response, None);
                return;
            }
        };
        let transport = Arc::clone(&self.transport);
        let channel = channel.to_string();
        self.runtime.spawn(async move {
            let reply = match AssertUnwindSafe(reply).catch_unwind().await {
                Ok(reply) => reply,
                Err(cause) => {
                    error!(
                        channel = %channel,
                        panic = panic_message(&*cause),
                        "message handler future panicked"
                    );
                    None
                }
            };
            respond(&*transport, &channel, response, reply);
        });
    }

    fn on_reply(&self, reply: ReplyId, payload: Option<Bytes>) {
        let Some(pending) = lock(&self.pending).remove(&reply.0) else {
            warn!(reply_id = reply.0, "reply for unknown or already resolved id");
            return;
        };
        let payload = payload.filter(|bytes| !bytes.is_empty());
        debug!(
            channel = %pending.channel,
            reply_id = reply.0,
            empty = payload.is_none(),
            "reply received"
        );
        if pending.tx.send(payload).is_err() {
            trace!(reply_id = reply.0, "reply waiter went away");
        }
    }
}

impl fmt::Debug for DefaultBinaryMessenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultBinaryMessenger")
            .field("config", &self.config)
            .field("handlers", &lock(&self.handlers).len())
            .field("pending", &self.pending_replies())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use chanprims_transport::LoopbackTransport;

    use super::*;

    fn connected() -> (
        Arc<DefaultBinaryMessenger>,
        Arc<DefaultBinaryMessenger>,
        LoopbackTransport,
    ) {
        let (left, right) = LoopbackTransport::pair();
        let a = DefaultBinaryMessenger::new(left, MessengerConfig::default()).unwrap();
        let b = DefaultBinaryMessenger::new(right.clone(), MessengerConfig::default()).unwrap();
        (a, b, right)
    }

    fn echo_handler() -> BinaryMessageHandler {
        Arc::new(|message: Option<Bytes>| future::ready(message).boxed())
    }

    #[tokio::test]
    async fn reply_resolves_pending_send() {
        let (a, b, _) = connected();
        b.set_message_handler("echo", Some(echo_handler())).unwrap();

        let reply = a
            .send_with_reply("echo", Some(Bytes::from_static(b"hello")))
            .await
            .unwrap();
        assert_eq!(reply, Some(Bytes::from_static(b"hello")));
        assert_eq!(a.pending_replies(), 0);
    }

    #[tokio::test]
    async fn missing_handler_replies_with_no_bytes() {
        let (a, _b, _) = connected();
        let reply = a
            .send_with_reply("nobody", Some(Bytes::from_static(b"x")))
            .await
            .unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn empty_reply_is_normalised_to_none() {
        let (a, b, _) = connected();
        let handler: BinaryMessageHandler =
            Arc::new(|_: Option<Bytes>| future::ready(Some(Bytes::new())).boxed());
        b.set_message_handler("empty", Some(handler)).unwrap();

        assert_eq!(a.send_with_reply("empty", None).await.unwrap(), None);
    }

    fn explode() -> Option<Bytes> {
        panic!("handler failed")
    }

    #[tokio::test]
    async fn panicking_handler_still_responds() {
        let (a, b, right) = connected();
        let handler: BinaryMessageHandler =
            Arc::new(|_: Option<Bytes>| -> BoxFuture<'static, Option<Bytes>> { panic!("boom") });
        b.set_message_handler("fragile", Some(handler)).unwrap();

        let reply = a.send_with_reply("fragile", Some(Bytes::from_static(b"x")));
        assert_eq!(reply.await.unwrap(), None);
        assert_eq!(a.pending_replies(), 0);
        assert_eq!(right.outstanding_responses(), 0);
    }

    #[tokio::test]
    async fn panicking_handler_future_still_responds() {
        let (a, b, right) = connected();
        let handler: BinaryMessageHandler =
            Arc::new(|_: Option<Bytes>| async { explode() }.boxed());
        b.set_message_handler("fragile", Some(handler)).unwrap();

        assert_eq!(a.send_with_reply("fragile", None).await.unwrap(), None);
        assert_eq!(a.pending_replies(), 0);
        assert_eq!(right.outstanding_responses(), 0);

        b.set_message_handler("fragile", Some(echo_handler())).unwrap();
        let reply = a.send_with_reply("fragile", Some(Bytes::from_static(b"ok")));
        assert_eq!(reply.await.unwrap(), Some(Bytes::from_static(b"ok")));
    }

    #[test]
    fn panic_message_reads_string_payloads() {
        let literal = panic::catch_unwind(|| panic!("literal")).unwrap_err();
        assert_eq!(panic_message(&*literal), "literal");
        let formatted = panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(&*formatted), "code 7");
    }

    #[tokio::test]
    async fn handler_body_runs_inline_in_arrival_order() {
        let (a, b, _) = connected();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let handler: BinaryMessageHandler = Arc::new(move |message: Option<Bytes>| {
            recorder.lock().unwrap().push(message);
            future::ready(None).boxed()
        });
        b.set_message_handler("ordered", Some(handler)).unwrap();

        a.send("ordered", Some(Bytes::from_static(b"1"))).unwrap();
        a.send("ordered", Some(Bytes::from_static(b"2"))).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                Some(Bytes::from_static(b"1")),
                Some(Bytes::from_static(b"2"))
            ]
        );
    }

    #[tokio::test]
    async fn response_waits_for_handler_future() {
        let (a, b, _) = connected();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let release_rx = Arc::new(Mutex::new(Some(release_rx)));
        let handler: BinaryMessageHandler = Arc::new(move |_: Option<Bytes>| {
            let gate = release_rx.lock().unwrap().take();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Some(Bytes::from_static(b"done"))
            }
            .boxed()
        });
        b.set_message_handler("slow", Some(handler)).unwrap();

        let reply = a.send_with_reply("slow", None);
        tokio::task::yield_now().await;
        assert_eq!(a.pending_replies(), 1);

        release_tx.send(()).unwrap();
        assert_eq!(reply.await.unwrap(), Some(Bytes::from_static(b"done")));
    }

    #[tokio::test]
    async fn unknown_and_repeated_replies_are_ignored() {
        let (a, b, _) = connected();
        b.set_message_handler("echo", Some(echo_handler())).unwrap();

        a.on_reply(ReplyId(999), Some(Bytes::from_static(b"stray")));
        assert_eq!(a.pending_replies(), 0);

        let reply = a.send_with_reply("echo", Some(Bytes::from_static(b"1"))).await;
        assert!(reply.is_ok());

        // The id of the resolved send is 0; replaying it is a no-op.
        a.on_reply(ReplyId(0), Some(Bytes::from_static(b"again")));
        assert_eq!(a.pending_replies(), 0);
    }

    #[tokio::test]
    async fn reply_ids_increase() {
        let (a, b, _) = connected();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handler: BinaryMessageHandler = Arc::new(move |_: Option<Bytes>| {
            counter.fetch_add(1, Ordering::SeqCst);
            future::pending::<Option<Bytes>>().boxed()
        });
        b.set_message_handler("hang", Some(handler)).unwrap();

        let _first = a.send_with_reply("hang", None);
        let _second = a.send_with_reply("hang", None);
        assert_eq!(a.pending_replies(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(a.next_reply_id.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropping_messenger_fails_waiters() {
        let (a, b, _) = connected();
        let handler: BinaryMessageHandler =
            Arc::new(|_: Option<Bytes>| future::pending::<Option<Bytes>>().boxed());
        b.set_message_handler("hang", Some(handler)).unwrap();

        let reply = a.send_with_reply("hang", None);
        drop(a);
        assert_eq!(
            reply.await,
            Err(ChannelError::ReplyDropped {
                channel: "hang".into()
            })
        );
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_before_sending() {
        let (left, right) = LoopbackTransport::pair();
        let config = MessengerConfig {
            max_payload_size: 4,
        };
        let a = DefaultBinaryMessenger::new(left, config).unwrap();
        let _b = DefaultBinaryMessenger::new(right, MessengerConfig::default()).unwrap();

        let err = a
            .send("chan", Some(Bytes::from_static(b"too long")))
            .unwrap_err();
        assert_eq!(err, ChannelError::PayloadTooLarge { size: 8, max: 4 });

        let err = a
            .send_with_reply("chan", Some(Bytes::from_static(b"12345")))
            .await
            .unwrap_err();
        assert_eq!(err, ChannelError::PayloadTooLarge { size: 5, max: 4 });
        assert_eq!(a.pending_replies(), 0);
    }

    #[tokio::test]
    async fn transport_failure_clears_pending_entry() {
        let (left, _right) = LoopbackTransport::pair();
        let a = DefaultBinaryMessenger::new(left, MessengerConfig::default()).unwrap();

        let err = a.send_with_reply("chan", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::Transport(_)));
        assert_eq!(a.pending_replies(), 0);
    }

    #[tokio::test]
    async fn handler_registration_updates_transport() {
        let (_a, b, right) = connected();
        b.set_message_handler("chan", Some(echo_handler())).unwrap();
        assert!(b.has_handler("chan"));
        assert!(right.is_listening("chan"));

        b.set_message_handler("chan", None).unwrap();
        assert!(!b.has_handler("chan"));
        assert!(!right.is_listening("chan"));
    }

    #[test]
    fn new_without_runtime_fails() {
        let (left, _right) = LoopbackTransport::pair();
        let err = DefaultBinaryMessenger::new(left, MessengerConfig::default()).unwrap_err();
        assert_eq!(err, ChannelError::NoRuntime);
    }

    #[test]
    fn explicit_runtime_handle_dispatches() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (left, right) = LoopbackTransport::pair();
        let a = DefaultBinaryMessenger::with_runtime(
            left,
            MessengerConfig::default(),
            runtime.handle().clone(),
        );
        let b = DefaultBinaryMessenger::with_runtime(
            right,
            MessengerConfig::default(),
            runtime.handle().clone(),
        );
        b.set_message_handler("echo", Some(echo_handler())).unwrap();

        let reply = runtime
            .block_on(a.send_with_reply("echo", Some(Bytes::from_static(b"rt"))))
            .unwrap();
        assert_eq!(reply, Some(Bytes::from_static(b"rt")));
    }
}
