use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{ReplyId, ResponseHandle, Transport, TransportSink};

/// One endpoint of an in-process transport pair.
///
/// Messages sent on one endpoint are delivered synchronously to the sink
/// attached to the other. Responses are routed back to the requesting
/// endpoint's sink as replies.
#[derive(Clone)]
pub struct LoopbackTransport {
    side: usize,
    link: Arc<Link>,
}

struct Link {
    sinks: [Mutex<Option<Weak<dyn TransportSink>>>; 2],
    listening: [Mutex<HashSet<String>>; 2],
    responses: Mutex<HashMap<u64, PendingResponse>>,
    next_handle: AtomicU64,
    closed: AtomicBool,
}

struct PendingResponse {
    requester: usize,
    reply: Option<ReplyId>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LoopbackTransport {
    /// Create two connected endpoints.
    pub fn pair() -> (Self, Self) {
        let link = Arc::new(Link {
            sinks: [Mutex::new(None), Mutex::new(None)],
            listening: [Mutex::new(HashSet::new()), Mutex::new(HashSet::new())],
            responses: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        });
        (
            Self {
                side: 0,
                link: Arc::clone(&link),
            },
            Self { side: 1, link },
        )
    }

    /// Whether this endpoint has declared it handles `channel`.
    pub fn is_listening(&self, channel: &str) -> bool {
        lock(&self.link.listening[self.side]).contains(channel)
    }

    /// Channels this endpoint currently handles, sorted.
    pub fn listening_channels(&self) -> Vec<String> {
        let mut channels: Vec<_> = lock(&self.link.listening[self.side])
            .iter()
            .cloned()
            .collect();
        channels.sort();
        channels
    }

    /// Number of incoming messages, on either endpoint, not yet answered.
    pub fn outstanding_responses(&self) -> usize {
        lock(&self.link.responses).len()
    }

    /// Shut the link down. Later sends on either endpoint fail.
    pub fn close(&self) {
        if !self.link.closed.swap(true, Ordering::AcqRel) {
            debug!(side = self.side, "loopback transport closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::Acquire)
    }

    fn sink(&self, side: usize) -> Option<Arc<dyn TransportSink>> {
        lock(&self.link.sinks[side]).as_ref().and_then(Weak::upgrade)
    }

    fn deliver(&self, channel: &str, payload: Option<&[u8]>, reply: Option<ReplyId>) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Shutdown);
        }
        let peer = 1 - self.side;
        let sink = self.sink(peer).ok_or_else(|| TransportError::Detached {
            channel: channel.to_string(),
        })?;

        let handle = self.link.next_handle.fetch_add(1, Ordering::Relaxed);
        lock(&self.link.responses).insert(
            handle,
            PendingResponse {
                requester: self.side,
                reply,
            },
        );

        trace!(
            channel,
            handle,
            len = payload.map_or(0, <[u8]>::len),
            "loopback deliver"
        );
        sink.on_message(
            channel,
            payload.map(Bytes::copy_from_slice),
            ResponseHandle(handle),
        );
        Ok(())
    }
}

impl Transport for LoopbackTransport {
    fn attach(&self, sink: Weak<dyn TransportSink>) {
        *lock(&self.link.sinks[self.side]) = Some(sink);
    }

    fn send(&self, channel: &str, payload: Option<&[u8]>) -> Result<()> {
        self.deliver(channel, payload, None)
    }

    fn send_with_reply(
        &self,
        channel: &str,
        payload: Option<&[u8]>,
        reply: ReplyId,
    ) -> Result<()> {
        self.deliver(channel, payload, Some(reply))
    }

    fn send_response(&self, response: ResponseHandle, payload: Option<&[u8]>) -> Result<()> {
        let pending = lock(&self.link.responses)
            .remove(&response.0)
            .ok_or(TransportError::UnknownResponse(response.0))?;

        let Some(reply) = pending.reply else {
            return Ok(());
        };
        match self.sink(pending.requester) {
            Some(sink) => {
                trace!(%reply, len = payload.map_or(0, <[u8]>::len), "loopback reply");
                sink.on_reply(reply, payload.map(Bytes::copy_from_slice));
            }
            None => debug!(%reply, "requester detached before reply"),
        }
        Ok(())
    }

    fn set_listening(&self, channel: &str, listening: bool) -> Result<()> {
        let mut channels = lock(&self.link.listening[self.side]);
        if listening {
            channels.insert(channel.to_string());
        } else {
            channels.remove(channel);
        }
        Ok(())
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("side", &self.side)
            .field("closed", &self.is_closed())
            .finish()
    }
}
