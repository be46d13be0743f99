use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use chanprims_codec::MessageCodec;
use futures_util::future::{self, FutureExt};
use tracing::warn;

use crate::error::{ChannelError, Result};
use crate::messenger::{BinaryMessageHandler, BinaryMessenger};

/// A named channel carrying messages of one codec's type.
pub struct BasicMessageChannel<C> {
    name: String,
    codec: Arc<C>,
    messenger: Arc<dyn BinaryMessenger>,
}

impl<C> BasicMessageChannel<C>
where
    C: MessageCodec + 'static,
    C::Message: Send + 'static,
{
    pub fn new(
        name: impl Into<String>,
        codec: C,
        messenger: Arc<dyn BinaryMessenger>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChannelError::EmptyName);
        }
        Ok(Self {
            name,
            codec: Arc::new(codec),
            messenger,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encode and send `message` without waiting for a reply.
    pub fn send(&self, message: Option<&C::Message>) -> Result<()> {
        let bytes = self.codec.encode_message(message)?;
        self.messenger.send(&self.name, bytes)
    }

    /// Encode and send `message`, then decode the peer's reply.
    ///
    /// Native transports cannot tell an empty reply from an absent one, so a
    /// reply that encodes to zero bytes, such as `Some("")` with
    /// [`StringCodec`](chanprims_codec::StringCodec), arrives here as `None`.
    pub async fn send_and_await_reply(
        &self,
        message: Option<&C::Message>,
    ) -> Result<Option<C::Message>> {
        let bytes = self.codec.encode_message(message)?;
        let reply = self.messenger.send_with_reply(&self.name, bytes).await?;
        Ok(self.codec.decode_message(reply.as_deref())?)
    }

    /// Install a typed handler. Its output is encoded as the reply; `None`
    /// replies with no bytes.
    pub fn set_message_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(Option<C::Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<C::Message>> + Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        let name = self.name.clone();
        let binary: BinaryMessageHandler = Arc::new(move |bytes: Option<Bytes>| {
            let message = match codec.decode_message(bytes.as_deref()) {
                Ok(message) => message,
                Err(err) => {
                    warn!(channel = %name, error = %err, "dropping undecodable message");
                    return future::ready(None).boxed();
                }
            };
            let reply = handler(message);
            let codec = Arc::clone(&codec);
            let name = name.clone();
            async move {
                let reply = reply.await;
                codec
                    .encode_message(reply.as_ref())
                    .unwrap_or_else(|err| {
                        warn!(channel = %name, error = %err, "failed to encode reply");
                        None
                    })
            }
            .boxed()
        });
        self.messenger.set_message_handler(&self.name, Some(binary))
    }

    pub fn clear_message_handler(&self) -> Result<()> {
        self.messenger.set_message_handler(&self.name, None)
    }
}

impl<C> std::fmt::Debug for BasicMessageChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicMessageChannel")
            .field("name", &self.name)
            .finish()
    }
}
