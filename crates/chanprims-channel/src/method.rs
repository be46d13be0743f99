use std::any::Any;
use std::error::Error as _;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use chanprims_codec::{error_trace, MethodCall, MethodCodec, StandardMethodCodec, Value};
use futures_util::future::{self, FutureExt};
use tracing::{debug, error, warn};

use crate::error::{ChannelError, MethodError, MethodResult, Result};
use crate::messenger::{panic_message, BinaryMessageHandler, BinaryMessenger};

/// Error code used for handler failures that carry no code of their own.
pub const GENERIC_ERROR_CODE: &str = "error";

/// A named channel for invoking methods on the peer.
#[derive(Clone)]
pub struct MethodChannel {
    name: String,
    codec: Arc<dyn MethodCodec>,
    messenger: Arc<dyn BinaryMessenger>,
}

impl MethodChannel {
    /// Channel using the [`StandardMethodCodec`].
    pub fn new(name: impl Into<String>, messenger: Arc<dyn BinaryMessenger>) -> Result<Self> {
        Self::with_codec(name, Arc::new(StandardMethodCodec::default()), messenger)
    }

    pub fn with_codec(
        name: impl Into<String>,
        codec: Arc<dyn MethodCodec>,
        messenger: Arc<dyn BinaryMessenger>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChannelError::EmptyName);
        }
        Ok(Self {
            name,
            codec,
            messenger,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn codec(&self) -> &Arc<dyn MethodCodec> {
        &self.codec
    }

    pub fn messenger(&self) -> &Arc<dyn BinaryMessenger> {
        &self.messenger
    }

    /// Invoke `method` without waiting for the result.
    pub fn invoke_method(&self, method: &str, arguments: impl Into<Value>) -> Result<()> {
        let bytes = self
            .codec
            .encode_method_call(&MethodCall::new(method, arguments))?;
        self.messenger.send(&self.name, Some(bytes))
    }

    /// Invoke `method` and decode its result envelope.
    ///
    /// An error envelope becomes [`ChannelError::Remote`]; an empty reply
    /// becomes [`ChannelError::MissingPlugin`].
    pub async fn invoke_method_and_await_reply(
        &self,
        method: &str,
        arguments: impl Into<Value>,
    ) -> Result<Value> {
        let bytes = self
            .codec
            .encode_method_call(&MethodCall::new(method, arguments))?;
        let reply = self.messenger.send_with_reply(&self.name, Some(bytes)).await?;
        let Some(reply) = reply else {
            return Err(ChannelError::MissingPlugin {
                channel: self.name.clone(),
                method: method.to_string(),
            });
        };
        Ok(self.codec.decode_envelope(&reply)?)
    }

    /// Install the handler for incoming method calls.
    pub fn set_method_call_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(MethodCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        let codec = Arc::clone(&self.codec);
        let name = self.name.clone();
        let binary: BinaryMessageHandler = Arc::new(move |bytes: Option<Bytes>| {
            let Some(bytes) = bytes else {
                warn!(channel = %name, "method call without payload");
                return future::ready(None).boxed();
            };
            let call = match codec.decode_method_call(&bytes) {
                Ok(call) => call,
                Err(err) => {
                    warn!(channel = %name, error = %err, "dropping undecodable method call");
                    return future::ready(None).boxed();
                }
            };
            debug!(channel = %name, method = %call.method, "method call");
            let method = call.method.clone();
            let result = match panic::catch_unwind(AssertUnwindSafe(|| handler(call))) {
                Ok(result) => result,
                Err(cause) => {
                    let err = handler_panicked(&name, &method, &*cause);
                    return future::ready(encode_result(&*codec, Err(err))).boxed();
                }
            };
            let codec = Arc::clone(&codec);
            let name = name.clone();
            async move {
                let result = match AssertUnwindSafe(result).catch_unwind().await {
                    Ok(result) => result,
                    Err(cause) => Err(handler_panicked(&name, &method, &*cause)),
                };
                encode_result(&*codec, result)
            }
            .boxed()
        });
        self.messenger.set_message_handler(&self.name, Some(binary))
    }

    pub fn clear_method_call_handler(&self) -> Result<()> {
        self.messenger.set_message_handler(&self.name, None)
    }
}

impl std::fmt::Debug for MethodChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodChannel")
            .field("name", &self.name)
            .finish()
    }
}

fn handler_panicked(channel: &str, method: &str, cause: &(dyn Any + Send)) -> MethodError {
    let message = panic_message(cause);
    error!(channel, method, panic = message, "method handler panicked");
    MethodError::failed(format!("method handler panicked: {message}"))
}

/// Encode a handler outcome as a reply. `NotImplemented` is the empty reply.
pub(crate) fn encode_result(codec: &dyn MethodCodec, result: MethodResult) -> Option<Bytes> {
    let encoded = match result {
        Ok(value) => codec.encode_success_envelope(&value),
        Err(MethodError::NotImplemented) => return None,
        Err(MethodError::Remote(err)) => codec.encode_error_envelope(
            &err.code,
            err.message.as_deref(),
            &err.details,
            err.stacktrace.as_deref(),
        ),
        Err(MethodError::Failed(err)) => {
            let trace = err.source().map(|_| error_trace(&*err));
            codec.encode_error_envelope(
                GENERIC_ERROR_CODE,
                Some(err.to_string().as_str()),
                &Value::Null,
                trace.as_deref(),
            )
        }
    };
    match encoded {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(error = %err, "failed to encode method result");
            let message = err.to_string();
            codec
                .encode_error_envelope(
                    GENERIC_ERROR_CODE,
                    Some(message.as_str()),
                    &Value::Null,
                    None,
                )
                .ok()
        }
    }
}
