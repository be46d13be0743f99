use std::error::Error;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{CodecError, Result};
use crate::standard::StandardMessageCodec;
use crate::value::Value;
use crate::wire::WireReader;

/// Envelope flag for a successful result.
pub const ENVELOPE_SUCCESS: u8 = 0;

/// Envelope flag for an error result.
pub const ENVELOPE_ERROR: u8 = 1;

/// A named method invocation with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: impl Into<Value>) -> Self {
        Self {
            method: method.into(),
            arguments: arguments.into(),
        }
    }
}

/// An application error carried in an error envelope.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("remote error '{code}': {}", .message.as_deref().unwrap_or("no message"))]
pub struct RemoteError {
    pub code: String,
    pub message: Option<String>,
    pub details: Value,
    pub stacktrace: Option<String>,
}

impl RemoteError {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: None,
            details: Value::Null,
            stacktrace: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.stacktrace = Some(stacktrace.into());
        self
    }

    /// An error whose details are the rendered trace of `err`.
    pub fn from_error(code: impl Into<String>, err: &(dyn Error + 'static)) -> Self {
        Self::new(code)
            .with_message(err.to_string())
            .with_details(error_trace(err))
    }
}

/// Render an error and its chain of sources, one per line.
pub fn error_trace(err: &(dyn Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// A decoded result envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Value),
    Error(RemoteError),
}

/// Failure of [`MethodCodec::decode_envelope`].
///
/// `Remote` is a well-formed error envelope sent by the peer; `Codec` means
/// the envelope itself could not be decoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvelopeError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Encodes method calls and result envelopes.
pub trait MethodCodec: Send + Sync {
    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes>;

    fn decode_method_call(&self, bytes: &[u8]) -> Result<MethodCall>;

    fn encode_success_envelope(&self, result: &Value) -> Result<Bytes>;

    /// The stacktrace is only written when it is non-empty, so error
    /// envelopes hold either three or four values.
    fn encode_error_envelope(
        &self,
        code: &str,
        message: Option<&str>,
        details: &Value,
        stacktrace: Option<&str>,
    ) -> Result<Bytes>;

    fn decode_envelope_raw(&self, bytes: &[u8]) -> Result<Envelope>;

    /// Decode an envelope, turning an error envelope into `Err`.
    fn decode_envelope(&self, bytes: &[u8]) -> std::result::Result<Value, EnvelopeError> {
        match self.decode_envelope_raw(bytes)? {
            Envelope::Success(value) => Ok(value),
            Envelope::Error(err) => Err(EnvelopeError::Remote(err)),
        }
    }

    fn encode_envelope(&self, envelope: &Envelope) -> Result<Bytes> {
        match envelope {
            Envelope::Success(value) => self.encode_success_envelope(value),
            Envelope::Error(err) => self.encode_error_envelope(
                &err.code,
                err.message.as_deref(),
                &err.details,
                err.stacktrace.as_deref(),
            ),
        }
    }
}

/// [`MethodCodec`] over the [`StandardMessageCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMethodCodec {
    message_codec: StandardMessageCodec,
}

impl StandardMethodCodec {
    pub fn new(message_codec: StandardMessageCodec) -> Self {
        Self { message_codec }
    }

    pub fn message_codec(&self) -> &StandardMessageCodec {
        &self.message_codec
    }

    fn read_envelope(&self, bytes: &[u8]) -> Result<Envelope> {
        let mut reader = WireReader::new(bytes);
        let codec = &self.message_codec;
        let envelope = match reader.read_u8()? {
            ENVELOPE_SUCCESS => Envelope::Success(codec.read_value(&mut reader)?),
            ENVELOPE_ERROR => {
                let code = codec.read_value(&mut reader)?;
                let message = codec.read_value(&mut reader)?;
                let details = codec.read_value(&mut reader)?;
                let stacktrace = if reader.has_remaining() {
                    codec.read_value(&mut reader)?
                } else {
                    Value::Null
                };
                let (Some(code), Some(message), Some(stacktrace)) = (
                    code.into_string(),
                    optional_string(message),
                    optional_string(stacktrace),
                ) else {
                    return Err(CodecError::EnvelopeCorrupted);
                };
                Envelope::Error(RemoteError {
                    code,
                    message,
                    details,
                    stacktrace,
                })
            }
            _ => return Err(CodecError::EnvelopeCorrupted),
        };
        reader.finish()?;
        Ok(envelope)
    }
}

/// `Some(None)` for null, `Some(Some(_))` for a string, `None` otherwise.
fn optional_string(value: Value) -> Option<Option<String>> {
    if value.is_null() {
        return Some(None);
    }
    value.into_string().map(Some)
}

impl MethodCodec for StandardMethodCodec {
    fn encode_method_call(&self, call: &MethodCall) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        self.message_codec
            .write_value(&mut dst, &Value::String(call.method.clone()))?;
        self.message_codec.write_value(&mut dst, &call.arguments)?;
        Ok(dst.freeze())
    }

    fn decode_method_call(&self, bytes: &[u8]) -> Result<MethodCall> {
        let mut reader = WireReader::new(bytes);
        let decoded = self.message_codec.read_value(&mut reader).and_then(|method| {
            let arguments = self.message_codec.read_value(&mut reader)?;
            reader.finish()?;
            Ok((method, arguments))
        });
        match decoded {
            Ok((method, arguments)) => {
                let method_type = method.type_name();
                match method.into_string() {
                    Some(method) => Ok(MethodCall { method, arguments }),
                    None => {
                        debug!(method_type, "method name is not a string");
                        Err(CodecError::MethodCallCorrupted)
                    }
                }
            }
            Err(err) => {
                debug!(error = %err, "undecodable method call");
                Err(CodecError::MethodCallCorrupted)
            }
        }
    }

    fn encode_success_envelope(&self, result: &Value) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        dst.put_u8(ENVELOPE_SUCCESS);
        self.message_codec.write_value(&mut dst, result)?;
        Ok(dst.freeze())
    }

    fn encode_error_envelope(
        &self,
        code: &str,
        message: Option<&str>,
        details: &Value,
        stacktrace: Option<&str>,
    ) -> Result<Bytes> {
        let codec = &self.message_codec;
        let mut dst = BytesMut::new();
        dst.put_u8(ENVELOPE_ERROR);
        codec.write_value(&mut dst, &Value::from(code))?;
        codec.write_value(&mut dst, &Value::from(message))?;
        codec.write_value(&mut dst, details)?;
        if let Some(trace) = stacktrace.filter(|trace| !trace.is_empty()) {
            codec.write_value(&mut dst, &Value::from(trace))?;
        }
        Ok(dst.freeze())
    }

    fn decode_envelope_raw(&self, bytes: &[u8]) -> Result<Envelope> {
        self.read_envelope(bytes).map_err(|err| {
            if err != CodecError::EnvelopeCorrupted {
                debug!(error = %err, "undecodable envelope");
            }
            CodecError::EnvelopeCorrupted
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::MessageCodec;
    use crate::value::ValueMap;
    use crate::wire::tag;

    const CODEC: StandardMethodCodec = StandardMethodCodec {
        message_codec: StandardMessageCodec,
    };

    #[test]
    fn method_call_is_two_consecutive_values() {
        let call = MethodCall::new("ping", 7);
        let bytes = CODEC.encode_method_call(&call).unwrap();
        assert_eq!(
            &bytes[..],
            &[tag::STRING, 4, b'p', b'i', b'n', b'g', tag::INT32, 7, 0, 0, 0]
        );

        let decoded = CODEC.decode_method_call(&bytes).unwrap();
        assert_eq!(decoded, call);
    }

    #[test]
    fn method_call_with_map_arguments_roundtrips() {
        let args: ValueMap = [("id", Value::from(3)), ("name", Value::from("x"))]
            .into_iter()
            .collect();
        let call = MethodCall::new("open", Value::Map(args));
        let bytes = CODEC.encode_method_call(&call).unwrap();
        assert_eq!(CODEC.decode_method_call(&bytes).unwrap(), call);
    }

    #[test]
    fn method_name_must_be_a_string() {
        let bytes = [tag::INT32, 1, 0, 0, 0, tag::NULL];
        assert_eq!(
            CODEC.decode_method_call(&bytes),
            Err(CodecError::MethodCallCorrupted)
        );
    }

    #[test]
    fn method_call_rejects_trailing_and_truncated_bytes() {
        let mut bytes = CODEC
            .encode_method_call(&MethodCall::new("m", Value::Null))
            .unwrap()
            .to_vec();
        bytes.push(0);
        assert_eq!(
            CODEC.decode_method_call(&bytes),
            Err(CodecError::MethodCallCorrupted)
        );

        assert_eq!(
            CODEC.decode_method_call(&bytes[..3]),
            Err(CodecError::MethodCallCorrupted)
        );
    }

    #[test]
    fn success_envelope_is_flag_then_value() {
        let bytes = CODEC.encode_success_envelope(&Value::from(true)).unwrap();
        assert_eq!(&bytes[..], &[ENVELOPE_SUCCESS, tag::TRUE]);
        assert_eq!(CODEC.decode_envelope(&bytes), Ok(Value::Bool(true)));

        let bytes = CODEC.encode_success_envelope(&Value::Null).unwrap();
        assert_eq!(&bytes[..], &[ENVELOPE_SUCCESS, tag::NULL]);
    }

    #[test]
    fn error_envelope_carries_code_message_and_details() {
        let bytes = CODEC
            .encode_error_envelope("E42", Some("broken"), &Value::from(9), None)
            .unwrap();
        let err = CODEC.decode_envelope(&bytes).unwrap_err();
        assert_eq!(
            err,
            EnvelopeError::Remote(
                RemoteError::new("E42")
                    .with_message("broken")
                    .with_details(9)
            )
        );
    }

    #[test]
    fn error_envelope_with_null_message() {
        let bytes = CODEC
            .encode_error_envelope("E", None, &Value::Null, None)
            .unwrap();
        assert_eq!(
            &bytes[..],
            &[ENVELOPE_ERROR, tag::STRING, 1, b'E', tag::NULL, tag::NULL]
        );
        let Err(EnvelopeError::Remote(err)) = CODEC.decode_envelope(&bytes) else {
            panic!("expected remote error");
        };
        assert_eq!(err.message, None);
    }

    #[test]
    fn stacktrace_is_appended_only_when_present() {
        let without = CODEC
            .encode_error_envelope("E", None, &Value::Null, Some(""))
            .unwrap();
        let with = CODEC
            .encode_error_envelope("E", None, &Value::Null, Some("at main"))
            .unwrap();
        assert_eq!(with.len(), without.len() + 2 + "at main".len());

        let envelope = CODEC.decode_envelope_raw(&with).unwrap();
        let Envelope::Error(err) = envelope else {
            panic!("expected error envelope");
        };
        assert_eq!(err.stacktrace.as_deref(), Some("at main"));
    }

    #[test]
    fn malformed_error_envelopes_are_corruption() {
        let codec = StandardMessageCodec;
        let encode_fields = |fields: &[Value]| {
            let mut dst = BytesMut::new();
            dst.put_u8(ENVELOPE_ERROR);
            for field in fields {
                codec.write_value(&mut dst, field).unwrap();
            }
            dst.to_vec()
        };

        let numeric_code = encode_fields(&[Value::from(1), Value::Null, Value::Null]);
        let numeric_message = encode_fields(&[Value::from("E"), Value::from(2), Value::Null]);
        let numeric_trace = encode_fields(&[
            Value::from("E"),
            Value::Null,
            Value::Null,
            Value::from(3),
        ]);
        let too_many = encode_fields(&[
            Value::from("E"),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]);

        for bytes in [numeric_code, numeric_message, numeric_trace, too_many] {
            assert_eq!(
                CODEC.decode_envelope(&bytes),
                Err(EnvelopeError::Codec(CodecError::EnvelopeCorrupted))
            );
        }
    }

    #[test]
    fn bad_flag_and_trailing_bytes_are_corruption() {
        for bytes in [&[][..], &[2, tag::NULL][..], &[ENVELOPE_SUCCESS, tag::NULL, 0][..]] {
            assert_eq!(
                CODEC.decode_envelope_raw(bytes),
                Err(CodecError::EnvelopeCorrupted)
            );
        }
    }

    #[test]
    fn encode_envelope_matches_individual_encoders() {
        let err = RemoteError::new("E")
            .with_message("m")
            .with_stacktrace("trace");
        let bytes = CODEC.encode_envelope(&Envelope::Error(err.clone())).unwrap();
        assert_eq!(
            bytes,
            CODEC
                .encode_error_envelope("E", Some("m"), &Value::Null, Some("trace"))
                .unwrap()
        );
        assert_eq!(CODEC.decode_envelope_raw(&bytes), Ok(Envelope::Error(err)));
    }

    #[test]
    fn envelope_alignment_counts_the_flag_byte() {
        let bytes = CODEC.encode_success_envelope(&Value::Float64(1.0)).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..8], &[ENVELOPE_SUCCESS, tag::FLOAT64, 0, 0, 0, 0, 0, 0]);
        assert_eq!(CODEC.decode_envelope(&bytes), Ok(Value::Float64(1.0)));

        // The same value as a bare message pads differently.
        let bare = StandardMessageCodec
            .encode_message(Some(&Value::Float64(1.0)))
            .unwrap()
            .unwrap();
        assert_eq!(bare.len(), 16);
        assert_eq!(&bare[..8], &[tag::FLOAT64, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("inner cause")]
    struct Inner;

    #[test]
    fn from_error_renders_source_chain_as_details() {
        let err = RemoteError::from_error("error", &Outer(Inner));
        assert_eq!(err.code, "error");
        assert_eq!(err.message.as_deref(), Some("outer failure"));
        assert_eq!(
            err.details,
            Value::from("outer failure\ncaused by: inner cause")
        );
        assert_eq!(err.to_string(), "remote error 'error': outer failure");
    }
}
