use chanprims_codec::{EnvelopeError, MethodCodec, StandardMessageCodec, StandardMethodCodec};

use crate::cmd::{DecodeArgs, DecodeKind};
use crate::exit::{codec_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_method_call, print_remote_error, print_value, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;
    let codec = StandardMethodCodec::default();

    match args.kind {
        DecodeKind::Message => {
            let value = StandardMessageCodec
                .decode_value(&bytes)
                .map_err(|err| codec_error("decode failed", err))?;
            print_value(&value, format);
        }
        DecodeKind::MethodCall => {
            let call = codec
                .decode_method_call(&bytes)
                .map_err(|err| codec_error("decode failed", err))?;
            print_method_call(&call, format);
        }
        DecodeKind::Envelope => match codec.decode_envelope(&bytes) {
            Ok(value) => print_value(&value, format),
            Err(EnvelopeError::Remote(err)) => {
                print_remote_error(&err, format);
                return Ok(DATA_INVALID);
            }
            Err(EnvelopeError::Codec(err)) => return Err(codec_error("decode failed", err)),
        },
    }
    Ok(SUCCESS)
}

/// Accepts plain hex, optionally with whitespace between bytes.
fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let compact: String = text.split_whitespace().collect();
    hex::decode(&compact).map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex: {err}")))
}
