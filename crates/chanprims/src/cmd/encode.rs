use chanprims_codec::{MethodCall, MethodCodec, StandardMessageCodec, StandardMethodCodec};

use crate::cmd::{parse_json, EncodeArgs};
use crate::exit::{codec_error, CliResult, SUCCESS};
use crate::output::{print_encoded, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let value = parse_json(&args.json)?;
    let bytes = match args.method {
        Some(method) => {
            StandardMethodCodec::default().encode_method_call(&MethodCall::new(method, value))
        }
        None => StandardMessageCodec.encode_value(&value),
    }
    .map_err(|err| codec_error("encode failed", err))?;

    tracing::debug!(size = bytes.len(), "encoded");
    print_encoded(&bytes, format);
    Ok(SUCCESS)
}
