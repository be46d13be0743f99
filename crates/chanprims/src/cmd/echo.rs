use chanprims_channel::{
    BinaryMessenger, DefaultBinaryMessenger, MessengerConfig, MethodChannel, MethodError,
};
use chanprims_codec::{
    EnvelopeError, MethodCall, MethodCodec, RemoteError, StandardMethodCodec, Value,
};
use chanprims_transport::LoopbackTransport;

use crate::cmd::{parse_json, EchoArgs};
use crate::exit::{
    channel_error, codec_error, io_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS,
};
use crate::output::{print_echo, print_remote_error, EchoReport, OutputFormat};

pub fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let arguments = parse_json(&args.json)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    match runtime.block_on(round_trip(&args, arguments))? {
        Ok(report) => {
            print_echo(&report, format);
            Ok(SUCCESS)
        }
        Err(err) => {
            print_remote_error(&err, format);
            Ok(DATA_INVALID)
        }
    }
}

/// Serve `args.channel` on one end of a loopback pair and call it from the
/// other. A remote error is a successful round trip with an error reply.
async fn round_trip(
    args: &EchoArgs,
    arguments: Value,
) -> CliResult<Result<EchoReport, RemoteError>> {
    let (client_side, server_side) = LoopbackTransport::pair();
    let client = DefaultBinaryMessenger::new(client_side, MessengerConfig::default())
        .map_err(|err| channel_error("client setup failed", err))?;
    let server = DefaultBinaryMessenger::new(server_side, MessengerConfig::default())
        .map_err(|err| channel_error("server setup failed", err))?;

    let responder = MethodChannel::new(args.channel.as_str(), server)
        .map_err(|err| channel_error("responder setup failed", err))?;
    let error_code = args.error_code.clone();
    responder
        .set_method_call_handler(move |call: MethodCall| {
            let error_code = error_code.clone();
            async move {
                tracing::info!(method = %call.method, "echoing method call");
                match error_code {
                    Some(code) => Err(MethodError::Remote(
                        RemoteError::new(code)
                            .with_message(format!("{} failed on request", call.method))
                            .with_details(call.arguments),
                    )),
                    None => Ok(call.arguments),
                }
            }
        })
        .map_err(|err| channel_error("responder setup failed", err))?;

    let codec = StandardMethodCodec::default();
    let request = codec
        .encode_method_call(&MethodCall::new(args.method.as_str(), arguments))
        .map_err(|err| codec_error("encode failed", err))?;
    let request_size = request.len();

    let reply = client
        .send_with_reply(&args.channel, Some(request))
        .await
        .map_err(|err| channel_error("send failed", err))?
        .ok_or_else(|| {
            CliError::new(
                FAILURE,
                format!("no handler answered on channel '{}'", args.channel),
            )
        })?;

    let response_size = reply.len();
    let reply = match codec.decode_envelope(&reply) {
        Ok(value) => value,
        Err(EnvelopeError::Remote(err)) => return Ok(Err(err)),
        Err(EnvelopeError::Codec(err)) => return Err(codec_error("reply decode failed", err)),
    };

    Ok(Ok(EchoReport {
        channel: args.channel.clone(),
        method: args.method.clone(),
        request_size,
        response_size,
        reply,
    }))
}
