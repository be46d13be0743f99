use chanprims_codec::Value;
use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{CliError, CliResult, DATA_INVALID};
use crate::output::OutputFormat;

pub mod decode;
pub mod echo;
pub mod encode;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode a JSON document with the standard codec.
    Encode(EncodeArgs),
    /// Decode hex-encoded standard codec bytes.
    Decode(DecodeArgs),
    /// Round-trip a method call through an in-process messenger pair.
    Echo(EchoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Echo(args) => echo::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// JSON document to encode.
    #[arg(long)]
    pub json: String,
    /// Encode a method call with this name, using the document as arguments.
    #[arg(long)]
    pub method: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum DecodeKind {
    /// A single standard codec value.
    #[default]
    Message,
    /// A method name followed by its arguments.
    MethodCall,
    /// A success or error result envelope.
    Envelope,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex-encoded bytes.
    pub hex: String,
    /// How to interpret the bytes.
    #[arg(long, value_enum, default_value_t = DecodeKind::Message)]
    pub kind: DecodeKind,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Channel name to serve and call.
    #[arg(long, short = 'c', default_value = "chanprims/echo")]
    pub channel: String,
    /// Method name to invoke.
    #[arg(long, default_value = "echo")]
    pub method: String,
    /// JSON arguments for the call.
    #[arg(long, default_value = "null")]
    pub json: String,
    /// Make the responder fail with this error code.
    #[arg(long, value_name = "CODE")]
    pub error_code: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a `--json` argument into a codec value.
pub fn parse_json(text: &str) -> CliResult<Value> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid JSON: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_widens_numbers_like_the_codec() {
        assert_eq!(parse_json("7").unwrap(), Value::Int32(7));
        assert_eq!(parse_json("8589934592").unwrap(), Value::Int64(8_589_934_592));
        assert_eq!(parse_json("1.5").unwrap(), Value::Float64(1.5));
    }

    #[test]
    fn parse_json_rejects_garbage() {
        let err = parse_json("{not json").unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }
}
