use std::io::{IsTerminal, Write};

use chanprims_codec::{MethodCall, RemoteError, Value};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EncodedOutput {
    size: usize,
    hex: String,
}

#[derive(Serialize)]
struct ValueOutput<'a> {
    #[serde(rename = "type")]
    type_name: &'static str,
    value: &'a Value,
}

#[derive(Serialize)]
struct MethodCallOutput<'a> {
    method: &'a str,
    arguments: &'a Value,
}

#[derive(Serialize)]
struct RemoteErrorOutput<'a> {
    code: &'a str,
    message: Option<&'a str>,
    details: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    stacktrace: Option<&'a str>,
}

/// Result of a loopback method-call round trip.
#[derive(Debug, Serialize)]
pub struct EchoReport {
    pub channel: String,
    pub method: String,
    pub request_size: usize,
    pub response_size: usize,
    pub reply: Value,
}

pub fn print_encoded(bytes: &[u8], format: OutputFormat) {
    let hex = hex::encode(bytes);
    match format {
        OutputFormat::Json => print_json(&EncodedOutput {
            size: bytes.len(),
            hex,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["SIZE", "HEX"]);
            table.add_row(vec![bytes.len().to_string(), hex]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("size={} hex={hex}", bytes.len()),
        OutputFormat::Raw => print_raw(bytes),
    }
}

pub fn print_value(value: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ValueOutput {
            type_name: value.type_name(),
            value,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["TYPE", "VALUE"]);
            table.add_row(vec![value.type_name().to_string(), value.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => print_json_pretty(value),
        OutputFormat::Raw => println!("{value}"),
    }
}

pub fn print_method_call(call: &MethodCall, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&MethodCallOutput {
            method: &call.method,
            arguments: &call.arguments,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["METHOD", "ARGUMENTS"]);
            table.add_row(vec![call.method.clone(), call.arguments.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => print_json_pretty(&MethodCallOutput {
            method: &call.method,
            arguments: &call.arguments,
        }),
        OutputFormat::Raw => println!("{}({})", call.method, call.arguments),
    }
}

pub fn print_remote_error(err: &RemoteError, format: OutputFormat) {
    let out = RemoteErrorOutput {
        code: &err.code,
        message: err.message.as_deref(),
        details: &err.details,
        stacktrace: err.stacktrace.as_deref(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["CODE", "MESSAGE", "DETAILS"]);
            table.add_row(vec![
                err.code.clone(),
                err.message.clone().unwrap_or_default(),
                err.details.to_string(),
            ]);
            println!("{table}");
            if let Some(trace) = &err.stacktrace {
                println!("{trace}");
            }
        }
        OutputFormat::Pretty => print_json_pretty(&out),
        OutputFormat::Raw => println!("{err}"),
    }
}

pub fn print_echo(report: &EchoReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = new_table(vec!["CHANNEL", "METHOD", "REQUEST", "RESPONSE", "REPLY"]);
            table.add_row(vec![
                report.channel.clone(),
                report.method.clone(),
                report.request_size.to_string(),
                report.response_size.to_string(),
                report.reply.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} method={} request={} response={} reply={}",
                report.channel,
                report.method,
                report.request_size,
                report.response_size,
                report.reply
            );
        }
        OutputFormat::Raw => println!("{}", report.reply),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_json_pretty<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}
