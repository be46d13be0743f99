#![cfg(feature = "cli")]

use std::process::{Command, Output};

const REFERENCE_MAP_HEX: &str = concat!(
    "0d03",
    "07054b65795f31",
    "0301000000",
    "07054b65795f32",
    "070b544553545f535452494e47",
    "07054b65795f33",
    "01",
);

fn chanprims(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chanprims"))
        .args(["--log-level", "error", "--format", "json"])
        .args(args)
        .output()
        .expect("chanprims should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn encode_reference_map() {
    let output = chanprims(&[
        "encode",
        "--json",
        r#"{"Key_1":1,"Key_2":"TEST_STRING","Key_3":true}"#,
    ]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["size"], 42);
    assert_eq!(json["hex"], REFERENCE_MAP_HEX);
}

#[test]
fn encode_method_call() {
    let output = chanprims(&["encode", "--json", "null", "--method", "ping"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["hex"], "070470696e6700");
}

#[test]
fn decode_reference_map() {
    let output = chanprims(&["decode", REFERENCE_MAP_HEX]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["type"], "map");
    assert_eq!(json["value"]["Key_2"], "TEST_STRING");
    assert_eq!(json["value"]["Key_3"], true);
}

#[test]
fn decode_method_call() {
    let output = chanprims(&["decode", "070470696e6703", "--kind", "method-call"]);
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(60));

    let output = chanprims(&["decode", "070470696e6701", "--kind", "method-call"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["method"], "ping");
    assert_eq!(json["arguments"], true);
}

#[test]
fn decode_error_envelope_exits_data_invalid() {
    let output = chanprims(&["decode", "010701450000", "--kind", "envelope"]);
    assert_eq!(output.status.code(), Some(60));
    let json = stdout_json(&output);
    assert_eq!(json["code"], "E");
    assert_eq!(json["message"], serde_json::Value::Null);
}

#[test]
fn decode_trailing_bytes_is_rejected() {
    let output = chanprims(&["decode", "0000"]);
    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("decode failed"));
}

#[test]
fn echo_round_trips_arguments() {
    let output = chanprims(&["echo", "--method", "greet", "--json", r#"["a",2]"#]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["method"], "greet");
    assert_eq!(json["reply"], serde_json::json!(["a", 2]));
    assert!(json["request_size"].as_u64().unwrap() > 0);
}

#[test]
fn echo_with_error_code_exits_data_invalid() {
    let output = chanprims(&["echo", "--json", "1", "--error-code", "EBUSY"]);
    assert_eq!(output.status.code(), Some(60));
    assert_eq!(stdout_json(&output)["code"], "EBUSY");
}

#[test]
fn version_prints_package_version() {
    let output = chanprims(&["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("chanprims {}", env!("CARGO_PKG_VERSION")));
}
