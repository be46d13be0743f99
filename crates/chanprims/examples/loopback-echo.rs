//! Method channel round trip between two in-process messengers.
//!
//! Run with:
//!   cargo run --example loopback-echo

use chanprims::channel::{DefaultBinaryMessenger, MessengerConfig, MethodChannel, MethodError};
use chanprims::codec::{MethodCall, Value};
use chanprims::transport::LoopbackTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host_side, embedder_side) = LoopbackTransport::pair();
    let host = DefaultBinaryMessenger::new(host_side, MessengerConfig::default())?;
    let embedder = DefaultBinaryMessenger::new(embedder_side, MessengerConfig::default())?;

    let server = MethodChannel::new("example/echo", host)?;
    server.set_method_call_handler(|call: MethodCall| async move {
        match call.method.as_str() {
            "echo" => Ok(call.arguments),
            _ => Err(MethodError::NotImplemented),
        }
    })?;

    let client = MethodChannel::new("example/echo", embedder)?;
    let reply = client
        .invoke_method_and_await_reply("echo", Value::from("hello"))
        .await?;
    eprintln!("echo replied: {reply}");

    match client.invoke_method_and_await_reply("shout", Value::Null).await {
        Ok(value) => eprintln!("unexpected reply: {value}"),
        Err(err) => eprintln!("shout failed as expected: {err}"),
    }
    Ok(())
}
