//! Event channel producer and subscriber over a loopback transport.
//!
//! Run with:
//!   cargo run --example event-stream

use std::sync::Arc;

use chanprims::channel::{
    DefaultBinaryMessenger, EventChannel, EventSink, FnStreamHandler, MessengerConfig,
};
use chanprims::codec::Value;
use chanprims::transport::LoopbackTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host_side, embedder_side) = LoopbackTransport::pair();
    let host = DefaultBinaryMessenger::new(host_side, MessengerConfig::default())?;
    let embedder = DefaultBinaryMessenger::new(embedder_side, MessengerConfig::default())?;

    let producer = EventChannel::new("example/countdown", host)?;
    producer.set_stream_handler(Arc::new(FnStreamHandler::new(
        |arguments: Value, sink: EventSink| {
            let from = arguments.as_i64().unwrap_or(3);
            for n in (1..=from).rev() {
                sink.success(n)?;
            }
            sink.end_of_stream()?;
            Ok(())
        },
        |_: Value| Ok(()),
    )))?;

    let subscriber = EventChannel::new("example/countdown", embedder)?;
    let mut stream = subscriber.receive_stream(5).await?;
    while let Some(event) = stream.next().await {
        match event {
            Ok(value) => eprintln!("tick {value}"),
            Err(err) => eprintln!("stream error: {err}"),
        }
    }
    eprintln!("stream ended");
    Ok(())
}
