//! A host that owns a plugin registry for the lifetime of its engine.
//!
//! Run with:
//!   cargo run --example plugin-host

use std::sync::Arc;

use chanprims::channel::{DefaultBinaryMessenger, MessengerConfig, MethodChannel};
use chanprims::codec::{MethodCall, Value};
use chanprims::plugin::{Plugin, PluginBinding, PluginRegistry};
use chanprims::transport::LoopbackTransport;

struct DeviceInfo {
    channel: Option<MethodChannel>,
}

impl Plugin for DeviceInfo {
    fn on_attached(&mut self, binding: &PluginBinding) {
        let channel = match MethodChannel::new(binding.name(), Arc::clone(binding.messenger())) {
            Ok(channel) => channel,
            Err(err) => {
                eprintln!("attach failed: {err}");
                return;
            }
        };
        let registered = channel.set_method_call_handler(|_: MethodCall| async {
            Ok(Value::from(std::env::consts::OS))
        });
        if let Err(err) = registered {
            eprintln!("handler registration failed: {err}");
            return;
        }
        self.channel = Some(channel);
    }

    fn on_detached(&mut self) {
        if let Some(channel) = self.channel.take() {
            let _ = channel.clear_method_call_handler();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host_side, embedder_side) = LoopbackTransport::pair();
    let host = DefaultBinaryMessenger::new(host_side, MessengerConfig::default())?;
    let embedder = DefaultBinaryMessenger::new(embedder_side, MessengerConfig::default())?;

    let mut registry = PluginRegistry::new(host);
    let plugin = Box::new(DeviceInfo { channel: None });
    let handle = registry.add_plugin("example/device_info", plugin)?;
    eprintln!("attached {handle}: {:?}", registry.plugin_names());

    let caller = MethodChannel::new("example/device_info", embedder)?;
    let os = caller
        .invoke_method_and_await_reply("platform", Value::Null)
        .await?;
    eprintln!("platform: {os}");

    registry.remove_plugin(handle);
    match caller.invoke_method_and_await_reply("platform", Value::Null).await {
        Ok(value) => eprintln!("unexpected reply after detach: {value}"),
        Err(err) => eprintln!("after detach: {err}"),
    }
    Ok(())
}
