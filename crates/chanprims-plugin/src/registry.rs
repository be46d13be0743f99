use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chanprims_channel::BinaryMessenger;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::{PluginError, Result};

/// What a plugin receives when it is attached.
#[derive(Clone)]
pub struct PluginBinding {
    name: String,
    messenger: Arc<dyn BinaryMessenger>,
}

impl PluginBinding {
    /// Name the plugin was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messenger shared by every plugin of the registry.
    pub fn messenger(&self) -> &Arc<dyn BinaryMessenger> {
        &self.messenger
    }
}

impl fmt::Debug for PluginBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginBinding")
            .field("name", &self.name)
            .finish()
    }
}

/// A capability consumer with an attach/detach lifecycle.
pub trait Plugin: Send {
    /// Called once, when the plugin is added to a registry.
    fn on_attached(&mut self, binding: &PluginBinding);

    /// Called once, when the plugin leaves the registry.
    fn on_detached(&mut self);
}

/// Stable handle to an attached plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginHandle(u64);

impl PluginHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin#{}", self.0)
    }
}

struct Entry {
    name: String,
    plugin: Box<dyn Plugin>,
}

/// Registry of attached plugins, owned by the host for the engine's lifetime.
pub struct PluginRegistry {
    messenger: Arc<dyn BinaryMessenger>,
    config: RegistryConfig,
    plugins: BTreeMap<u64, Entry>,
    next_handle: u64,
}

impl PluginRegistry {
    /// Create an empty registry with default config.
    pub fn new(messenger: Arc<dyn BinaryMessenger>) -> Self {
        Self::with_config(messenger, RegistryConfig::default())
    }

    /// Create an empty registry with explicit config.
    pub fn with_config(messenger: Arc<dyn BinaryMessenger>, config: RegistryConfig) -> Self {
        Self {
            messenger,
            config,
            plugins: BTreeMap::new(),
            next_handle: 1,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Attach `plugin` under `name`.
    pub fn add_plugin(
        &mut self,
        name: impl Into<String>,
        mut plugin: Box<dyn Plugin>,
    ) -> Result<PluginHandle> {
        let name = name.into();
        if name.is_empty() {
            return Err(PluginError::EmptyName);
        }
        if self.has_plugin(&name) {
            return Err(PluginError::AlreadyRegistered(name));
        }
        if self.plugins.len() >= self.config.max_plugins {
            return Err(PluginError::TooManyPlugins {
                max: self.config.max_plugins,
            });
        }

        let handle = PluginHandle(self.next_handle);
        self.next_handle += 1;

        let binding = PluginBinding {
            name: name.clone(),
            messenger: Arc::clone(&self.messenger),
        };
        plugin.on_attached(&binding);
        debug!(plugin = %name, %handle, "plugin attached");

        self.plugins.insert(handle.0, Entry { name, plugin });
        Ok(handle)
    }

    /// Detach and drop the plugin behind `handle`. Returns false if it was
    /// already gone.
    pub fn remove_plugin(&mut self, handle: PluginHandle) -> bool {
        let Some(mut entry) = self.plugins.remove(&handle.0) else {
            return false;
        };
        entry.plugin.on_detached();
        debug!(plugin = %entry.name, %handle, "plugin detached");
        true
    }

    /// Handle of the plugin registered as `name`.
    pub fn handle_of(&self, name: &str) -> Option<PluginHandle> {
        self.plugins
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| PluginHandle(*id))
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.handle_of(name).is_some()
    }

    /// Names of attached plugins, in attach order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.values().map(|entry| entry.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Detach every plugin, most recently attached first.
    pub fn remove_all(&mut self) {
        while let Some((id, mut entry)) = self.plugins.pop_last() {
            entry.plugin.on_detached();
            debug!(plugin = %entry.name, handle = id, "plugin detached");
        }
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.remove_all();
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("config", &self.config)
            .field("plugins", &self.plugin_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chanprims_channel::{DefaultBinaryMessenger, MessengerConfig, MethodChannel};
    use chanprims_codec::Value;
    use chanprims_transport::LoopbackTransport;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        log: Log,
    }

    impl Plugin for Recorder {
        fn on_attached(&mut self, binding: &PluginBinding) {
            self.log
                .lock()
                .unwrap()
                .push(format!("attach:{}:{}", self.label, binding.name()));
        }

        fn on_detached(&mut self) {
            self.log
                .lock()
                .unwrap()
                .push(format!("detach:{}", self.label));
        }
    }

    fn recorder(label: &'static str, log: &Log) -> Box<dyn Plugin> {
        Box::new(Recorder {
            label,
            log: Arc::clone(log),
        })
    }

    type Messenger = Arc<DefaultBinaryMessenger>;

    fn messengers() -> (Messenger, Messenger, LoopbackTransport) {
        let (left, right) = LoopbackTransport::pair();
        let probe = right.clone();
        let a = DefaultBinaryMessenger::new(left, MessengerConfig::default()).unwrap();
        let b = DefaultBinaryMessenger::new(right, MessengerConfig::default()).unwrap();
        (a, b, probe)
    }

    #[tokio::test]
    async fn attach_and_detach_run_once() {
        let (_a, b, _probe) = messengers();
        let log = Log::default();
        let mut registry = PluginRegistry::new(b);

        let handle = registry.add_plugin("camera", recorder("cam", &log)).unwrap();
        assert!(registry.has_plugin("camera"));
        assert_eq!(registry.handle_of("camera"), Some(handle));

        assert!(registry.remove_plugin(handle));
        assert!(!registry.remove_plugin(handle));
        assert!(registry.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["attach:cam:camera", "detach:cam"]);
    }

    #[tokio::test]
    async fn duplicate_and_empty_names_are_rejected() {
        let (_a, b, _probe) = messengers();
        let log = Log::default();
        let mut registry = PluginRegistry::new(b);

        registry.add_plugin("gps", recorder("one", &log)).unwrap();
        assert_eq!(
            registry.add_plugin("gps", recorder("two", &log)).unwrap_err(),
            PluginError::AlreadyRegistered("gps".into())
        );
        assert_eq!(
            registry.add_plugin("", recorder("three", &log)).unwrap_err(),
            PluginError::EmptyName
        );
        assert_eq!(*log.lock().unwrap(), vec!["attach:one:gps"]);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let (_a, b, _probe) = messengers();
        let log = Log::default();
        let mut registry = PluginRegistry::with_config(b, RegistryConfig { max_plugins: 1 });

        registry.add_plugin("one", recorder("one", &log)).unwrap();
        assert_eq!(
            registry.add_plugin("two", recorder("two", &log)).unwrap_err(),
            PluginError::TooManyPlugins { max: 1 }
        );
    }

    #[tokio::test]
    async fn handles_stay_stable_across_removals() {
        let (_a, b, _probe) = messengers();
        let log = Log::default();
        let mut registry = PluginRegistry::new(b);

        let first = registry.add_plugin("first", recorder("1", &log)).unwrap();
        let second = registry.add_plugin("second", recorder("2", &log)).unwrap();
        registry.remove_plugin(first);
        let third = registry.add_plugin("first", recorder("3", &log)).unwrap();

        assert_ne!(first, third);
        assert_eq!(registry.handle_of("second"), Some(second));
        assert_eq!(registry.plugin_names(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn drop_detaches_in_reverse_order() {
        let (_a, b, _probe) = messengers();
        let log = Log::default();
        {
            let mut registry = PluginRegistry::new(b);
            registry.add_plugin("a", recorder("a", &log)).unwrap();
            registry.add_plugin("b", recorder("b", &log)).unwrap();
        }
        assert_eq!(
            *log.lock().unwrap(),
            vec!["attach:a:a", "attach:b:b", "detach:b", "detach:a"]
        );
    }

    struct Pinger {
        channel: Option<MethodChannel>,
    }

    impl Plugin for Pinger {
        fn on_attached(&mut self, binding: &PluginBinding) {
            let messenger = Arc::clone(binding.messenger());
            let channel = MethodChannel::new(binding.name(), messenger).unwrap();
            channel
                .set_method_call_handler(|_| async { Ok(Value::from("pong")) })
                .unwrap();
            self.channel = Some(channel);
        }

        fn on_detached(&mut self) {
            if let Some(channel) = self.channel.take() {
                channel.clear_method_call_handler().unwrap();
            }
        }
    }

    #[tokio::test]
    async fn attached_plugin_serves_its_channel() {
        let (a, b, probe) = messengers();
        let mut registry = PluginRegistry::new(b);
        let handle = registry
            .add_plugin("ping", Box::new(Pinger { channel: None }))
            .unwrap();
        assert!(probe.is_listening("ping"));

        let client = MethodChannel::new("ping", a).unwrap();
        let reply = client
            .invoke_method_and_await_reply("ping", Value::Null)
            .await
            .unwrap();
        assert_eq!(reply, Value::from("pong"));

        registry.remove_plugin(handle);
        assert!(!probe.is_listening("ping"));
    }
}
