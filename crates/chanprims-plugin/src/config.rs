/// Limits for a [`PluginRegistry`](crate::PluginRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of plugins attached at once.
    pub max_plugins: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_plugins: 256 }
    }
}
