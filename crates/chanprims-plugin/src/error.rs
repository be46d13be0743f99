/// Errors raised by the plugin registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    /// Plugin names must be non-empty.
    #[error("plugin name must not be empty")]
    EmptyName,

    /// A plugin with this name is already attached.
    #[error("plugin already registered: {0}")]
    AlreadyRegistered(String),

    /// The registry is at its configured capacity.
    #[error("plugin count exceeds configured max ({max})")]
    TooManyPlugins { max: usize },
}

pub type Result<T> = std::result::Result<T, PluginError>;
