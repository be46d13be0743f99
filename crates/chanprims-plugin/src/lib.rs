//! Attach/detach lifecycle for plugins that talk over chanprims channels.
//!
//! The host owns a [`PluginRegistry`] for as long as its engine lives. Each
//! plugin added to it is handed a [`PluginBinding`] carrying the shared
//! binary messenger, and is detached exactly once: when removed, when the
//! registry is cleared, or when the registry is dropped.

pub mod config;
pub mod error;
pub mod registry;

pub use config::RegistryConfig;
pub use error::{PluginError, Result};
pub use registry::{Plugin, PluginBinding, PluginHandle, PluginRegistry};
