//! Devfile component translation: containers, common environment and plugins.

pub mod container;
pub mod plugins;

pub use container::{EnvContext, container_for, has_mount_sources};
pub use plugins::{BuiltinPluginResolver, PluginResolver};
