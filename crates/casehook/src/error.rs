//! Error types for hook setup and plugin actions.
//!
//! `HookError` covers building and driving the hook (configuration, registry,
//! thread spawning). `PluginError` is what a plugin action returns; it never
//! escapes the record's lifecycle calls and is only logged and reported.

/// Errors raised while configuring or driving the hook.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("spawn plugin task for {case}: {message}")]
    Spawn { case: String, message: String },
    #[error("target {case} names unknown plugin {plugin:?}")]
    UnknownPlugin { case: String, plugin: String },
    #[error("plugin {0:?} is already registered")]
    DuplicatePlugin(String),
    #[error("target {0} is configured more than once")]
    DuplicateTarget(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("invalid plugin: {0}")]
    InvalidPlugin(String),
    #[error("config: {0}")]
    Config(String),
    #[error("io: {0}")]
    Io(String),
}

impl From<std::io::Error> for HookError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure of a plugin's start or stop action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("plugin {plugin:?} failed: {message}")]
    Failed { plugin: String, message: String },
}

impl PluginError {
    pub fn failed(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}
