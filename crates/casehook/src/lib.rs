//! casehook: per-test plugin hook for test-execution harnesses.
//!
//! The harness owns a `TestIdentityRecord` and reports each test's package,
//! class and method to it. When the identity is one of the configured
//! targets, the bound `Plugin` is started on a background thread before the
//! test and stopped after it.
//!
//! - `TargetSet` / `CaseKey`: which test cases engage which plugin
//! - `PluginRegistry` / `Plugin`: name → setup/teardown capability
//! - `PluginRunner`: one background task per activation, joined at end
//! - `HookEventSink`: audit trail of every setup and teardown

pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod logging;
pub mod plugin;
pub mod record;
pub mod registry;
pub mod runner;
pub mod target;

pub use error::{HookError, PluginError};
pub use identity::{CaseKey, TestIdentity};
pub use plugin::{MarkerPlugin, Plugin};
pub use record::TestIdentityRecord;
pub use registry::PluginRegistry;
pub use runner::{EndReport, PluginRunner, RunnerState, TaskOutcome};
pub use target::TargetSet;

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "casehook"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_label_is_stable() {
        assert_eq!(crate_label(), "casehook");
    }
}
