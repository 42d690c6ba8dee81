//! Plugin capability interface and the built-in marker plugin.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::PluginError;
use crate::identity::CaseKey;

/// A side effect set up before a target test and undone after it.
///
/// `start` runs on the runner's background thread; `stop` runs on the
/// harness thread once the start task has been joined.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn start(&self, case: &CaseKey) -> Result<(), PluginError>;

    fn stop(&self, case: &CaseKey) -> Result<(), PluginError>;
}

/// Emits a diagnostic marker on start and stop.
///
/// Stands where device-specific setup (toggling a system feature under test)
/// would be wired in.
#[derive(Debug, Default)]
pub struct MarkerPlugin {
    loads: AtomicUsize,
    resets: AtomicUsize,
}

impl MarkerPlugin {
    pub const NAME: &'static str = "marker";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl Plugin for MarkerPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn start(&self, case: &CaseKey) -> Result<(), PluginError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tracing::info!(case = %case, "load plugin {}", case.method);
        Ok(())
    }

    fn stop(&self, case: &CaseKey) -> Result<(), PluginError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        tracing::info!(case = %case, "reset plugin {}", case.method);
        Ok(())
    }
}
