//! The harness-facing hook: tracks which test is running and engages the
//! bound plugin when that test is a configured target.
//!
//! The harness owns one `TestIdentityRecord` and calls `set_package`,
//! `set_class` and `set_method` (in that order) before each test, then
//! `end_of_test` after it. Setting the method is the only trigger point.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::HookError;
use crate::event::{HookEventSink, JsonLinesEventSink, NullEventSink};
use crate::identity::{CaseKey, TestIdentity};
use crate::registry::PluginRegistry;
use crate::runner::{EndReport, PluginRunner, RunnerState, DEFAULT_JOIN_TIMEOUT};
use crate::target::TargetSet;

pub struct TestIdentityRecord {
    identity: TestIdentity,
    targets: TargetSet,
    registry: PluginRegistry,
    sink: Arc<dyn HookEventSink>,
    join_timeout: Duration,
    active: Option<PluginRunner>,
}

impl std::fmt::Debug for TestIdentityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestIdentityRecord")
            .field("identity", &self.identity)
            .field("targets", &self.targets)
            .field("registry", &self.registry)
            .field("join_timeout", &self.join_timeout)
            .field("active", &self.active)
            .finish()
    }
}

impl TestIdentityRecord {
    /// Builds a record. Every target must name a plugin in `registry`.
    pub fn new(
        targets: TargetSet,
        registry: PluginRegistry,
        sink: Arc<dyn HookEventSink>,
    ) -> Result<Self, HookError> {
        registry.validate(&targets)?;
        Ok(Self {
            identity: TestIdentity::new(),
            targets,
            registry,
            sink,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            active: None,
        })
    }

    /// Builds a record from loaded config. Events go to the configured
    /// JSON-lines file, or nowhere.
    pub fn from_config(cfg: &Config, registry: PluginRegistry) -> Result<Self, HookError> {
        let sink: Arc<dyn HookEventSink> = match &cfg.events.path {
            Some(path) => Arc::new(JsonLinesEventSink::open(path)?),
            None => Arc::new(NullEventSink),
        };
        let record = Self::new(cfg.targets.clone(), registry, sink)?;
        Ok(record.with_join_timeout(cfg.runner.join_timeout))
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn set_package(&mut self, package: impl Into<String>) {
        let package = package.into();
        tracing::debug!(package = %package, "set test package");
        self.identity.package = Some(package);
    }

    pub fn set_class(&mut self, class: impl Into<String>) {
        self.identity.class = Some(class.into());
    }

    /// Stores the method and, if the identity is now a target, starts the
    /// bound plugin. Returns whether a plugin task was launched.
    ///
    /// A runner left active by a test that never reached `end_of_test` is
    /// ended first.
    pub fn set_method(&mut self, method: impl Into<String>) -> Result<bool, HookError> {
        self.identity.method = Some(method.into());

        if let Some(mut stale) = self.active.take() {
            tracing::warn!(case = %stale.case(), "previous test did not end; ending its plugin");
            stale.end();
        }

        tracing::debug!(
            class = ?self.identity.class,
            method = ?self.identity.method,
            "evaluate preferred case"
        );
        let Some(case) = self.matched_case() else {
            return Ok(false);
        };
        let Some(mut runner) = self.build_runner(case) else {
            return Ok(false);
        };

        let started = runner.start()?;
        tracing::info!(case = %runner.case(), plugin = runner.plugin_name(), "plugin started");
        self.active = Some(runner);
        Ok(started)
    }

    /// Sets package, class and method in the order the harness would.
    pub fn begin_test(
        &mut self,
        package: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
    ) -> Result<bool, HookError> {
        self.set_package(package);
        self.set_class(class);
        self.set_method(method)
    }

    /// Ends the plugin started for the current test.
    ///
    /// With no active runner, a matching identity still gets a teardown from
    /// a fresh runner. Returns `None` when nothing matched.
    pub fn end_of_test(&mut self) -> Option<EndReport> {
        let mut runner = match self.active.take() {
            Some(runner) => runner,
            None => {
                let case = self.matched_case()?;
                tracing::debug!(case = %case, "no active plugin; running teardown only");
                self.build_runner(case)?
            }
        };
        let report = runner.end();
        tracing::info!(
            case = %report.case,
            plugin = %report.plugin,
            setup = ?report.setup,
            teardown = ?report.teardown,
            "plugin ended"
        );
        Some(report)
    }

    pub fn package(&self) -> Option<&str> {
        self.identity.package.as_deref()
    }

    pub fn class(&self) -> Option<&str> {
        self.identity.class.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.identity.method.as_deref()
    }

    pub fn identity(&self) -> &TestIdentity {
        &self.identity
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    /// True iff the complete current identity is a configured target.
    pub fn is_preferred_case(&self) -> bool {
        self.targets.matches(&self.identity)
    }

    /// State of the runner started for the current test, if any.
    pub fn active_state(&self) -> Option<RunnerState> {
        self.active.as_ref().map(PluginRunner::state)
    }

    fn matched_case(&self) -> Option<CaseKey> {
        self.identity
            .case_key()
            .filter(|case| self.targets.plugin_for(case).is_some())
    }

    fn build_runner(&self, case: CaseKey) -> Option<PluginRunner> {
        let name = self.targets.plugin_for(&case)?;
        let Some(plugin) = self.registry.get(name) else {
            tracing::warn!(case = %case, plugin = name, "target plugin is not registered");
            return None;
        };
        let runner = PluginRunner::new(case, plugin, Arc::clone(&self.sink));
        Some(runner.with_join_timeout(self.join_timeout))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event::{HookEventKind, InMemoryEventSink};
    use crate::target::{DEFAULT_TARGET_CLASS, DEFAULT_TARGET_METHOD, DEFAULT_TARGET_PACKAGE};

    fn record() -> (TestIdentityRecord, Arc<InMemoryEventSink>) {
        let sink = Arc::new(InMemoryEventSink::new());
        let record = TestIdentityRecord::new(
            TargetSet::builtin(),
            PluginRegistry::with_builtins(),
            sink.clone(),
        )
        .unwrap();
        (record, sink)
    }

    #[test]
    fn package_and_class_do_not_trigger() {
        let (mut record, sink) = record();
        record.set_package(DEFAULT_TARGET_PACKAGE);
        record.set_class(DEFAULT_TARGET_CLASS);
        assert_eq!(record.active_state(), None);
        assert_eq!(record.package(), Some(DEFAULT_TARGET_PACKAGE));
        assert_eq!(record.class(), Some(DEFAULT_TARGET_CLASS));
        assert_eq!(record.method(), None);
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn method_without_package_never_matches() {
        let (mut record, _sink) = record();
        record.set_class(DEFAULT_TARGET_CLASS);
        assert!(!record.set_method(DEFAULT_TARGET_METHOD).unwrap());
        assert!(!record.is_preferred_case());
        assert_eq!(record.active_state(), None);
        assert!(record.end_of_test().is_none());
    }

    #[test]
    fn matching_method_starts_runner() {
        let (mut record, _sink) = record();
        let started = record
            .begin_test(DEFAULT_TARGET_PACKAGE, DEFAULT_TARGET_CLASS, DEFAULT_TARGET_METHOD)
            .unwrap();
        assert!(started);
        assert!(record.is_preferred_case());
        assert_eq!(record.active_state(), Some(RunnerState::Running));

        let report = record.end_of_test().unwrap();
        assert!(report.setup.is_success());
        assert!(report.teardown.is_success());
        assert_eq!(record.active_state(), None);
    }

    #[test]
    fn end_without_start_tears_down_matching_identity() {
        let (mut record, sink) = record();
        // Fill the identity without going through the trigger.
        record.identity = TestIdentity {
            package: Some(DEFAULT_TARGET_PACKAGE.into()),
            class: Some(DEFAULT_TARGET_CLASS.into()),
            method: Some(DEFAULT_TARGET_METHOD.into()),
        };
        let report = record.end_of_test().unwrap();
        assert_eq!(report.setup, crate::runner::TaskOutcome::NotStarted);
        assert_eq!(sink.kinds(), vec![HookEventKind::Teardown]);
    }

    #[test]
    fn rejects_target_with_unregistered_plugin() {
        let err = TestIdentityRecord::new(
            TargetSet::builtin(),
            PluginRegistry::new(),
            Arc::new(NullEventSink),
        )
        .unwrap_err();
        assert!(matches!(err, HookError::UnknownPlugin { .. }));
    }
}
