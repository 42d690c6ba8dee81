//! The set of test cases that engage a plugin.

use std::collections::BTreeMap;

use crate::error::HookError;
use crate::identity::{CaseKey, TestIdentity};

pub const DEFAULT_TARGET_PACKAGE: &str = "android.net.cts";
pub const DEFAULT_TARGET_CLASS: &str = "android.net.cts.ConnectivityManagerTest";
pub const DEFAULT_TARGET_METHOD: &str = "testGetNetworkInfo";
pub const DEFAULT_PLUGIN: &str = "marker";

/// Configured targets, each bound to the name of the plugin it engages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    targets: BTreeMap<CaseKey, String>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single connectivity case the hook ships with, bound to `marker`.
    pub fn builtin() -> Self {
        let mut set = Self::new();
        set.targets.insert(
            CaseKey::new(
                DEFAULT_TARGET_PACKAGE,
                DEFAULT_TARGET_CLASS,
                DEFAULT_TARGET_METHOD,
            ),
            DEFAULT_PLUGIN.to_string(),
        );
        set
    }

    /// Adds a target. Empty fields and repeated triples are rejected.
    pub fn insert(&mut self, case: CaseKey, plugin: impl Into<String>) -> Result<(), HookError> {
        let plugin = plugin.into();
        if case.package.trim().is_empty()
            || case.class.trim().is_empty()
            || case.method.trim().is_empty()
        {
            return Err(HookError::InvalidTarget(format!(
                "empty field in {case:?}"
            )));
        }
        if plugin.trim().is_empty() {
            return Err(HookError::InvalidTarget(format!("{case} has no plugin")));
        }
        if self.targets.contains_key(&case) {
            return Err(HookError::DuplicateTarget(case.to_string()));
        }
        self.targets.insert(case, plugin);
        Ok(())
    }

    pub fn with_target(
        mut self,
        case: CaseKey,
        plugin: impl Into<String>,
    ) -> Result<Self, HookError> {
        self.insert(case, plugin)?;
        Ok(self)
    }

    /// Plugin bound to `case`, if `case` is a target.
    pub fn plugin_for(&self, case: &CaseKey) -> Option<&str> {
        self.targets.get(case).map(String::as_str)
    }

    /// Full-triple membership. Absent fields never match.
    pub fn matches(&self, identity: &TestIdentity) -> bool {
        identity
            .case_key()
            .is_some_and(|case| self.targets.contains_key(&case))
    }

    pub fn prefers_package(&self, package: Option<&str>) -> bool {
        package.is_some_and(|p| self.targets.keys().any(|case| case.package == p))
    }

    pub fn prefers_class(&self, class: Option<&str>) -> bool {
        class.is_some_and(|c| self.targets.keys().any(|case| case.class == c))
    }

    pub fn prefers_method(&self, method: Option<&str>) -> bool {
        method.is_some_and(|m| self.targets.keys().any(|case| case.method == m))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CaseKey, &str)> {
        self.targets.iter().map(|(case, plugin)| (case, plugin.as_str()))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
