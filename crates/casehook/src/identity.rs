//! Test identity types.
//!
//! `TestIdentity` is the mutable, possibly incomplete (package, class, method)
//! record the harness fills in before each test. `CaseKey` is a complete
//! triple and is what targets and plugins are keyed on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The identity of the test currently being executed.
///
/// Fields stay `None` until the harness sets them and are overwritten, never
/// cleared, when the next test starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestIdentity {
    pub package: Option<String>,
    pub class: Option<String>,
    pub method: Option<String>,
}

impl TestIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the complete triple, or `None` if any field is absent.
    pub fn case_key(&self) -> Option<CaseKey> {
        match (&self.package, &self.class, &self.method) {
            (Some(package), Some(class), Some(method)) => {
                Some(CaseKey::new(package, class, method))
            }
            _ => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.package.is_some() && self.class.is_some() && self.method.is_some()
    }
}

/// A complete (package, class, method) triple naming one test case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseKey {
    pub package: String,
    pub class: String,
    pub method: String,
}

impl CaseKey {
    pub fn new(
        package: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.package, self.class, self.method)
    }
}
