//! Hook event recording.
//!
//! Every setup and teardown dispatch produces a `HookEvent`. Sinks decide
//! what to do with them: keep them in memory for tests, drop them, or append
//! them to a JSON-lines file for later inspection.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::identity::CaseKey;

/// Which half of the plugin lifecycle produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEventKind {
    Setup,
    Teardown,
}

impl std::fmt::Display for HookEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Setup => "setup",
            Self::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

/// Outcome of one plugin action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum HookEventOutcome {
    Success,
    Error(String),
    Panicked(String),
    /// The setup task outlived the join deadline and was left running.
    Detached,
}

impl std::fmt::Display for HookEventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Error(msg) => write!(f, "error: {msg}"),
            Self::Panicked(msg) => write!(f, "panicked: {msg}"),
            Self::Detached => f.write_str("detached"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HookEvent {
    pub timestamp: DateTime<Utc>,
    pub case: CaseKey,
    pub plugin: String,
    pub kind: HookEventKind,
    pub outcome: HookEventOutcome,
}

impl HookEvent {
    pub fn new(
        case: CaseKey,
        plugin: impl Into<String>,
        kind: HookEventKind,
        outcome: HookEventOutcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            case,
            plugin: plugin.into(),
            kind,
            outcome,
        }
    }
}

/// Receives hook events. Called from the setup thread as well as the
/// harness thread.
pub trait HookEventSink: Send + Sync {
    fn record(&self, event: HookEvent);
}

/// In-memory event sink for testing.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<HookEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HookEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Event kinds in recording order.
    pub fn kinds(&self) -> Vec<HookEventKind> {
        self.events().iter().map(|event| event.kind).collect()
    }
}

impl HookEventSink for InMemoryEventSink {
    fn record(&self, event: HookEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

pub struct NullEventSink;

impl HookEventSink for NullEventSink {
    fn record(&self, _event: HookEvent) {}
}

/// Appends each event as one JSON object per line.
pub struct JsonLinesEventSink {
    file: Mutex<File>,
}

impl JsonLinesEventSink {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl HookEventSink for JsonLinesEventSink {
    fn record(&self, event: HookEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "encode hook event");
                return;
            }
        };
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(file, "{line}") {
            tracing::warn!(error = %err, "write hook event");
        }
    }
}
