//! Background task lifecycle for one plugin activation.
//!
//! A `PluginRunner` is either Idle (no task handle) or Running (handle held).
//! `start` moves Idle → Running by spawning the plugin's setup action on a
//! dedicated thread; `end` moves back to Idle after joining that thread and
//! running the teardown action. A setup task that misses the join deadline
//! is detached and runs teardown itself once `start` returns. Plugin errors
//! and panics are caught on both paths and reported through `TaskOutcome`
//! and the event sink; they never unwind into the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{HookError, PluginError};
use crate::event::{HookEvent, HookEventKind, HookEventOutcome, HookEventSink};
use crate::identity::CaseKey;
use crate::plugin::Plugin;

pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(30);
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("running"),
        }
    }
}

/// Result of one plugin action as seen by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// No setup task was in flight when `end` was called.
    NotStarted,
    Completed,
    Failed(String),
    Panicked(String),
    /// The setup task missed the join deadline and was left running.
    Detached,
    /// Teardown was handed to the detached setup thread.
    Deferred,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    fn event_outcome(&self) -> Option<HookEventOutcome> {
        match self {
            Self::NotStarted => None,
            Self::Completed => Some(HookEventOutcome::Success),
            Self::Failed(msg) => Some(HookEventOutcome::Error(msg.clone())),
            Self::Panicked(msg) => Some(HookEventOutcome::Panicked(msg.clone())),
            Self::Detached => Some(HookEventOutcome::Detached),
            // The setup thread records the real teardown outcome.
            Self::Deferred => None,
        }
    }
}

/// What `end` observed for the setup task and the teardown action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndReport {
    pub case: CaseKey,
    pub plugin: String,
    pub setup: TaskOutcome,
    pub teardown: TaskOutcome,
}

pub struct PluginRunner {
    case: CaseKey,
    plugin: Arc<dyn Plugin>,
    sink: Arc<dyn HookEventSink>,
    join_timeout: Duration,
    task: Option<SetupTask>,
}

struct SetupTask {
    handle: JoinHandle<TaskOutcome>,
    handoff: Arc<Mutex<Handoff>>,
}

/// Decides, under one lock, who owns teardown once the join deadline hits.
#[derive(Debug, Default)]
struct Handoff {
    /// Setup finished and its event is the setup thread's to record.
    settled: bool,
    /// `end` gave up waiting; the setup thread runs teardown itself.
    abandoned: bool,
}

enum Joined {
    Done(TaskOutcome),
    /// The thread died outside `guard`, so nothing reached the sink.
    Escaped(String),
    Abandoned,
}

impl std::fmt::Debug for PluginRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRunner")
            .field("case", &self.case)
            .field("plugin", &self.plugin.name())
            .field("join_timeout", &self.join_timeout)
            .field("state", &self.state())
            .finish()
    }
}

impl PluginRunner {
    pub fn new(case: CaseKey, plugin: Arc<dyn Plugin>, sink: Arc<dyn HookEventSink>) -> Self {
        Self {
            case,
            plugin,
            sink,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            task: None,
        }
    }

    /// How long `end` waits for the setup task. `Duration::ZERO` does not
    /// wait at all; teardown then runs on the setup thread after `start`.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn case(&self) -> &CaseKey {
        &self.case
    }

    pub fn plugin_name(&self) -> &str {
        self.plugin.name()
    }

    pub fn state(&self) -> RunnerState {
        if self.task.is_some() {
            RunnerState::Running
        } else {
            RunnerState::Idle
        }
    }

    /// Launches the setup task if Idle. Returns `Ok(false)` when a task is
    /// already held.
    pub fn start(&mut self) -> Result<bool, HookError> {
        if self.task.is_some() {
            tracing::debug!(
                case = %self.case,
                plugin = self.plugin.name(),
                "plugin task already running"
            );
            return Ok(false);
        }

        let case = self.case.clone();
        let plugin = Arc::clone(&self.plugin);
        let sink = Arc::clone(&self.sink);
        let handoff = Arc::new(Mutex::new(Handoff::default()));
        let task_handoff = Arc::clone(&handoff);
        let handle = thread::Builder::new()
            .name(format!("casehook-{}", self.plugin.name()))
            .spawn(move || run_setup(plugin.as_ref(), &case, sink.as_ref(), &task_handoff))
            .map_err(|err| HookError::Spawn {
                case: self.case.to_string(),
                message: err.to_string(),
            })?;

        tracing::debug!(case = %self.case, plugin = self.plugin.name(), "plugin task started");
        self.task = Some(SetupTask { handle, handoff });
        Ok(true)
    }

    /// Joins the setup task (bounded by the join timeout), runs teardown and
    /// returns to Idle. Safe to call while Idle.
    ///
    /// If the setup task misses the deadline it is detached and teardown is
    /// deferred to it, so `stop` still runs after `start` returns.
    pub fn end(&mut self) -> EndReport {
        let (setup, deferred) = match self.task.take() {
            Some(task) => match self.join_with_deadline(task) {
                Joined::Done(outcome) => (outcome, false),
                Joined::Escaped(msg) => {
                    tracing::error!(
                        case = %self.case,
                        plugin = self.plugin.name(),
                        panic = %msg,
                        "plugin task aborted"
                    );
                    let outcome = TaskOutcome::Panicked(msg);
                    self.record(HookEventKind::Setup, &outcome);
                    (outcome, false)
                }
                Joined::Abandoned => {
                    tracing::warn!(
                        case = %self.case,
                        plugin = self.plugin.name(),
                        timeout_ms = self.join_timeout.as_millis() as u64,
                        "plugin task still running at end of test; detaching"
                    );
                    (TaskOutcome::Detached, true)
                }
            },
            None => (TaskOutcome::NotStarted, false),
        };

        let teardown = if deferred {
            TaskOutcome::Deferred
        } else {
            let outcome = guard("stop", self.plugin.name(), &self.case, || {
                self.plugin.stop(&self.case)
            });
            self.record(HookEventKind::Teardown, &outcome);
            outcome
        };
        tracing::debug!(case = %self.case, plugin = self.plugin.name(), "plugin task ended");

        EndReport {
            case: self.case.clone(),
            plugin: self.plugin.name().to_string(),
            setup,
            teardown,
        }
    }

    fn join_with_deadline(&self, task: SetupTask) -> Joined {
        let deadline = Instant::now() + self.join_timeout;
        while !task.handle.is_finished() {
            if Instant::now() >= deadline {
                let mut state = lock_handoff(&task.handoff);
                if !state.settled {
                    state.abandoned = true;
                    // Recorded under the lock so the deferred teardown event
                    // cannot overtake it.
                    self.record(HookEventKind::Setup, &TaskOutcome::Detached);
                    return Joined::Abandoned;
                }
                // Setup settled just now; the thread is only recording its event.
                break;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        match task.handle.join() {
            Ok(outcome) => Joined::Done(outcome),
            Err(payload) => Joined::Escaped(panic_message(payload)),
        }
    }

    fn record(&self, kind: HookEventKind, outcome: &TaskOutcome) {
        record_event(self.sink.as_ref(), &self.case, self.plugin.name(), kind, outcome);
    }
}

impl Drop for PluginRunner {
    fn drop(&mut self) {
        if self.task.is_some() {
            tracing::warn!(
                case = %self.case,
                plugin = self.plugin.name(),
                "plugin runner dropped while running; task detached without teardown"
            );
        }
    }
}

fn run_setup(
    plugin: &dyn Plugin,
    case: &CaseKey,
    sink: &dyn HookEventSink,
    handoff: &Mutex<Handoff>,
) -> TaskOutcome {
    let outcome = guard("start", plugin.name(), case, || plugin.start(case));

    let abandoned = {
        let mut state = lock_handoff(handoff);
        if !state.abandoned {
            state.settled = true;
        }
        state.abandoned
    };

    if abandoned {
        // `end` already recorded Setup as detached.
        tracing::debug!(case = %case, plugin = plugin.name(), "running deferred teardown");
        let teardown = guard("stop", plugin.name(), case, || plugin.stop(case));
        record_event(sink, case, plugin.name(), HookEventKind::Teardown, &teardown);
    } else {
        record_event(sink, case, plugin.name(), HookEventKind::Setup, &outcome);
    }
    outcome
}

fn record_event(
    sink: &dyn HookEventSink,
    case: &CaseKey,
    plugin: &str,
    kind: HookEventKind,
    outcome: &TaskOutcome,
) {
    if let Some(outcome) = outcome.event_outcome() {
        sink.record(HookEvent::new(case.clone(), plugin, kind, outcome));
    }
}

/// Runs one plugin action, turning errors and panics into a `TaskOutcome`.
fn guard(
    op: &'static str,
    plugin: &str,
    case: &CaseKey,
    f: impl FnOnce() -> Result<(), PluginError>,
) -> TaskOutcome {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(err)) => {
            tracing::warn!(case = %case, plugin, op, error = %err, "plugin action failed");
            TaskOutcome::Failed(err.to_string())
        }
        Err(payload) => {
            let msg = panic_message(payload);
            tracing::error!(case = %case, plugin, op, panic = %msg, "plugin action panicked");
            TaskOutcome::Panicked(msg)
        }
    }
}

fn lock_handoff(handoff: &Mutex<Handoff>) -> MutexGuard<'_, Handoff> {
    match handoff.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::event::InMemoryEventSink;
    use crate::plugin::MarkerPlugin;

    fn case() -> CaseKey {
        CaseKey::new("p", "c", "m")
    }

    #[test]
    fn end_on_idle_runner_only_tears_down() {
        let sink = Arc::new(InMemoryEventSink::new());
        let plugin = Arc::new(MarkerPlugin::new());
        let mut runner = PluginRunner::new(case(), plugin.clone(), sink.clone());

        let report = runner.end();
        assert_eq!(report.setup, TaskOutcome::NotStarted);
        assert_eq!(report.teardown, TaskOutcome::Completed);
        assert_eq!(runner.state(), RunnerState::Idle);
        assert_eq!(plugin.load_count(), 0);
        assert_eq!(plugin.reset_count(), 1);
        assert_eq!(sink.kinds(), vec![HookEventKind::Teardown]);
    }

    #[test]
    fn second_start_is_a_no_op() {
        let sink = Arc::new(InMemoryEventSink::new());
        let plugin = Arc::new(MarkerPlugin::new());
        let mut runner = PluginRunner::new(case(), plugin.clone(), sink.clone());

        assert!(runner.start().unwrap());
        assert!(!runner.start().unwrap());
        assert_eq!(runner.state(), RunnerState::Running);

        let report = runner.end();
        assert_eq!(report.setup, TaskOutcome::Completed);
        assert_eq!(plugin.load_count(), 1);
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[test]
    fn zero_timeout_still_tears_down_once_after_setup() {
        let sink = Arc::new(InMemoryEventSink::new());
        let plugin = Arc::new(MarkerPlugin::new());
        let mut runner = PluginRunner::new(case(), plugin.clone(), sink.clone())
            .with_join_timeout(Duration::ZERO);

        assert!(runner.start().unwrap());
        let report = runner.end();
        assert_eq!(runner.state(), RunnerState::Idle);

        // Either the thread settled first or teardown was handed to it.
        match report.setup {
            TaskOutcome::Completed => assert_eq!(report.teardown, TaskOutcome::Completed),
            TaskOutcome::Detached => assert_eq!(report.teardown, TaskOutcome::Deferred),
            other => panic!("unexpected setup outcome {other:?}"),
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.count() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(plugin.load_count(), 1);
        assert_eq!(plugin.reset_count(), 1);
        assert_eq!(
            sink.kinds(),
            vec![HookEventKind::Setup, HookEventKind::Teardown]
        );
    }

    #[test]
    fn panic_message_extracts_strings() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }

    #[test]
    fn state_display() {
        assert_eq!(RunnerState::Idle.to_string(), "idle");
        assert_eq!(RunnerState::Running.to_string(), "running");
    }
}
