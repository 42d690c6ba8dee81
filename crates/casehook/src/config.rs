use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::HookError;
use crate::identity::CaseKey;
use crate::runner::DEFAULT_JOIN_TIMEOUT;
use crate::target::{TargetSet, DEFAULT_PLUGIN};

#[derive(Debug, Clone)]
pub struct Config {
    pub targets: TargetSet,
    pub runner: RunnerConfig,
    pub logging: LoggingConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub join_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Default)]
pub struct EventsConfig {
    /// JSON-lines file receiving hook events; none keeps events in-process.
    pub path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: TargetSet::builtin(),
            runner: RunnerConfig {
                join_timeout: DEFAULT_JOIN_TIMEOUT,
            },
            logging: LoggingConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "console".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PartialConfig {
    #[serde(default)]
    targets: Option<Vec<PartialTarget>>,
    #[serde(default)]
    runner: PartialRunnerConfig,
    #[serde(default)]
    logging: PartialLoggingConfig,
    #[serde(default)]
    events: PartialEventsConfig,
}

#[derive(Debug, Deserialize)]
struct PartialTarget {
    #[serde(default)]
    package: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    method: String,
    #[serde(default)]
    plugin: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialRunnerConfig {
    #[serde(default)]
    join_timeout_ms: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialLoggingConfig {
    #[serde(default)]
    level: String,
    #[serde(default)]
    format: String,
}

#[derive(Debug, Default, Deserialize)]
struct PartialEventsConfig {
    #[serde(default)]
    path: String,
}

/// Load config with precedence defaults < (optional) config file.
///
/// An explicit path that cannot be read is a hard error; a missing default
/// file is not.
pub fn load_config(config_file: Option<&str>) -> Result<(Config, Option<PathBuf>), HookError> {
    let explicit = config_file
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let (path_to_try, used) = match explicit {
        Some(path) => (Some(path), true),
        None => (default_config_path(), false),
    };

    if let Some(path) = path_to_try {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let cfg = parse_config(&text)?;
                tracing::debug!(
                    path = %path.display(),
                    targets = cfg.targets.len(),
                    "loaded hook config"
                );
                return Ok((cfg, Some(path)));
            }
            Err(err) => {
                if used {
                    return Err(HookError::Config(format!(
                        "failed to load config file {}: {err}",
                        path.display()
                    )));
                }
            }
        }
    }

    Ok((Config::default(), None))
}

/// Parses YAML text on top of the defaults.
pub fn parse_config(text: &str) -> Result<Config, HookError> {
    let parsed: PartialConfig = serde_yaml::from_str(text)
        .map_err(|err| HookError::Config(format!("parse config: {err}")))?;
    let mut cfg = Config::default();
    apply_partial(&mut cfg, parsed)?;
    Ok(cfg)
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join("casehook").join("config.yaml"));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(
                PathBuf::from(home)
                    .join(".config")
                    .join("casehook")
                    .join("config.yaml"),
            );
        }
    }
    None
}

fn apply_partial(cfg: &mut Config, partial: PartialConfig) -> Result<(), HookError> {
    // A present `targets` list replaces the built-in target, even when empty.
    if let Some(targets) = partial.targets {
        let mut set = TargetSet::new();
        for target in targets {
            let plugin = if target.plugin.trim().is_empty() {
                DEFAULT_PLUGIN.to_string()
            } else {
                target.plugin.trim().to_string()
            };
            set.insert(
                CaseKey::new(
                    target.package.trim(),
                    target.class.trim(),
                    target.method.trim(),
                ),
                plugin,
            )?;
        }
        cfg.targets = set;
    }
    // Zero is honoured: `end` then detaches a setup that has not finished.
    match partial.runner.join_timeout_ms {
        Some(ms) if ms < 0 => {
            return Err(HookError::Config(format!(
                "join_timeout_ms must not be negative, got {ms}"
            )));
        }
        Some(ms) => cfg.runner.join_timeout = Duration::from_millis(ms.unsigned_abs()),
        None => {}
    }
    if !partial.logging.level.trim().is_empty() {
        cfg.logging.level = partial.logging.level.trim().to_string();
    }
    if !partial.logging.format.trim().is_empty() {
        let format = partial.logging.format.trim().to_ascii_lowercase();
        if format != "console" && format != "json" {
            return Err(HookError::Config(format!("unknown logging format {format:?}")));
        }
        cfg.logging.format = format;
    }
    if !partial.events.path.trim().is_empty() {
        cfg.events.path = Some(expand_tilde(partial.events.path.trim())?);
    }
    Ok(())
}

fn expand_tilde(input: &str) -> Result<PathBuf, HookError> {
    if input == "~" {
        let home = std::env::var("HOME")
            .map_err(|_| HookError::Config("failed to resolve HOME".to_string()))?;
        return Ok(PathBuf::from(home));
    }
    if let Some(rest) = input.strip_prefix("~/") {
        let home = std::env::var("HOME")
            .map_err(|_| HookError::Config("failed to resolve HOME".to_string()))?;
        return Ok(PathBuf::from(home).join(rest));
    }
    Ok(Path::new(input).to_path_buf())
}
