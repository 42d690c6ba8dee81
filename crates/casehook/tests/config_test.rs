#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Building a hook from YAML config and checking the JSON-lines event trail.

use casehook::config::{load_config, parse_config};
use casehook::{HookError, PluginRegistry, TestIdentityRecord};

#[test]
fn config_file_drives_targets_and_event_log() {
    let dir = tempfile::tempdir().unwrap();
    let events = dir.path().join("events.jsonl");
    let config_path = dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        format!(
            concat!(
                "targets:\n",
                "  - package: pkg\n",
                "    class: pkg.Cls\n",
                "    method: testIt\n",
                "    plugin: marker\n",
                "runner:\n",
                "  join_timeout_ms: 1000\n",
                "events:\n",
                "  path: {}\n",
            ),
            events.display()
        ),
    )
    .unwrap();

    let (cfg, used) = load_config(Some(config_path.to_str().unwrap())).unwrap();
    assert_eq!(used.as_deref(), Some(config_path.as_path()));

    let mut record =
        TestIdentityRecord::from_config(&cfg, PluginRegistry::with_builtins()).unwrap();
    assert!(record.begin_test("pkg", "pkg.Cls", "testIt").unwrap());
    let report = record.end_of_test().unwrap();
    assert!(report.setup.is_success());

    let text = std::fs::read_to_string(&events).unwrap();
    let kinds: Vec<String> = text
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["kind"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds, vec!["setup", "teardown"]);
}

#[test]
fn builtin_target_is_disabled_by_empty_list() {
    let cfg = parse_config("targets: []\n").unwrap();
    let mut record =
        TestIdentityRecord::from_config(&cfg, PluginRegistry::with_builtins()).unwrap();
    assert!(!record
        .begin_test(
            "android.net.cts",
            "android.net.cts.ConnectivityManagerTest",
            "testGetNetworkInfo",
        )
        .unwrap());
    assert!(record.end_of_test().is_none());
}

#[test]
fn unknown_plugin_in_config_is_rejected() {
    let cfg = parse_config(
        "targets:\n  - package: p\n    class: c\n    method: m\n    plugin: bluetooth\n",
    )
    .unwrap();
    let err =
        TestIdentityRecord::from_config(&cfg, PluginRegistry::with_builtins()).unwrap_err();
    assert!(matches!(err, HookError::UnknownPlugin { ref plugin, .. } if plugin == "bluetooth"));
}
