//! Name → plugin registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::HookError;
use crate::plugin::{MarkerPlugin, Plugin};
use crate::target::TargetSet;

#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `marker` plugin.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .plugins
            .insert(MarkerPlugin::NAME.to_string(), Arc::new(MarkerPlugin::new()));
        registry
    }

    /// Registers `plugin` under its own name.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), HookError> {
        let name = plugin.name().trim().to_string();
        if name.is_empty() {
            return Err(HookError::InvalidPlugin("plugin name is empty".to_string()));
        }
        if self.plugins.contains_key(&name) {
            return Err(HookError::DuplicatePlugin(name));
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Registers `plugin`, replacing any plugin already using its name.
    pub fn replace(&mut self, plugin: Arc<dyn Plugin>) -> Option<Arc<dyn Plugin>> {
        self.plugins.insert(plugin.name().trim().to_string(), plugin)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Checks that every target names a registered plugin.
    pub fn validate(&self, targets: &TargetSet) -> Result<(), HookError> {
        for (case, plugin) in targets.iter() {
            if !self.contains(plugin) {
                return Err(HookError::UnknownPlugin {
                    case: case.to_string(),
                    plugin: plugin.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use crate::identity::CaseKey;

    struct Named(&'static str);

    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn start(&self, _case: &CaseKey) -> Result<(), PluginError> {
            Ok(())
        }

        fn stop(&self, _case: &CaseKey) -> Result<(), PluginError> {
            Ok(())
        }
    }

    #[test]
    fn builtins_include_marker() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["marker"]);
        assert!(registry.get("marker").is_some());
        assert!(registry.validate(&TargetSet::builtin()).is_ok());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = PluginRegistry::with_builtins();
        assert!(registry.register(Arc::new(Named("wifi"))).is_ok());
        let err = registry.register(Arc::new(Named("wifi")));
        assert!(matches!(err, Err(HookError::DuplicatePlugin(ref name)) if name == "wifi"));
        assert!(matches!(
            registry.register(Arc::new(Named("  "))),
            Err(HookError::InvalidPlugin(_))
        ));
    }

    #[test]
    fn replace_swaps_existing_plugin() {
        let mut registry = PluginRegistry::with_builtins();
        let previous = registry.replace(Arc::new(Named("marker")));
        assert!(previous.is_some());
        assert_eq!(registry.names(), vec!["marker"]);
    }

    #[test]
    fn validate_reports_unknown_plugin() {
        let registry = PluginRegistry::new();
        let err = registry.validate(&TargetSet::builtin());
        match err {
            Err(HookError::UnknownPlugin { plugin, .. }) => assert_eq!(plugin, "marker"),
            other => panic!("expected UnknownPlugin, got {other:?}"),
        }
    }
}
