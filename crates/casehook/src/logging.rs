use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global fmt subscriber once. `RUST_LOG` wins over the
/// configured level. Returns false when another subscriber was already set.
pub fn init(cfg: &LoggingConfig) -> bool {
    static INIT: OnceLock<bool> = OnceLock::new();
    *INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&cfg.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true);
        let installed = if cfg.format == "json" {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        installed.is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let cfg = LoggingConfig::default();
        let first = init(&cfg);
        assert_eq!(init(&cfg), first);
    }
}
