//! Tracing subscriber setup for hosts embedding a connector.

use crate::error::{SyncError, SyncResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "folio_sync=info,folio_cache=info,info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Read `FOLIO_LOG` and `FOLIO_LOG_JSON`, falling back to defaults.
    pub fn from_env() -> Self {
        let filter = std::env::var("FOLIO_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        let json = std::env::var("FOLIO_LOG_JSON")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(false);
        Self { filter, json }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> SyncResult<()> {
    let env_filter = EnvFilter::try_new(&config.filter).map_err(|e| SyncError::Telemetry {
        reason: format!("invalid filter {:?}: {}", config.filter, e),
    })?;

    let (json, plain) = if config.json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(plain)
        .try_init()
        .map_err(|e| SyncError::Telemetry {
            reason: e.to_string(),
        })?;

    tracing::info!(filter = %config.filter, json = config.json, "Telemetry initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_telemetry_config_from_env() {
        let _filter = EnvVarGuard::set("FOLIO_LOG", Some("debug"));
        let _json = EnvVarGuard::set("FOLIO_LOG_JSON", Some("1"));
        let config = TelemetryConfig::from_env();
        assert_eq!(config.filter, "debug");
        assert!(config.json);
    }

    #[test]
    fn test_invalid_filter_is_rejected() {
        let config = TelemetryConfig {
            filter: "folio_sync=notalevel".to_string(),
            json: false,
        };
        assert!(matches!(
            init_tracing(&config),
            Err(SyncError::Telemetry { .. })
        ));
    }
}
