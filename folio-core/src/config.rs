//! Configuration types

use crate::error::{ConfigError, FolioError, FolioResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Lower bound of the default active range, in items.
const MIN_ACTIVE_RANGE: usize = 150;

/// Connector tuning.
///
/// Durations are carried as milliseconds so the struct maps one-to-one onto
/// a TOML table and onto `FOLIO_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectorConfig {
    /// Items per page. The widget must request with exactly this size.
    pub page_size: usize,
    /// Quiet period after a filter change before the new query is issued.
    pub filter_debounce_ms: u64,
    /// Batching window for child-range requests. 0 sends each one immediately.
    pub parent_request_delay_ms: u64,
    /// Maximum child ranges sent per batched request.
    pub parent_request_batch_max: usize,
    /// Spacing between first-page fetches of newly expanded items.
    /// 0 materializes sub-caches immediately.
    pub ensure_subcache_delay_ms: u64,
    /// Maximum number of item slots covered by pending root page requests.
    pub max_active_range: usize,
    /// Activating an item toggles its details row.
    pub details_visible_on_click: bool,
    /// Fetch the unfiltered root once and filter it locally by item label.
    /// Only sensible when the whole data set fits in one page.
    #[serde(default)]
    pub client_side_filter: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self::with_page_size(50)
    }
}

impl ConnectorConfig {
    /// Defaults for the given page size.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            filter_debounce_ms: 500,
            parent_request_delay_ms: 20,
            parent_request_batch_max: 20,
            ensure_subcache_delay_ms: 16,
            max_active_range: default_active_range(page_size),
            details_visible_on_click: true,
            client_side_filter: false,
        }
    }

    pub fn with_filter_debounce(mut self, delay: Duration) -> Self {
        self.filter_debounce_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_parent_request_delay(mut self, delay: Duration) -> Self {
        self.parent_request_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_parent_request_batch_max(mut self, max: usize) -> Self {
        self.parent_request_batch_max = max;
        self
    }

    pub fn with_ensure_subcache_delay(mut self, delay: Duration) -> Self {
        self.ensure_subcache_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_active_range(mut self, max: usize) -> Self {
        self.max_active_range = max;
        self
    }

    pub fn with_details_visible_on_click(mut self, enabled: bool) -> Self {
        self.details_visible_on_click = enabled;
        self
    }

    pub fn with_client_side_filter(mut self, enabled: bool) -> Self {
        self.client_side_filter = enabled;
        self
    }

    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }

    /// `None` when parent requests are sent without batching.
    pub fn parent_request_delay(&self) -> Option<Duration> {
        (self.parent_request_delay_ms > 0).then(|| Duration::from_millis(self.parent_request_delay_ms))
    }

    /// `None` when sub-caches are materialized without delay.
    pub fn ensure_subcache_delay(&self) -> Option<Duration> {
        (self.ensure_subcache_delay_ms > 0)
            .then(|| Duration::from_millis(self.ensure_subcache_delay_ms))
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(FolioError::Config) if invalid.
    ///
    /// Validates:
    /// - page_size > 0
    /// - parent_request_batch_max > 0
    /// - max_active_range >= page_size
    pub fn validate(&self) -> FolioResult<()> {
        if self.page_size == 0 {
            return Err(FolioError::Config(ConfigError::InvalidValue {
                field: "page_size".to_string(),
                value: self.page_size.to_string(),
                reason: "page_size must be greater than 0".to_string(),
            }));
        }

        if self.parent_request_batch_max == 0 {
            return Err(FolioError::Config(ConfigError::InvalidValue {
                field: "parent_request_batch_max".to_string(),
                value: self.parent_request_batch_max.to_string(),
                reason: "parent_request_batch_max must be greater than 0".to_string(),
            }));
        }

        // A single page must always fit in the active range
        if self.max_active_range < self.page_size {
            return Err(FolioError::Config(ConfigError::InvalidValue {
                field: "max_active_range".to_string(),
                value: self.max_active_range.to_string(),
                reason: format!("max_active_range must be at least page_size ({})", self.page_size),
            }));
        }

        Ok(())
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `FOLIO_PAGE_SIZE`: Items per page (default: 50)
    /// - `FOLIO_FILTER_DEBOUNCE_MS`: Filter debounce window (default: 500)
    /// - `FOLIO_PARENT_REQUEST_DELAY_MS`: Child request batching window (default: 20)
    /// - `FOLIO_PARENT_REQUEST_BATCH_MAX`: Child ranges per batch (default: 20)
    /// - `FOLIO_ENSURE_SUBCACHE_DELAY_MS`: Sub-cache materialization spacing (default: 16)
    /// - `FOLIO_MAX_ACTIVE_RANGE`: Pending root slots cap (default: max(2 * page size, 150))
    /// - `FOLIO_DETAILS_VISIBLE_ON_CLICK`: `true`/`1` to toggle details on activation
    /// - `FOLIO_CLIENT_SIDE_FILTER`: `true`/`1` to filter locally by label
    pub fn from_env() -> Self {
        let page_size = env_parse("FOLIO_PAGE_SIZE").unwrap_or(50);
        let defaults = Self::with_page_size(page_size);

        Self {
            page_size,
            filter_debounce_ms: env_parse("FOLIO_FILTER_DEBOUNCE_MS")
                .unwrap_or(defaults.filter_debounce_ms),
            parent_request_delay_ms: env_parse("FOLIO_PARENT_REQUEST_DELAY_MS")
                .unwrap_or(defaults.parent_request_delay_ms),
            parent_request_batch_max: env_parse("FOLIO_PARENT_REQUEST_BATCH_MAX")
                .unwrap_or(defaults.parent_request_batch_max),
            ensure_subcache_delay_ms: env_parse("FOLIO_ENSURE_SUBCACHE_DELAY_MS")
                .unwrap_or(defaults.ensure_subcache_delay_ms),
            max_active_range: env_parse("FOLIO_MAX_ACTIVE_RANGE")
                .unwrap_or(defaults.max_active_range),
            details_visible_on_click: std::env::var("FOLIO_DETAILS_VISIBLE_ON_CLICK")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.details_visible_on_click),
            client_side_filter: std::env::var("FOLIO_CLIENT_SIDE_FILTER")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.client_side_filter),
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> FolioResult<Self> {
        let config: ConnectorConfig = toml::from_str(contents).map_err(|e| ConfigError::Load {
            source_name: "toml".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: &Path) -> FolioResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            source_name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }
}

/// `max(2 * page_size, 150)`.
pub fn default_active_range(page_size: usize) -> usize {
    (page_size * 2).max(MIN_ACTIVE_RANGE)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

// =============================================================================
// TESTS
// =============================================================================
