//! Error types for FOLIO operations

use crate::ScopeKey;
use thiserror::Error;

/// Page cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Index {index} in scope {scope} is not aligned with the page size of {page_size}")]
    Misaligned {
        scope: ScopeKey,
        index: usize,
        page_size: usize,
    },

    #[error("Invalid page size: expected {expected}, got {got}")]
    PageSizeMismatch { expected: usize, got: usize },
}

/// Selection errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Attempted to set an invalid selection mode: {mode}")]
    InvalidMode { mode: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration from {source_name}: {reason}")]
    Load { source_name: String, reason: String },
}

/// Wire protocol errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Failed to decode message: {reason}")]
    Decode { reason: String },

    #[error("Failed to encode message: {reason}")]
    Encode { reason: String },

    #[error("Invalid items payload: {reason}")]
    InvalidItems { reason: String },
}

/// Master error type for all FOLIO errors.
#[derive(Debug, Clone, Error)]
pub enum FolioError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for FOLIO operations.
pub type FolioResult<T> = Result<T, FolioError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display_misaligned() {
        let err = CacheError::Misaligned {
            scope: ScopeKey::Root,
            index: 7,
            page_size: 50,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("not aligned"));
        assert!(msg.contains('7'));
        assert!(msg.contains("50"));
    }

    #[test]
    fn test_cache_error_display_page_size_mismatch() {
        let err = CacheError::PageSizeMismatch {
            expected: 50,
            got: 20,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid page size"));
        assert!(msg.contains("50"));
        assert!(msg.contains("20"));
    }

    #[test]
    fn test_selection_error_display() {
        let err = SelectionError::InvalidMode {
            mode: "SOME".to_string(),
        };
        assert!(format!("{}", err).contains("SOME"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "page_size".to_string(),
            value: "0".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("page_size"));
        assert!(msg.contains("must be greater than 0"));
    }

    #[test]
    fn test_folio_error_from_variants() {
        let cache = FolioError::from(CacheError::PageSizeMismatch {
            expected: 1,
            got: 2,
        });
        assert!(matches!(cache, FolioError::Cache(_)));

        let selection = FolioError::from(SelectionError::InvalidMode {
            mode: "x".to_string(),
        });
        assert!(matches!(selection, FolioError::Selection(_)));

        let config = FolioError::from(ConfigError::Load {
            source_name: "env".to_string(),
            reason: "bad".to_string(),
        });
        assert!(matches!(config, FolioError::Config(_)));

        let protocol = FolioError::from(ProtocolError::Decode {
            reason: "eof".to_string(),
        });
        assert!(matches!(protocol, FolioError::Protocol(_)));
    }
}
