//! Small closed vocabularies shared across crates.

use crate::error::SelectionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How many items may be selected at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SelectionMode {
    /// At most one selected item; selecting replaces the previous one.
    #[default]
    Single,
    /// Any number of selected items.
    Multi,
    /// Selection disabled; every selection operation is a no-op.
    None,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Multi => "MULTI",
            Self::None => "NONE",
        }
    }
}

impl FromStr for SelectionMode {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SINGLE" => Ok(Self::Single),
            "MULTI" => Ok(Self::Multi),
            "NONE" => Ok(Self::None),
            _ => Err(SelectionError::InvalidMode {
                mode: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who initiated a selection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionOrigin {
    /// Explicit user interaction; the remote side is notified.
    User,
    /// Server push or programmatic call; only local state changes.
    Server,
}

impl SelectionOrigin {
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User)
    }
}

/// Lifecycle state of a sync controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncState {
    /// Nothing requested since construction or the last reset.
    #[default]
    Idle,
    /// A filter change is waiting for its debounce window to close.
    FilterPending,
    /// A range has been requested and confirmation is outstanding.
    Loading,
    /// The last confirmation for the current filter has been applied.
    Settled,
}
