//! Filter tokens.
//!
//! Every fetch and every cached page is stamped with the filter that was
//! active when it was issued. A response whose stamp differs from the
//! connector's current token belongs to an abandoned query and is discarded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The active filter value. The empty token means "unfiltered".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterToken(String);

impl FilterToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The unfiltered token.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a response stamped with `stamp` belongs to this token.
    ///
    /// An unstamped response can only answer the unfiltered query.
    pub fn accepts(&self, stamp: Option<&FilterToken>) -> bool {
        match stamp {
            None => self.is_empty(),
            Some(stamp) => stamp == self,
        }
    }

    /// Case-insensitive substring match against an item label. The empty
    /// token matches everything; a missing label matches nothing else.
    pub fn matches_label(&self, label: Option<&str>) -> bool {
        if self.is_empty() {
            return true;
        }
        let needle = self.0.to_lowercase();
        label.is_some_and(|label| label.to_lowercase().contains(&needle))
    }
}

impl fmt::Display for FilterToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FilterToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FilterToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}
