//! # Sort Key
//!
//! The total-order key of an interaction in the canonical log:
//! `{block height, 12 digits},{ms bucket, 13 digits},{hash}`.
//!
//! Ordering is plain byte-wise string comparison. Keys handed over by a
//! loader or a sequencer are trusted as-is; only [`SortKey::from_str`]
//! validates its input.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SortKeyError;

/// A lexicographically comparable interaction position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortKey(String);

impl SortKey {
    /// Wrap a raw key without validation.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the raw string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// The block height encoded in the first segment, if it parses.
    #[must_use]
    pub fn block_height(&self) -> Option<u64> {
        self.0.split(',').next()?.parse().ok()
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SortKey {
    type Err = SortKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = s.split(',');
        let height = segments
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SortKeyError::Malformed(s.to_string()))?;
        if !height.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SortKeyError::InvalidHeight(s.to_string()));
        }
        // Legacy keys carry two segments, current ones three.
        let rest = segments.count();
        if rest == 0 || rest > 2 {
            return Err(SortKeyError::Malformed(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for SortKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for SortKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for SortKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SortKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
