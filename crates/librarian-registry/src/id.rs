//! Hierarchical dotted identifiers and type tags.
//!
//! An ID is a sequence of `.`-separated segments. Each segment starts with a
//! letter, continues with word characters, and may carry a tag suffix: either
//! a label (`:latest`) or a version (`:0.1.0`). Matching is case-insensitive.
//!
//! The version tag contains dots itself, so segments are split on `.` only
//! when the dot is *not* followed by a digit.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

const SEGMENT: &str = r"[A-Za-z][A-Za-z0-9_]*(?::[A-Za-z]+|:[0-9]+\.[0-9]+\.[0-9]+)?";

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{SEGMENT}(?:\.{SEGMENT})*$")).expect("invalid id regex")
});

static SEGMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{SEGMENT}$")).expect("invalid segment regex"));

static TYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("invalid type regex"));

/// Whether `id` matches the identifier grammar.
#[must_use]
pub fn is_valid(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

/// Whether `segment` is a single well-formed identifier segment.
#[must_use]
pub fn is_valid_segment(segment: &str) -> bool {
    SEGMENT_PATTERN.is_match(segment)
}

/// Split an ID into its segments.
///
/// A `.` directly followed by an ASCII digit belongs to a version tag and
/// does not separate segments.
#[must_use]
pub fn split(id: &str) -> Vec<&str> {
    let bytes = id.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    for (idx, byte) in bytes.iter().enumerate() {
        if *byte != b'.' {
            continue;
        }
        let next = idx.checked_add(1).and_then(|n| bytes.get(n));
        if next.is_some_and(u8::is_ascii_digit) {
            continue;
        }
        segments.push(&id[start..idx]);
        start = idx.saturating_add(1);
    }
    segments.push(&id[start..]);
    segments
}

/// All segments but the last, joined by `.`; `None` for a root ID.
#[must_use]
pub fn parent_of(id: &str) -> Option<&str> {
    let segments = split(id);
    if segments.len() < 2 {
        return None;
    }
    let last = segments.last()?;
    // The last segment is a suffix of `id`, preceded by exactly one dot.
    let cut = id.len().checked_sub(last.len())?.checked_sub(1)?;
    Some(&id[..cut])
}

/// The prefix chain of `id`: `a`, `a.b`, `a.b.c` for `a.b.c`.
#[must_use]
pub fn ancestors(id: &str) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    for segment in split(id) {
        let next = match chain.last() {
            Some(prev) => format!("{prev}.{segment}"),
            None => segment.to_owned(),
        };
        chain.push(next);
    }
    chain
}

/// A validated hierarchical identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntryId(String);

/// Deserialize with validation.
impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl EntryId {
    /// Create a new `EntryId`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidId`] if the string does not match the
    /// identifier grammar.
    pub fn new(id: impl Into<String>) -> RegistryResult<Self> {
        let id = id.into();
        if !is_valid(&id) {
            return Err(RegistryError::InvalidId(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ID's segments.
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        split(&self.0)
    }

    /// The first segment (the namespace root).
    #[must_use]
    pub fn root(&self) -> &str {
        split(&self.0).first().copied().unwrap_or(&self.0)
    }

    /// The last segment, used as the key under the parent package.
    #[must_use]
    pub fn last_segment(&self) -> &str {
        split(&self.0).last().copied().unwrap_or(&self.0)
    }

    /// The parent ID, or `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        parent_of(&self.0).map(|p| Self(p.to_owned()))
    }

    /// Whether this ID is a root (single segment).
    #[must_use]
    pub fn is_root(&self) -> bool {
        parent_of(&self.0).is_none()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for EntryId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A validated config type tag (`Package`, `Module`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl<'de> Deserialize<'de> for TypeTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl TypeTag {
    /// Tag for aggregation nodes.
    pub const PACKAGE: &'static str = "Package";
    /// Tag for loadable units.
    pub const MODULE: &'static str = "Module";
    /// Tag for forwarding entries.
    pub const ALIAS: &'static str = "Alias";
    /// Tag for embedded callables.
    pub const SCRIPT: &'static str = "Script";
    /// Tag for raw embedded values.
    pub const CONFIG: &'static str = "Config";

    /// Create a new `TypeTag`, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidArguments`] if the tag is empty or
    /// contains non-word characters.
    pub fn new(tag: impl Into<String>) -> RegistryResult<Self> {
        let tag = tag.into();
        if !Self::is_valid(&tag) {
            return Err(RegistryError::InvalidArguments(format!(
                "type tag must be a non-empty word, got: {tag:?}"
            )));
        }
        Ok(Self(tag))
    }

    /// Whether a string is a valid type tag.
    #[must_use]
    pub fn is_valid(tag: &str) -> bool {
        TYPE_PATTERN.is_match(tag)
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TypeTag {
    fn borrow(&self) -> &str {
        &self.0
    }
}
