//! Case-insensitive tags and the canonical routing vocabulary.
//!
//! A tag keeps the spelling it was created with for display, but compares,
//! hashes and orders by its case-folded form. Four prefixes carry meaning to
//! the selector:
//!
//! - `to:#<index>` / `to:<name>`: explicit override
//! - `by:<name>`: observation of an executed handler (never scored)
//! - `next:<name>`: forward hint for the upcoming selection

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

pub const OVERRIDE_PREFIX: &str = "to:";
pub const OBSERVED_PREFIX: &str = "by:";
pub const HINT_PREFIX: &str = "next:";

/// Ordered, de-duplicated set of tags.
pub type TagSet = BTreeSet<Tag>;

/// Collect anything tag-like into a [`TagSet`].
pub fn tag_set<I, T>(tags: I) -> TagSet
where
    I: IntoIterator<Item = T>,
    T: Into<Tag>,
{
    tags.into_iter().map(Into::into).collect()
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Tag {
    raw: String,
    folded: String,
}

/// Target named by an explicit override tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideTarget<'a> {
    Index(usize),
    /// Case-folded handler name.
    Name(&'a str),
}

impl Tag {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let folded = raw.to_lowercase();
        Self { raw, folded }
    }

    pub fn override_index(index: usize) -> Self {
        Self::new(format!("{OVERRIDE_PREFIX}#{index}"))
    }

    pub fn override_name(name: &str) -> Self {
        Self::new(format!("{OVERRIDE_PREFIX}{name}"))
    }

    pub fn observed(name: &str) -> Self {
        Self::new(format!("{OBSERVED_PREFIX}{name}"))
    }

    pub fn hint(name: &str) -> Self {
        Self::new(format!("{HINT_PREFIX}{name}"))
    }

    /// The tag as it was spelled when created.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The case-folded form used for every comparison.
    pub fn folded(&self) -> &str {
        &self.folded
    }

    pub fn is_observation(&self) -> bool {
        self.folded.starts_with(OBSERVED_PREFIX)
    }

    pub fn is_hint(&self) -> bool {
        self.folded.starts_with(HINT_PREFIX)
    }

    pub fn is_override(&self) -> bool {
        self.folded.starts_with(OVERRIDE_PREFIX)
    }

    /// Parse `to:#3` / `to:Name`. A `to:#` suffix that is not a number is
    /// treated as a name.
    pub fn override_target(&self) -> Option<OverrideTarget<'_>> {
        let rest = self.folded.strip_prefix(OVERRIDE_PREFIX)?;
        if rest.is_empty() {
            return None;
        }
        if let Some(index) = rest.strip_prefix('#').and_then(|n| n.parse().ok()) {
            return Some(OverrideTarget::Index(index));
        }
        Some(OverrideTarget::Name(rest))
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded.cmp(&other.folded)
    }
}

// Lets `HashMap<Tag, _>` be queried with an already-folded `&str`.
impl Borrow<str> for Tag {
    fn borrow(&self) -> &str {
        &self.folded
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.raw)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for Tag {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Tag {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&Tag> for Tag {
    fn from(tag: &Tag) -> Self {
        tag.clone()
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.raw
    }
}
