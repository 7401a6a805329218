//! Per-invocation tag journal.
//!
//! Every tag remembers the epoch it was introduced in. Only tags stamped at
//! or before the current epoch are visible, so a handler adding tags while it
//! runs biases the *next* selection and never the one already resolving.

use std::collections::HashMap;

use ritual_common::{Tag, TagSet};

#[derive(Debug, Clone, Default)]
pub struct TagScope {
    journal: HashMap<Tag, u64>,
    epoch: u64,
}

impl TagScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope whose tags are visible immediately.
    pub fn seeded<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        let mut scope = Self::new();
        for tag in tags {
            scope.add_current(tag);
        }
        scope
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Stamp `tag` with the next epoch. A tag already in the journal keeps
    /// its earlier stamp. Returns true if the tag was new.
    pub fn add(&mut self, tag: impl Into<Tag>) -> bool {
        self.stamp(tag.into(), self.epoch + 1)
    }

    /// Stamp `tag` with the current epoch, making it visible at once.
    pub fn add_current(&mut self, tag: impl Into<Tag>) -> bool {
        self.stamp(tag.into(), self.epoch)
    }

    fn stamp(&mut self, tag: Tag, epoch: u64) -> bool {
        match self.journal.get_mut(&tag) {
            Some(existing) => {
                *existing = (*existing).min(epoch);
                false
            }
            None => {
                self.journal.insert(tag, epoch);
                true
            }
        }
    }

    pub fn contains(&self, tag: impl Into<Tag>) -> bool {
        let tag = tag.into();
        self.journal
            .get(&tag)
            .is_some_and(|&epoch| epoch <= self.epoch)
    }

    /// Tags visible to the selection resolving at the current epoch.
    pub fn current_tags(&self) -> TagSet {
        self.journal
            .iter()
            .filter(|(_, epoch)| **epoch <= self.epoch)
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    /// Tags added during this epoch that only the next selection will see.
    pub fn pending_tags(&self) -> TagSet {
        self.journal
            .iter()
            .filter(|(_, epoch)| **epoch > self.epoch)
            .map(|(tag, _)| tag.clone())
            .collect()
    }

    pub fn introduced_at(&self, tag: impl Into<Tag>) -> Option<u64> {
        self.journal.get(&tag.into()).copied()
    }

    pub fn advance_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Drop a tag from the journal entirely.
    pub fn retract(&mut self, tag: &Tag) -> bool {
        self.journal.remove(tag).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_tags_wait_for_the_next_epoch() {
        let mut scope = TagScope::new();
        scope.add("style:loud");

        assert!(!scope.contains("style:loud"));
        assert!(scope.current_tags().is_empty());
        assert_eq!(scope.pending_tags().len(), 1);

        scope.advance_epoch();
        assert!(scope.contains("STYLE:LOUD"));
        assert!(scope.pending_tags().is_empty());
    }

    #[test]
    fn seeded_tags_are_visible_immediately() {
        let scope = TagScope::seeded(["a", "B"]);
        assert!(scope.contains("b"));
        assert_eq!(scope.current_tags().len(), 2);
    }

    #[test]
    fn duplicates_keep_the_earliest_stamp() {
        let mut scope = TagScope::seeded(["x"]);
        assert!(!scope.add("X"));
        assert_eq!(scope.introduced_at("x"), Some(0));

        scope.add("y");
        scope.add_current("y");
        assert_eq!(scope.introduced_at("y"), Some(0));
        assert!(scope.contains("y"));
    }

    #[test]
    fn history_survives_epoch_advances() {
        let mut scope = TagScope::new();
        scope.add("first");
        scope.advance_epoch();
        scope.add("second");
        scope.advance_epoch();

        assert_eq!(scope.introduced_at("first"), Some(1));
        assert_eq!(scope.introduced_at("second"), Some(2));
        assert_eq!(scope.current_tags().len(), 2);
    }

    #[test]
    fn retract_removes_the_tag() {
        let mut scope = TagScope::seeded(["to:Quiet"]);
        assert!(scope.retract(&Tag::new("TO:quiet")));
        assert!(!scope.contains("to:quiet"));
        assert!(!scope.retract(&Tag::new("to:quiet")));
    }
}
