//! The tag context handed to a handler for the length of its own step.

use ritual_common::{Tag, TagSet};
use tokio_util::sync::CancellationToken;

use crate::scope::TagScope;

/// Explicit per-step view of the invocation's tag scope.
///
/// `add` stamps tags for the next selection; `contains` only sees tags that
/// were visible when this step was selected.
pub struct TagContext<'a> {
    scope: &'a mut TagScope,
    cancel: &'a CancellationToken,
    handler: &'a str,
}

impl<'a> TagContext<'a> {
    pub fn new(scope: &'a mut TagScope, cancel: &'a CancellationToken, handler: &'a str) -> Self {
        Self {
            scope,
            cancel,
            handler,
        }
    }

    pub fn add(&mut self, tag: impl Into<Tag>) {
        self.scope.add(tag);
    }

    pub fn contains(&self, tag: impl Into<Tag>) -> bool {
        self.scope.contains(tag)
    }

    pub fn current_tags(&self) -> TagSet {
        self.scope.current_tags()
    }

    /// Name of the handler this context was opened for.
    pub fn handler(&self) -> &str {
        self.handler
    }

    /// Cancellation signal of the surrounding invocation, for handlers that
    /// wait on something other than a future the engine can drop.
    pub fn cancellation(&self) -> &CancellationToken {
        self.cancel
    }
}
