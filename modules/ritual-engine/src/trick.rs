//! Single-hop routing fences raised by Tricks.
//!
//! When a Trick runs it resolves its own best match among the fenced
//! candidates, then installs a [`TrickFence`] that narrows exactly the next
//! selection to that subset and forces the match through an injected
//! `to:<name>` tag. The fence is consumed by that selection whatever it
//! picks.

use std::collections::BTreeSet;

use ritual_common::Tag;
use serde::{Deserialize, Serialize};

use crate::registry::HandlerDescriptor;
use crate::strategy::{overlap_winner, Candidate, Signals};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrickFence {
    owner: usize,
    candidates: BTreeSet<usize>,
    forced: Option<usize>,
    injected: Option<Tag>,
    /// False when the injected tag was already in the scope, so consuming
    /// the fence must leave it there.
    #[serde(default)]
    owns_injected: bool,
}

impl TrickFence {
    pub fn new(
        owner: usize,
        candidates: impl IntoIterator<Item = usize>,
        forced: Option<usize>,
        injected: Option<Tag>,
    ) -> Self {
        Self {
            owner,
            candidates: candidates.into_iter().collect(),
            owns_injected: injected.is_some(),
            forced,
            injected,
        }
    }

    /// Registration index of the Trick that raised the fence.
    pub fn owner(&self) -> usize {
        self.owner
    }

    pub fn candidates(&self) -> &BTreeSet<usize> {
        &self.candidates
    }

    pub fn admits(&self, index: usize) -> bool {
        self.candidates.contains(&index)
    }

    /// The candidate the owner resolved to, if any fenced candidate was
    /// eligible when the fence went up.
    pub fn forced(&self) -> Option<usize> {
        self.forced
    }

    /// The override tag the owner put into the scope.
    pub fn injected(&self) -> Option<&Tag> {
        self.injected.as_ref()
    }

    /// The tag to drop from the scope once the fence is consumed.
    pub fn retractable(&self) -> Option<&Tag> {
        self.injected.as_ref().filter(|_| self.owns_injected)
    }

    pub(crate) fn set_owns_injected(&mut self, owns: bool) {
        self.owns_injected = owns;
    }
}

/// Put `fence` in the branch's fence slot. A fence still sitting in the slot
/// was never consumed; its owner comes back as the error.
pub(crate) fn install_fence(slot: &mut Option<TrickFence>, fence: TrickFence) -> Result<(), usize> {
    if let Some(pending) = slot {
        return Err(pending.owner());
    }
    *slot = Some(fence);
    Ok(())
}

/// Resolve a Trick's best match among `reachable` (the fenced candidates
/// eligible for its output) and build the fence for the next hop.
pub(crate) fn raise_fence(
    owner: &HandlerDescriptor,
    fenced: &[usize],
    reachable: &[Candidate<'_>],
    signals: &Signals,
) -> TrickFence {
    let best = overlap_winner(reachable, signals).map(|(candidate, _)| candidate);
    TrickFence::new(
        owner.index(),
        fenced.iter().copied(),
        best.map(|c| c.index()),
        best.map(|c| Tag::override_name(c.name())),
    )
}
