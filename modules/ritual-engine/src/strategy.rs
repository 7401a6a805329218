//! Candidate selection.
//!
//! A [`SelectionStrategy`] is a pure function of the eligible candidates and
//! the tags visible at the current epoch. The default strategy applies, in
//! order: the active fence's forced target, explicit `to:` overrides, the
//! Trick preference, then capability overlap with registration order as the
//! tie-break.
//!
//! Overlap scoring is gated: a candidate that declares capabilities is only
//! preferred once at least one of them is visible. Candidates declaring none
//! are plain type matches and always open. When every eligible candidate is
//! gated out, scoring falls back to all of them, so a non-empty candidate set
//! always yields a selection. Fences and overrides bypass the gate.

use std::collections::HashSet;
use std::fmt;

use ritual_common::{OverrideTarget, TagSet};

use crate::registry::HandlerDescriptor;
use crate::router::{Interner, Symbol};
use crate::trick::TrickFence;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    ExplicitOverride,
    CapabilityOverlap,
    RegistrationOrder,
    TrickPreference,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ExplicitOverride => "explicit-override",
            Self::CapabilityOverlap => "capability-overlap",
            Self::RegistrationOrder => "registration-order",
            Self::TrickPreference => "trick-preference",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionResult {
    /// Registration index of the chosen descriptor.
    pub index: usize,
    pub reason: SelectionReason,
}

impl SelectionResult {
    pub fn new(index: usize, reason: SelectionReason) -> Self {
        Self { index, reason }
    }
}

// ---------------------------------------------------------------------------
// Signals: the current tags, pre-digested for scoring
// ---------------------------------------------------------------------------

/// Current tags resolved against a router's interned capability symbols.
/// `by:*` observations are dropped; overrides are split out by target.
#[derive(Debug, Default)]
pub(crate) struct Signals {
    symbols: HashSet<Symbol>,
    override_indices: HashSet<usize>,
    override_names: HashSet<String>,
}

impl Signals {
    pub(crate) fn capture(tags: &TagSet, interner: &Interner) -> Self {
        let mut signals = Self::default();
        for tag in tags {
            if tag.is_observation() {
                continue;
            }
            match tag.override_target() {
                Some(OverrideTarget::Index(index)) => {
                    signals.override_indices.insert(index);
                }
                Some(OverrideTarget::Name(name)) => {
                    signals.override_names.insert(name.to_string());
                }
                None => {}
            }
            if let Some(symbol) = interner.get(tag.folded()) {
                signals.symbols.insert(symbol);
            }
        }
        signals
    }

    pub(crate) fn score(&self, candidate: &Candidate<'_>) -> usize {
        candidate
            .capabilities
            .iter()
            .filter(|s| self.symbols.contains(s))
            .count()
    }

    pub(crate) fn overrides(&self, candidate: &Candidate<'_>) -> bool {
        self.override_indices.contains(&candidate.index())
            || self
                .override_names
                .contains(candidate.descriptor.folded_name())
    }
}

/// Highest overlap wins; among equals the earliest registration.
pub(crate) fn overlap_winner<'c, 'a>(
    candidates: impl IntoIterator<Item = &'c Candidate<'a>>,
    signals: &Signals,
) -> Option<(&'c Candidate<'a>, usize)>
where
    'a: 'c,
{
    let mut best: Option<(&'c Candidate<'a>, usize)> = None;
    for candidate in candidates {
        let score = signals.score(candidate);
        let better = match best {
            None => true,
            Some((current, top)) => {
                score > top || (score == top && candidate.index() < current.index())
            }
        };
        if better {
            best = Some((candidate, score));
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Candidates and the view handed to strategies
// ---------------------------------------------------------------------------

/// An eligible descriptor together with its interned capability set.
#[derive(Clone, Copy)]
pub struct Candidate<'a> {
    descriptor: &'a HandlerDescriptor,
    capabilities: &'a [Symbol],
}

impl<'a> Candidate<'a> {
    pub(crate) fn new(descriptor: &'a HandlerDescriptor, capabilities: &'a [Symbol]) -> Self {
        Self {
            descriptor,
            capabilities,
        }
    }

    pub fn descriptor(&self) -> &'a HandlerDescriptor {
        self.descriptor
    }

    pub fn index(&self) -> usize {
        self.descriptor.index()
    }

    pub fn name(&self) -> &'a str {
        self.descriptor.name()
    }

    pub fn is_trick(&self) -> bool {
        self.descriptor.is_trick()
    }

    pub fn declares_capabilities(&self) -> bool {
        !self.capabilities.is_empty()
    }
}

impl fmt::Debug for Candidate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index(), self.name())
    }
}

/// Everything a strategy may look at for one selection.
///
/// When a fence is active the eligible list has already been narrowed to the
/// fenced candidates.
pub struct SelectionView<'a> {
    eligible: Vec<Candidate<'a>>,
    signals: &'a Signals,
    fence: Option<&'a TrickFence>,
    steps_taken: usize,
}

impl<'a> SelectionView<'a> {
    pub(crate) fn new(
        candidates: Vec<Candidate<'a>>,
        signals: &'a Signals,
        fence: Option<&'a TrickFence>,
        steps_taken: usize,
    ) -> Self {
        let eligible = match fence {
            Some(fence) => candidates
                .into_iter()
                .filter(|c| fence.admits(c.index()))
                .collect(),
            None => candidates,
        };
        Self {
            eligible,
            signals,
            fence,
            steps_taken,
        }
    }

    /// Eligible candidates in registration order.
    pub fn eligible(&self) -> &[Candidate<'a>] {
        &self.eligible
    }

    pub fn is_eligible(&self, index: usize) -> bool {
        self.eligible.iter().any(|c| c.index() == index)
    }

    /// Number of current tags in the candidate's capability set.
    pub fn score(&self, candidate: &Candidate<'_>) -> usize {
        self.signals.score(candidate)
    }

    /// True when a visible `to:#<index>` or `to:<name>` tag names the
    /// candidate.
    pub fn is_overridden(&self, candidate: &Candidate<'_>) -> bool {
        self.signals.overrides(candidate)
    }

    /// True when the candidate declares capabilities and none is visible.
    pub fn is_gated_out(&self, candidate: &Candidate<'_>) -> bool {
        candidate.declares_capabilities() && self.score(candidate) == 0
    }

    pub fn fence(&self) -> Option<&'a TrickFence> {
        self.fence
    }

    /// The candidate the active fence's owner resolved to, if still eligible.
    pub fn fenced_target(&self) -> Option<&Candidate<'a>> {
        let forced = self.fence?.forced()?;
        self.eligible.iter().find(|c| c.index() == forced)
    }

    /// Steps already executed in this invocation.
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Overlap winner among `candidates`, earliest registration on ties.
    pub fn best_overlap<'c>(
        &self,
        candidates: impl IntoIterator<Item = &'c Candidate<'a>>,
    ) -> Option<(&'c Candidate<'a>, usize)>
    where
        'a: 'c,
    {
        overlap_winner(candidates, self.signals)
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

pub trait SelectionStrategy: Send + Sync {
    /// Choose one of `view.eligible()`, or `None` to end the run.
    fn select(&self, view: &SelectionView<'_>) -> Option<SelectionResult>;
}

#[derive(Debug, Clone, Copy)]
pub struct DefaultStrategy {
    prefer_tricks: bool,
}

impl Default for DefaultStrategy {
    fn default() -> Self {
        Self {
            prefer_tricks: true,
        }
    }
}

impl DefaultStrategy {
    pub fn new(prefer_tricks: bool) -> Self {
        Self { prefer_tricks }
    }
}

impl SelectionStrategy for DefaultStrategy {
    fn select(&self, view: &SelectionView<'_>) -> Option<SelectionResult> {
        let eligible = view.eligible();
        if eligible.is_empty() {
            return None;
        }

        if let Some(target) = view.fenced_target() {
            return Some(SelectionResult::new(
                target.index(),
                SelectionReason::ExplicitOverride,
            ));
        }

        if let Some(target) = eligible.iter().find(|c| view.is_overridden(c)) {
            return Some(SelectionResult::new(
                target.index(),
                SelectionReason::ExplicitOverride,
            ));
        }

        let mut open: Vec<&Candidate<'_>> = eligible
            .iter()
            .filter(|c| !view.is_gated_out(c))
            .collect();
        if open.is_empty() {
            open = eligible.iter().collect();
        }

        if self.prefer_tricks && view.fence().is_none() && view.steps_taken() > 0 {
            let tricks = open.iter().copied().filter(|c| c.is_trick());
            if let Some((trick, _)) = view.best_overlap(tricks) {
                return Some(SelectionResult::new(
                    trick.index(),
                    SelectionReason::TrickPreference,
                ));
            }
        }

        let (winner, score) = view.best_overlap(open)?;
        let reason = if score > 0 {
            SelectionReason::CapabilityOverlap
        } else {
            SelectionReason::RegistrationOrder
        };
        Some(SelectionResult::new(winner.index(), reason))
    }
}
