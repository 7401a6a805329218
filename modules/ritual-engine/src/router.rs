//! Precompiled routes and the step loop.
//!
//! A [`CompiledRouter`] is built once per `(start, end)` kind pair. It keeps
//! only the descriptors reachable from the start kind in registration order,
//! interns their capability sets into symbols, and resolves every Trick's
//! fence to registration indices. Push runs call [`CompiledRouter::execute`];
//! the pull driver calls [`CompiledRouter::step`] once per request.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use ritual_common::{BoardConfig, Kind, Payload, Tag, TagSet};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::board::Ritual;
use crate::context::TagContext;
use crate::error::BoardError;
use crate::observe::{StepObserver, StepRecord, Trail};
use crate::registry::{HandlerDescriptor, Registry};
use crate::scope::TagScope;
use crate::strategy::{Candidate, SelectionStrategy, SelectionView, Signals};
use crate::trick::{install_fence, raise_fence, TrickFence};

pub(crate) type Symbol = u32;

/// Case-folded tag → symbol table shared by all capability sets of a route.
#[derive(Debug, Default)]
pub(crate) struct Interner {
    ids: HashMap<String, Symbol>,
}

impl Interner {
    fn intern(&mut self, folded: &str) -> Symbol {
        if let Some(&id) = self.ids.get(folded) {
            return id;
        }
        let id = self.ids.len() as Symbol;
        self.ids.insert(folded.to_string(), id);
        id
    }

    pub(crate) fn get(&self, folded: &str) -> Option<Symbol> {
        self.ids.get(folded).copied()
    }
}

struct CompiledHandler {
    index: usize,
    /// Sorted, de-duplicated.
    capabilities: Box<[Symbol]>,
    /// Registration indices fenced by this handler, for Tricks.
    fence: Option<Box<[usize]>>,
}

/// Which descriptors a step may consider.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Horizon {
    /// Push: only descriptors registered after the last executed one.
    Forward(Option<usize>),
    /// Pull: any descriptor.
    Unordered,
}

impl Horizon {
    fn admits(&self, descriptor: &HandlerDescriptor) -> bool {
        match self {
            Self::Forward(Some(last)) => descriptor.index() > *last,
            Self::Forward(None) | Self::Unordered => true,
        }
    }

    fn after(self, index: usize) -> Self {
        match self {
            Self::Forward(_) => Self::Forward(Some(index)),
            Self::Unordered => Self::Unordered,
        }
    }
}

/// Collaborators of one run.
pub(crate) struct RunContext<'a> {
    pub strategy: &'a dyn SelectionStrategy,
    pub config: &'a BoardConfig,
    pub cancel: &'a CancellationToken,
    pub observer: &'a dyn StepObserver,
}

/// Mutable state of one branch between steps.
pub(crate) struct BranchState {
    pub scope: TagScope,
    pub fence: Option<TrickFence>,
    pub trail: Trail,
}

pub(crate) enum Stepped {
    /// No eligible candidate; the value comes back untouched.
    Settled(Payload),
    Advanced {
        output: Payload,
        index: usize,
        hints: TagSet,
    },
}

pub struct CompiledRouter {
    registry: Arc<Registry>,
    start: Option<Kind>,
    end: Kind,
    handlers: Vec<CompiledHandler>,
    interner: Interner,
}

impl CompiledRouter {
    /// Compile a route. With a `start` kind, descriptors that can never see
    /// a value in forward order are left out; without one every descriptor
    /// is kept (pull mode).
    pub fn compile(
        registry: Arc<Registry>,
        start: Option<Kind>,
        end: Kind,
    ) -> Result<Self, BoardError> {
        let mut reachable: HashSet<Kind> = start.into_iter().collect();
        let mut interner = Interner::default();
        let mut handlers = Vec::new();

        for descriptor in registry.iter() {
            if start.is_some() {
                if !descriptor.accepts().admits_any(&reachable) {
                    continue;
                }
                reachable.insert(descriptor.output());
            }

            let mut capabilities: Vec<Symbol> = descriptor
                .capabilities()
                .iter()
                .map(|tag| interner.intern(tag.folded()))
                .collect();
            capabilities.sort_unstable();
            capabilities.dedup();

            let fence = match descriptor.trick() {
                Some(spec) => Some(resolve_fence(&registry, descriptor, spec.candidates())?),
                None => None,
            };

            handlers.push(CompiledHandler {
                index: descriptor.index(),
                capabilities: capabilities.into_boxed_slice(),
                fence,
            });
        }

        debug!(
            start = ?start,
            end = %end,
            handlers = handlers.len(),
            registered = registry.len(),
            "Route compiled"
        );

        Ok(Self {
            registry,
            start,
            end,
            handlers,
            interner,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn start(&self) -> Option<Kind> {
        self.start
    }

    pub fn end(&self) -> Kind {
        self.end
    }

    /// Registration indices kept by compilation, in order.
    pub fn route(&self) -> Vec<usize> {
        self.handlers.iter().map(|h| h.index).collect()
    }

    #[cfg(test)]
    pub(crate) fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Compiled descriptors passing `filter`, in registration order.
    pub(crate) fn candidates(
        &self,
        filter: impl Fn(&HandlerDescriptor) -> bool,
    ) -> Vec<Candidate<'_>> {
        self.handlers
            .iter()
            .filter_map(|h| {
                let descriptor = self.registry.get(h.index)?;
                filter(descriptor).then(|| Candidate::new(descriptor, &h.capabilities))
            })
            .collect()
    }

    fn fence_of(&self, index: usize) -> Option<&[usize]> {
        let position = self
            .handlers
            .binary_search_by_key(&index, |h| h.index)
            .ok()?;
        self.handlers[position].fence.as_deref()
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    /// Drive `input` forward until no handler is eligible, then check the
    /// final value against the end kind. A value that already has the end
    /// kind keeps moving while forward steps remain.
    pub(crate) async fn execute(
        &self,
        input: Payload,
        seed: TagSet,
        ritual: Uuid,
        run: &RunContext<'_>,
    ) -> Result<Ritual<Payload>, BoardError> {
        let mut state = BranchState {
            scope: TagScope::seeded(seed),
            fence: None,
            trail: Trail::new(ritual),
        };
        let mut horizon = Horizon::Forward(None);
        let mut current = input;

        loop {
            let steps = state.trail.len();
            match self.step(current, &mut state, horizon, steps, run).await? {
                Stepped::Settled(value) => {
                    current = value;
                    break;
                }
                Stepped::Advanced { output, index, .. } => {
                    current = output;
                    horizon = horizon.after(index);
                }
            }
        }

        if current.kind() != self.end {
            return Err(BoardError::RoutingExhausted {
                expected: self.end,
                actual: current.kind(),
                trail: state.trail,
            });
        }

        Ok(Ritual {
            value: current,
            tags: state.scope.current_tags(),
            trail: state.trail,
        })
    }

    // -----------------------------------------------------------------------
    // One step
    // -----------------------------------------------------------------------

    /// Select and run one handler.
    ///
    /// Any fence in `state` is consumed by this selection. On success the
    /// scope holds `by:<name>`, the fresh `next:*` hints and every tag the
    /// handler added, and has advanced one epoch.
    pub(crate) async fn step(
        &self,
        current: Payload,
        state: &mut BranchState,
        horizon: Horizon,
        steps_taken: usize,
        run: &RunContext<'_>,
    ) -> Result<Stepped, BoardError> {
        if run.cancel.is_cancelled() {
            return Err(BoardError::Cancelled {
                trail: state.trail.clone(),
            });
        }

        let kind = current.kind();
        let signals = Signals::capture(&state.scope.current_tags(), &self.interner);
        let fence = state.fence.take();

        let selected = {
            let candidates = self.candidates(|d| horizon.admits(d) && d.accepts().admits(kind));
            let view = SelectionView::new(candidates, &signals, fence.as_ref(), steps_taken);
            let selected = run.strategy.select(&view);
            if let Some(result) = selected {
                if !view.is_eligible(result.index) {
                    return Err(BoardError::InvalidSelection {
                        index: result.index,
                        trail: state.trail.clone(),
                    });
                }
            }
            selected
        };

        if let Some(fence) = &fence {
            if let Some(tag) = fence.retractable() {
                state.scope.retract(tag);
            }
            debug!(owner = fence.owner(), "Fence consumed");
        }

        let Some(selected) = selected else {
            return Ok(Stepped::Settled(current));
        };
        let Some(descriptor) = self.registry.get(selected.index) else {
            return Err(BoardError::InvalidSelection {
                index: selected.index,
                trail: state.trail.clone(),
            });
        };

        if let Some(limit) = run.config.max_steps {
            if steps_taken >= limit {
                return Err(BoardError::StepLimitExceeded {
                    limit,
                    trail: state.trail.clone(),
                });
            }
        }

        let handler = descriptor
            .activate()
            .map_err(|cause| BoardError::Activation {
                index: descriptor.index(),
                name: descriptor.name().to_string(),
                input: descriptor.accepts().clone(),
                output: descriptor.output(),
                cause,
                trail: state.trail.clone(),
            })?;

        let epoch = state.scope.epoch();
        let at = Utc::now();
        let result = {
            let mut tags = TagContext::new(&mut state.scope, run.cancel, descriptor.name());
            tokio::select! {
                biased;
                _ = run.cancel.cancelled() => None,
                result = handler.handle(current, &mut tags) => Some(result),
            }
        };

        let output = match result {
            None => {
                return Err(BoardError::Cancelled {
                    trail: state.trail.clone(),
                })
            }
            Some(Err(cause)) => {
                return Err(BoardError::Handler {
                    index: descriptor.index(),
                    name: descriptor.name().to_string(),
                    cause,
                    trail: state.trail.clone(),
                })
            }
            Some(Ok(output)) => output,
        };

        if output.kind() != descriptor.output() {
            return Err(BoardError::OutputMismatch {
                index: descriptor.index(),
                name: descriptor.name().to_string(),
                declared: descriptor.output(),
                actual: output.kind(),
                trail: state.trail.clone(),
            });
        }

        let out_kind = output.kind();
        let next = horizon.after(descriptor.index());

        state.scope.add_current(Tag::observed(descriptor.name()));
        let hints: TagSet = self
            .candidates(|d| next.admits(d) && d.accepts().admits(out_kind))
            .iter()
            .map(|c| Tag::hint(c.name()))
            .collect();
        for hint in &hints {
            state.scope.add(hint.clone());
        }
        state.scope.advance_epoch();

        let record = StepRecord {
            index: descriptor.index(),
            name: descriptor.name().to_string(),
            reason: selected.reason,
            input: kind,
            output: out_kind,
            epoch,
            at,
        };
        run.observer.on_step(state.trail.ritual, &record).await;
        state.trail.steps.push(record);

        if let Some(fenced) = self.fence_of(descriptor.index()) {
            let signals = Signals::capture(&state.scope.current_tags(), &self.interner);
            let reachable = self.candidates(|d| {
                fenced.contains(&d.index()) && next.admits(d) && d.accepts().admits(out_kind)
            });
            let mut fence = raise_fence(descriptor, fenced, &reachable, &signals);
            if let Some(tag) = fence.injected() {
                let created = state.scope.add_current(tag.clone());
                fence.set_owns_injected(created);
            }
            debug!(
                owner = descriptor.index(),
                trick = descriptor.name(),
                forced = ?fence.forced(),
                "Fence raised"
            );
            install_fence(&mut state.fence, fence).map_err(|pending| {
                BoardError::InvalidFenceState {
                    pending,
                    owner: descriptor.index(),
                    trail: state.trail.clone(),
                }
            })?;
        }

        Ok(Stepped::Advanced {
            output,
            index: descriptor.index(),
            hints,
        })
    }
}

fn resolve_fence(
    registry: &Registry,
    trick: &HandlerDescriptor,
    names: &[String],
) -> Result<Box<[usize]>, BoardError> {
    let mut indices = Vec::new();
    for name in names {
        let before = indices.len();
        indices.extend(registry.named(name).map(HandlerDescriptor::index));
        if indices.len() == before {
            return Err(BoardError::UnknownFenceCandidate {
                trick: trick.name().to_string(),
                candidate: name.clone(),
            });
        }
    }
    indices.sort_unstable();
    indices.dedup();
    Ok(indices.into_boxed_slice())
}
