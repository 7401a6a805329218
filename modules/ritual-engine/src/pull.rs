//! Pull mode: one externally driven step per call.
//!
//! No forward-only constraint applies; any handler admitting the input kind
//! is eligible. The caller keeps the branch's [`PullState`] between calls.
//! It is serializable so a branch can be parked and resumed.

use std::any::Any;

use ritual_common::{tag_set, Kind, Payload, Tag, TagSet};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::board::Board;
use crate::error::BoardError;
use crate::observe::{StepRecord, Trail};
use crate::registry::{HandlerDescriptor, Registry};
use crate::router::{BranchState, Horizon, Stepped};
use crate::scope::TagScope;
use crate::trick::TrickFence;

// ---------------------------------------------------------------------------
// Reachability: external collaborator seam
// ---------------------------------------------------------------------------

/// Decides whether a pull branch can still move after `executed` produced a
/// value of kind `output`.
pub trait Reachability: Send + Sync {
    fn has_next(&self, registry: &Registry, executed: &HandlerDescriptor, output: Kind) -> bool;
}

/// Some handler registered after `executed` admits the output.
pub struct ForwardReachability;

impl Reachability for ForwardReachability {
    fn has_next(&self, registry: &Registry, executed: &HandlerDescriptor, output: Kind) -> bool {
        registry
            .iter()
            .any(|d| d.index() > executed.index() && d.accepts().admits(output))
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// Everything a branch carries between calls besides its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullState {
    pub ritual: Uuid,
    pub tags: TagSet,
    pub fence: Option<TrickFence>,
    /// Steps executed on this branch so far.
    pub steps: usize,
}

impl Default for PullState {
    fn default() -> Self {
        Self {
            ritual: Uuid::new_v4(),
            tags: TagSet::new(),
            fence: None,
            steps: 0,
        }
    }
}

#[derive(Debug)]
pub struct PullRequest {
    pub input: Payload,
    pub state: PullState,
}

impl PullRequest {
    /// Start a new branch.
    pub fn new<T: Any + Send>(input: T) -> Self {
        Self {
            input: Payload::new(input),
            state: PullState::default(),
        }
    }

    /// Resume a parked branch.
    pub fn resume<T: Any + Send>(input: T, state: PullState) -> Self {
        Self {
            input: Payload::new(input),
            state,
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<Tag>>) -> Self {
        self.state.tags.extend(tag_set(tags));
        self
    }
}

#[derive(Debug)]
pub struct PullResponse {
    pub output: Payload,
    pub is_final: bool,
    /// State to send with the next request: no `by:*` observations, and
    /// only the `next:*` hints computed by this step.
    pub state: PullState,
    /// The executed step, or `None` when nothing was eligible.
    pub step: Option<StepRecord>,
}

impl PullResponse {
    /// Continue the branch with this response's output.
    pub fn into_request(self) -> PullRequest {
        PullRequest {
            input: self.output,
            state: self.state,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct PullDriver<'b> {
    board: &'b Board,
    end: Kind,
}

impl<'b> PullDriver<'b> {
    pub(crate) fn new(board: &'b Board, end: Kind) -> Self {
        Self { board, end }
    }

    pub fn end(&self) -> Kind {
        self.end
    }

    pub async fn advance(&self, request: PullRequest) -> Result<PullResponse, BoardError> {
        let cancel = CancellationToken::new();
        self.advance_with(request, &cancel).await
    }

    /// Advance exactly one step. A failure leaves earlier responses intact.
    pub async fn advance_with(
        &self,
        request: PullRequest,
        cancel: &CancellationToken,
    ) -> Result<PullResponse, BoardError> {
        let PullRequest { input, state } = request;
        let PullState {
            ritual,
            tags,
            fence,
            steps,
        } = state;
        let span = info_span!(
            "ritual",
            id = %ritual,
            start = %input.kind(),
            end = %self.end,
            mode = "pull",
            step = steps
        );

        async move {
            let router = self.board.unordered_router(self.end)?;
            let strategy = self.board.strategy();
            let run = self.board.run_context(strategy.as_ref(), cancel);
            let mut branch = BranchState {
                scope: TagScope::seeded(tags),
                fence,
                trail: Trail::new(ritual),
            };

            let stepped = router
                .step(input, &mut branch, Horizon::Unordered, steps, &run)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Pull step failed");
                    e
                })?;

            match stepped {
                Stepped::Settled(value) => {
                    if value.kind() != self.end {
                        let e = BoardError::RoutingExhausted {
                            expected: self.end,
                            actual: value.kind(),
                            trail: branch.trail,
                        };
                        warn!(error = %e, "Pull step failed");
                        return Err(e);
                    }
                    debug!("Nothing eligible; branch is final");
                    Ok(PullResponse {
                        output: value,
                        is_final: true,
                        state: PullState {
                            ritual,
                            tags: persisted(&branch.scope, &TagSet::new()),
                            fence: branch.fence,
                            steps,
                        },
                        step: None,
                    })
                }
                Stepped::Advanced {
                    output,
                    index,
                    hints,
                } => {
                    let registry = router.registry();
                    let has_next = registry.get(index).is_some_and(|executed| {
                        self.board
                            .reachability()
                            .has_next(registry, executed, output.kind())
                    });
                    let is_final = output.kind() == self.end && !has_next;
                    let step = branch.trail.steps.pop();
                    debug!(
                        handler = step.as_ref().map(|s| s.name.as_str()),
                        is_final,
                        "Pull step complete"
                    );
                    Ok(PullResponse {
                        output,
                        is_final,
                        state: PullState {
                            ritual,
                            tags: persisted(&branch.scope, &hints),
                            fence: branch.fence,
                            steps: steps + 1,
                        },
                        step,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Tags to carry into the next call: everything visible except observations
/// and stale hints.
fn persisted(scope: &TagScope, fresh_hints: &TagSet) -> TagSet {
    scope
        .current_tags()
        .into_iter()
        .filter(|tag| !tag.is_observation())
        .filter(|tag| !tag.is_hint() || fresh_hints.contains(tag))
        .collect()
}
