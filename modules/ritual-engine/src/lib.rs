//! Typed, capability-driven dispatch engine.
//!
//! A [`Board`] routes a value through a subsequence of registered handlers,
//! chosen one step at a time from the tags accumulated so far, until nothing
//! more is eligible and the value has the requested kind.
//!
//! Push mode ([`Board::invoke`]) runs forward-only to completion. Pull mode
//! ([`Board::pull_driver`]) advances one step per call and hands the branch
//! state back to the caller.

pub mod board;
pub mod context;
pub mod error;
pub mod handler;
pub mod observe;
pub mod pull;
pub mod registry;
pub mod router;
pub mod scope;
pub mod strategy;
pub mod trick;

pub use board::{Board, Ritual};
pub use context::TagContext;
pub use error::BoardError;
pub use handler::{fn_step, FnStep, Handler, Identity, Step, Typed};
pub use observe::{MemoryObserver, StepObserver, StepRecord, TracingObserver, Trail};
pub use pull::{ForwardReachability, PullDriver, PullRequest, PullResponse, PullState, Reachability};
pub use registry::{Activator, Factory, HandlerDescriptor, Instance, Registry, RegistryBuilder, TrickSpec};
pub use router::CompiledRouter;
pub use scope::TagScope;
pub use strategy::{
    Candidate, DefaultStrategy, SelectionReason, SelectionResult, SelectionStrategy, SelectionView,
};
pub use trick::TrickFence;

pub use ritual_common::{tag_set, Accepts, BoardConfig, Kind, Payload, Tag, TagSet};
pub use tokio_util::sync::CancellationToken;
