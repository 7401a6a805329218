use ritual_common::{Accepts, Kind};
use thiserror::Error;

use crate::observe::Trail;

/// Every way a ritual can end other than with a value.
///
/// Variants raised mid-run carry the [`Trail`] of steps executed so far.
#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Routing exhausted after {} step(s): `{actual}` is not assignable to `{expected}`", .trail.len())]
    RoutingExhausted {
        expected: Kind,
        actual: Kind,
        trail: Trail,
    },

    #[error("Failed to activate handler #{index} `{name}` ({input} -> {output}): {cause:#}")]
    Activation {
        index: usize,
        name: String,
        input: Accepts,
        output: Kind,
        cause: anyhow::Error,
        trail: Trail,
    },

    #[error("Ritual cancelled after {} step(s)", .trail.len())]
    Cancelled { trail: Trail },

    #[error("Trick #{owner} raised a fence while the fence of #{pending} was still pending")]
    InvalidFenceState {
        pending: usize,
        owner: usize,
        trail: Trail,
    },

    #[error("Handler #{index} `{name}` failed: {cause:#}")]
    Handler {
        index: usize,
        name: String,
        cause: anyhow::Error,
        trail: Trail,
    },

    #[error("Handler #{index} `{name}` declared `{declared}` but produced `{actual}`")]
    OutputMismatch {
        index: usize,
        name: String,
        declared: Kind,
        actual: Kind,
        trail: Trail,
    },

    #[error("Strategy selected #{index}, which is not an eligible candidate")]
    InvalidSelection { index: usize, trail: Trail },

    #[error("Trick `{trick}` fences unknown handler `{candidate}`")]
    UnknownFenceCandidate { trick: String, candidate: String },

    #[error("Step limit of {limit} reached")]
    StepLimitExceeded { limit: usize, trail: Trail },
}

impl BoardError {
    /// Cancellation is a terminal outcome rather than a routing failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Steps executed before the failure, when the failure happened mid-run.
    pub fn trail(&self) -> Option<&Trail> {
        match self {
            Self::RoutingExhausted { trail, .. }
            | Self::Activation { trail, .. }
            | Self::Cancelled { trail }
            | Self::InvalidFenceState { trail, .. }
            | Self::Handler { trail, .. }
            | Self::OutputMismatch { trail, .. }
            | Self::InvalidSelection { trail, .. }
            | Self::StepLimitExceeded { trail, .. } => Some(trail),
            Self::UnknownFenceCandidate { .. } => None,
        }
    }
}
