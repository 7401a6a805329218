//! Step records and observers.
//!
//! Every executed step is recorded in the invocation's [`Trail`] and handed
//! to the board's [`StepObserver`]. The trail travels with both successful
//! results and errors, so `by:*` observations survive failure paths.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ritual_common::{Kind, Tag};
use tracing::debug;
use uuid::Uuid;

use crate::strategy::SelectionReason;

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub reason: SelectionReason,
    pub input: Kind,
    pub output: Kind,
    /// Epoch the selection resolved in.
    pub epoch: u64,
    pub at: DateTime<Utc>,
}

/// Executed steps of one ritual, in order.
#[derive(Debug, Clone)]
pub struct Trail {
    pub ritual: Uuid,
    pub steps: Vec<StepRecord>,
}

impl Trail {
    pub fn new(ritual: Uuid) -> Self {
        Self {
            ritual,
            steps: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.steps.iter().map(|s| s.index).collect()
    }

    /// The `by:<name>` tag of every executed step.
    pub fn observations(&self) -> Vec<Tag> {
        self.steps.iter().map(|s| Tag::observed(&s.name)).collect()
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.steps.last()
    }
}

/// Receives each step as soon as it has executed.
#[async_trait]
pub trait StepObserver: Send + Sync {
    async fn on_step(&self, ritual: Uuid, record: &StepRecord);
}

/// Default observer: one `debug!` line per step.
pub struct TracingObserver;

#[async_trait]
impl StepObserver for TracingObserver {
    async fn on_step(&self, ritual: Uuid, record: &StepRecord) {
        debug!(
            %ritual,
            index = record.index,
            handler = record.name.as_str(),
            reason = %record.reason,
            input = %record.input,
            output = %record.output,
            epoch = record.epoch,
            "Step executed"
        );
    }
}

// ---------------------------------------------------------------------------
// MemoryObserver (tests)
// ---------------------------------------------------------------------------

/// Keeps every record in memory. Thread-safe.
#[derive(Default)]
pub struct MemoryObserver {
    records: Mutex<Vec<(Uuid, StepRecord)>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records seen so far (for test assertions).
    pub fn records(&self) -> Vec<(Uuid, StepRecord)> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.records().into_iter().map(|(_, r)| r.name).collect()
    }
}

#[async_trait]
impl StepObserver for MemoryObserver {
    async fn on_step(&self, ritual: Uuid, record: &StepRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((ritual, record.clone()));
    }
}

// Lets tests keep a handle on the observer they gave the board.
#[async_trait]
impl<O: StepObserver + ?Sized> StepObserver for Arc<O> {
    async fn on_step(&self, ritual: Uuid, record: &StepRecord) {
        (**self).on_step(ritual, record).await
    }
}
