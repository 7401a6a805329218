//! The board: shared registry, strategy and route cache, plus the push-mode
//! entry points.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use ritual_common::{tag_set, BoardConfig, Kind, Payload, Tag, TagSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::BoardError;
use crate::observe::{StepObserver, TracingObserver, Trail};
use crate::pull::{ForwardReachability, PullDriver, Reachability};
use crate::registry::Registry;
use crate::router::{CompiledRouter, RunContext};
use crate::strategy::{DefaultStrategy, SelectionStrategy};

/// Outcome of a completed ritual.
#[derive(Debug)]
pub struct Ritual<T> {
    pub value: T,
    pub trail: Trail,
    /// Tags visible when the ritual settled, observations included.
    pub tags: TagSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RouteKey {
    /// `None` for the unpruned route used by pull mode.
    start: Option<Kind>,
    end: Kind,
}

/// Runs rituals over one registry.
///
/// The registry and every compiled route are read-only once built and are
/// shared by concurrent invocations; each invocation owns its tag scope.
pub struct Board {
    registry: Arc<Registry>,
    config: BoardConfig,
    strategy: Option<Arc<dyn SelectionStrategy>>,
    observer: Arc<dyn StepObserver>,
    reachability: Arc<dyn Reachability>,
    routers: RwLock<HashMap<RouteKey, Arc<CompiledRouter>>>,
}

impl Board {
    pub fn new(registry: impl Into<Arc<Registry>>) -> Self {
        Self {
            registry: registry.into(),
            config: BoardConfig::default(),
            strategy: None,
            observer: Arc::new(TracingObserver),
            reachability: Arc::new(ForwardReachability),
            routers: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: BoardConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default strategy. `prefer_tricks` no longer applies.
    pub fn with_strategy(mut self, strategy: impl SelectionStrategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_observer(mut self, observer: impl StepObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn with_reachability(mut self, reachability: impl Reachability + 'static) -> Self {
        self.reachability = Arc::new(reachability);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub(crate) fn reachability(&self) -> &dyn Reachability {
        self.reachability.as_ref()
    }

    pub(crate) fn strategy(&self) -> Arc<dyn SelectionStrategy> {
        self.strategy
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultStrategy::new(self.config.prefer_tricks)))
    }

    pub(crate) fn run_context<'a>(
        &'a self,
        strategy: &'a dyn SelectionStrategy,
        cancel: &'a CancellationToken,
    ) -> RunContext<'a> {
        RunContext {
            strategy,
            config: &self.config,
            cancel,
            observer: self.observer.as_ref(),
        }
    }

    /// The compiled route for `start -> end`, compiled on first use.
    pub fn router(&self, start: Kind, end: Kind) -> Result<Arc<CompiledRouter>, BoardError> {
        self.cached(RouteKey {
            start: Some(start),
            end,
        })
    }

    pub(crate) fn unordered_router(&self, end: Kind) -> Result<Arc<CompiledRouter>, BoardError> {
        self.cached(RouteKey { start: None, end })
    }

    fn cached(&self, key: RouteKey) -> Result<Arc<CompiledRouter>, BoardError> {
        if let Some(router) = self
            .routers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(router.clone());
        }

        let router = Arc::new(CompiledRouter::compile(
            self.registry.clone(),
            key.start,
            key.end,
        )?);
        let mut routers = self
            .routers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(routers.entry(key).or_insert(router).clone())
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    /// Route `input` to a value of kind `O`.
    pub async fn invoke<I, O>(
        &self,
        input: I,
        seed: impl IntoIterator<Item = impl Into<Tag>>,
    ) -> Result<O, BoardError>
    where
        I: Any + Send,
        O: Any + Send,
    {
        let cancel = CancellationToken::new();
        Ok(self.invoke_with::<I, O>(input, seed, &cancel).await?.value)
    }

    /// Like [`Board::invoke`], observing `cancel` and returning the trail.
    pub async fn invoke_with<I, O>(
        &self,
        input: I,
        seed: impl IntoIterator<Item = impl Into<Tag>>,
        cancel: &CancellationToken,
    ) -> Result<Ritual<O>, BoardError>
    where
        I: Any + Send,
        O: Any + Send,
    {
        let end = Kind::of::<O>();
        let Ritual { value, trail, tags } = self
            .invoke_payload(Payload::new(input), end, seed, cancel)
            .await?;
        match value.downcast::<O>() {
            Ok(value) => Ok(Ritual { value, trail, tags }),
            Err(payload) => Err(BoardError::RoutingExhausted {
                expected: end,
                actual: payload.kind(),
                trail,
            }),
        }
    }

    /// Untyped push entry point.
    pub async fn invoke_payload(
        &self,
        input: Payload,
        end: Kind,
        seed: impl IntoIterator<Item = impl Into<Tag>>,
        cancel: &CancellationToken,
    ) -> Result<Ritual<Payload>, BoardError> {
        let ritual = Uuid::new_v4();
        let seed = tag_set(seed);
        let span = info_span!(
            "ritual",
            id = %ritual,
            start = %input.kind(),
            end = %end,
            mode = "push"
        );

        async move {
            let router = self.router(input.kind(), end)?;
            let strategy = self.strategy();
            let run = self.run_context(strategy.as_ref(), cancel);

            let result = router.execute(input, seed, ritual, &run).await;
            match &result {
                Ok(done) => info!(
                    steps = done.trail.len(),
                    path = ?done.trail.names(),
                    "Ritual complete"
                ),
                Err(e) if e.is_cancelled() => info!(error = %e, "Ritual cancelled"),
                Err(e) => warn!(error = %e, "Ritual failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Pull-mode driver producing values of kind `E`.
    pub fn pull_driver<E: Any>(&self) -> PullDriver<'_> {
        PullDriver::new(self, Kind::of::<E>())
    }
}
