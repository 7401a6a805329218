//! Handler traits and adapters.
//!
//! The engine only speaks [`Handler`], which moves [`Payload`]s. Most code
//! implements the typed [`Step`] instead and registers it through the
//! registry builder, which wraps it in [`Typed`].

use std::any::Any;
use std::marker::PhantomData;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ritual_common::{Kind, Payload, Tag};

use crate::context::TagContext;

/// Untyped handler as the engine invokes it.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, input: Payload, cx: &mut TagContext<'_>) -> Result<Payload>;

    /// Capabilities this handler advertises. Merged with the capabilities
    /// given at registration.
    fn supported_tags(&self) -> Vec<Tag> {
        Vec::new()
    }
}

/// A typed step from `I` to `O`.
#[async_trait]
pub trait Step<I, O>: Send + Sync
where
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I, cx: &mut TagContext<'_>) -> Result<O>;

    fn supported_tags(&self) -> Vec<Tag> {
        Vec::new()
    }
}

/// Adapts a [`Step`] into a [`Handler`].
pub struct Typed<S, I, O> {
    step: S,
    _io: PhantomData<fn(I) -> O>,
}

impl<S, I, O> Typed<S, I, O> {
    pub fn new(step: S) -> Self {
        Self {
            step,
            _io: PhantomData,
        }
    }
}

#[async_trait]
impl<S, I, O> Handler for Typed<S, I, O>
where
    S: Step<I, O>,
    I: Any + Send + 'static,
    O: Any + Send + 'static,
{
    async fn handle(&self, input: Payload, cx: &mut TagContext<'_>) -> Result<Payload> {
        let input = input.downcast::<I>().map_err(|payload| {
            anyhow!(
                "expected input of kind `{}`, received `{}`",
                Kind::of::<I>(),
                payload.kind()
            )
        })?;
        let output = self.step.run(input, cx).await?;
        Ok(Payload::new(output))
    }

    fn supported_tags(&self) -> Vec<Tag> {
        self.step.supported_tags()
    }
}

/// A [`Step`] backed by a synchronous closure. Build with [`fn_step`].
pub struct FnStep<F, I, O> {
    f: F,
    _io: PhantomData<fn(I) -> O>,
}

pub fn fn_step<I, O, F>(f: F) -> FnStep<F, I, O>
where
    F: Fn(I, &mut TagContext<'_>) -> Result<O> + Send + Sync,
{
    FnStep { f, _io: PhantomData }
}

#[async_trait]
impl<F, I, O> Step<I, O> for FnStep<F, I, O>
where
    F: Fn(I, &mut TagContext<'_>) -> Result<O> + Send + Sync,
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I, cx: &mut TagContext<'_>) -> Result<O> {
        (self.f)(input, cx)
    }
}

/// Passes its input through untouched. Activated for every Trick.
pub struct Identity;

#[async_trait]
impl Handler for Identity {
    async fn handle(&self, input: Payload, _cx: &mut TagContext<'_>) -> Result<Payload> {
        Ok(input)
    }
}
