//! Ordered handler registry.
//!
//! Registration order is the only ordering the engine knows: a descriptor's
//! index is its insertion position and never changes. The registry is built
//! once and shared read-only by every board and router.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use ritual_common::{Accepts, Kind, Tag, TagSet};

use crate::handler::{Handler, Identity, Step, Typed};

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

/// Produces a runnable handler for a descriptor.
///
/// Failures are reported by the engine together with the descriptor's index,
/// name and kinds.
pub trait Activator: Send + Sync {
    fn activate(&self, descriptor: &HandlerDescriptor) -> Result<Arc<dyn Handler>>;
}

/// Hands out the same shared instance on every activation.
pub struct Instance(pub Arc<dyn Handler>);

impl Activator for Instance {
    fn activate(&self, _descriptor: &HandlerDescriptor) -> Result<Arc<dyn Handler>> {
        Ok(self.0.clone())
    }
}

/// Builds a fresh handler on every activation.
pub struct Factory<F>(pub F);

impl<F> Activator for Factory<F>
where
    F: Fn(&HandlerDescriptor) -> Result<Arc<dyn Handler>> + Send + Sync,
{
    fn activate(&self, descriptor: &HandlerDescriptor) -> Result<Arc<dyn Handler>> {
        (self.0)(descriptor)
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// Names of the handlers a Trick fences its following hop to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrickSpec {
    candidates: Vec<String>,
}

impl TrickSpec {
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

pub struct HandlerDescriptor {
    name: String,
    folded_name: String,
    index: usize,
    accepts: Accepts,
    output: Kind,
    capabilities: TagSet,
    activator: Arc<dyn Activator>,
    trick: Option<TrickSpec>,
}

impl HandlerDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-folded name, as matched by `to:<name>`.
    pub fn folded_name(&self) -> &str {
        &self.folded_name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn accepts(&self) -> &Accepts {
        &self.accepts
    }

    pub fn output(&self) -> Kind {
        self.output
    }

    pub fn capabilities(&self) -> &TagSet {
        &self.capabilities
    }

    pub fn trick(&self) -> Option<&TrickSpec> {
        self.trick.as_ref()
    }

    pub fn is_trick(&self) -> bool {
        self.trick.is_some()
    }

    pub fn activate(&self) -> Result<Arc<dyn Handler>> {
        self.activator.activate(self)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("accepts", &self.accepts)
            .field("output", &self.output)
            .field("capabilities", &self.capabilities)
            .field("trick", &self.trick)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Registry {
    descriptors: Vec<HandlerDescriptor>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HandlerDescriptor> {
        self.descriptors.get(index)
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.descriptors.iter()
    }

    /// All descriptors registered under `name`, compared case-insensitively.
    pub fn named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a HandlerDescriptor> + 'a {
        let folded = name.to_lowercase();
        self.descriptors
            .iter()
            .filter(move |d| d.folded_name == folded)
    }
}

/// Appends descriptors in order. Nothing is validated here; reachability
/// and fence names are checked when a route is compiled.
#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<HandlerDescriptor>,
}

impl RegistryBuilder {
    /// Register a typed step as a shared instance. Its `supported_tags()`
    /// are merged with `capabilities`.
    pub fn step<I, O, S>(
        self,
        name: impl Into<String>,
        step: S,
        capabilities: impl IntoIterator<Item = impl Into<Tag>>,
    ) -> Self
    where
        I: Any + Send + 'static,
        O: Any + Send + 'static,
        S: Step<I, O> + 'static,
    {
        let handler: Arc<dyn Handler> = Arc::new(Typed::<S, I, O>::new(step));
        let mut capabilities: TagSet = capabilities.into_iter().map(Into::into).collect();
        capabilities.extend(handler.supported_tags());
        self.push(
            name.into(),
            Accepts::exactly::<I>(),
            Kind::of::<O>(),
            capabilities,
            Arc::new(Instance(handler)),
            None,
        )
    }

    /// Register a typed step built by `make` each time it is activated.
    /// Only registration-time capabilities apply.
    pub fn factory<I, O, S, F>(
        self,
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = impl Into<Tag>>,
        make: F,
    ) -> Self
    where
        I: Any + Send + 'static,
        O: Any + Send + 'static,
        S: Step<I, O> + 'static,
        F: Fn() -> Result<S> + Send + Sync + 'static,
    {
        let activator = Factory(move |_: &HandlerDescriptor| {
            let handler: Arc<dyn Handler> = Arc::new(Typed::<S, I, O>::new(make()?));
            Ok(handler)
        });
        self.push(
            name.into(),
            Accepts::exactly::<I>(),
            Kind::of::<O>(),
            capabilities.into_iter().map(Into::into).collect(),
            Arc::new(activator),
            None,
        )
    }

    /// Register an untyped handler over arbitrary kinds.
    pub fn handler(
        self,
        name: impl Into<String>,
        accepts: Accepts,
        output: Kind,
        activator: impl Activator + 'static,
        capabilities: impl IntoIterator<Item = impl Into<Tag>>,
    ) -> Self {
        self.push(
            name.into(),
            accepts,
            output,
            capabilities.into_iter().map(Into::into).collect(),
            Arc::new(activator),
            None,
        )
    }

    /// Register a Trick over kind `T`: an identity step that fences the
    /// following selection to the named handlers.
    pub fn trick<T: Any + Send + 'static>(
        self,
        name: impl Into<String>,
        candidates: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let spec = TrickSpec {
            candidates: candidates.into_iter().map(Into::into).collect(),
        };
        self.push(
            name.into(),
            Accepts::exactly::<T>(),
            Kind::of::<T>(),
            TagSet::new(),
            Arc::new(Instance(Arc::new(Identity))),
            Some(spec),
        )
    }

    fn push(
        mut self,
        name: String,
        accepts: Accepts,
        output: Kind,
        capabilities: TagSet,
        activator: Arc<dyn Activator>,
        trick: Option<TrickSpec>,
    ) -> Self {
        let index = self.descriptors.len();
        let folded_name = name.to_lowercase();
        self.descriptors.push(HandlerDescriptor {
            name,
            folded_name,
            index,
            accepts,
            output,
            capabilities,
            activator,
            trick,
        });
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            descriptors: self.descriptors,
        }
    }
}
