//! Runtime kinds and the "accepts input of kind K" predicate.
//!
//! Handlers declare what they accept with [`Accepts`] and what they produce
//! with a [`Kind`]. Values travel between handlers as a [`Payload`] that knows
//! its own kind, so eligibility is decided without inspecting the value.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Clone, Copy)]
pub struct Kind {
    id: TypeId,
    name: &'static str,
}

impl Kind {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path, e.g. `Doc` for `demo::Doc`.
    /// Generic types keep their full name.
    pub fn short_name(&self) -> &'static str {
        if self.name.contains('<') {
            return self.name;
        }
        match self.name.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Kind {}

impl Hash for Kind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kind({})", self.short_name())
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Input predicate of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepts {
    /// Any kind at all.
    Any,
    Exactly(Kind),
    OneOf(Vec<Kind>),
}

impl Accepts {
    pub fn exactly<T: Any>() -> Self {
        Self::Exactly(Kind::of::<T>())
    }

    pub fn admits(&self, kind: Kind) -> bool {
        match self {
            Self::Any => true,
            Self::Exactly(k) => *k == kind,
            Self::OneOf(kinds) => kinds.contains(&kind),
        }
    }

    /// True when some kind in `kinds` is admitted.
    pub fn admits_any<'a>(&self, kinds: impl IntoIterator<Item = &'a Kind>) -> bool {
        kinds.into_iter().any(|k| self.admits(*k))
    }
}

impl fmt::Display for Accepts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exactly(kind) => write!(f, "{kind}"),
            Self::OneOf(kinds) => {
                let names: Vec<_> = kinds.iter().map(Kind::short_name).collect();
                write!(f, "{}", names.join(" | "))
            }
        }
    }
}

/// A value tagged with its runtime kind.
pub struct Payload {
    kind: Kind,
    value: Box<dyn Any + Send>,
}

impl Payload {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            kind: Kind::of::<T>(),
            value: Box::new(value),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is<T: Any>(&self) -> bool {
        self.kind == Kind::of::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Take the value out, or get the payload back if it holds another kind.
    pub fn downcast<T: Any>(self) -> Result<T, Payload> {
        let kind = self.kind;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|value| Payload { kind, value })
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("kind", &self.kind).finish()
    }
}
