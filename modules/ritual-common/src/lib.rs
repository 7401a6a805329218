//! Shared vocabulary for the ritual dispatch engine.
//!
//! Tags, kinds and payloads are the values every other crate passes around;
//! configuration and configuration errors live here so binaries can load them
//! without pulling in the engine.

pub mod config;
pub mod error;
pub mod kind;
pub mod tag;

pub use config::BoardConfig;
pub use error::ConfigError;
pub use kind::{Accepts, Kind, Payload};
pub use tag::{tag_set, OverrideTarget, Tag, TagSet};
