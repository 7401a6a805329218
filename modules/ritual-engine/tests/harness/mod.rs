//! Shared fixtures: a small document pipeline.
//!
//! `pipeline()` registers, in order:
//!
//! | # | name   | kinds         | capabilities  |
//! |---|--------|---------------|---------------|
//! | 0 | Parse  | String -> Doc |               |
//! | 1 | Loud   | Doc -> Doc    | `style:loud`  |
//! | 2 | Quiet  | Doc -> Doc    | `style:quiet` |
//! | 3 | Finish | Doc -> String |               |
//!
//! `trick_pipeline()` inserts a `Style` trick fencing Loud and Quiet after
//! Parse, and a Whisper step before Finish.

#![allow(dead_code)]

use ritual_engine::{fn_step, Registry, RegistryBuilder, Tag};

#[derive(Debug, Clone, PartialEq)]
pub struct Doc {
    pub text: String,
    /// Styles applied so far, in order.
    pub applied: Vec<&'static str>,
}

impl Doc {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            applied: Vec::new(),
        }
    }

    fn styled(mut self, style: &'static str, text: String) -> Self {
        self.text = text;
        self.applied.push(style);
        self
    }
}

pub fn no_tags() -> Vec<Tag> {
    Vec::new()
}

pub fn parse(builder: RegistryBuilder) -> RegistryBuilder {
    builder.step(
        "Parse",
        fn_step(|text: String, _cx| Ok(Doc::new(text.trim()))),
        no_tags(),
    )
}

pub fn loud(builder: RegistryBuilder) -> RegistryBuilder {
    builder.step(
        "Loud",
        fn_step(|doc: Doc, _cx| {
            let text = doc.text.to_uppercase();
            Ok(doc.styled("loud", text))
        }),
        ["style:loud"],
    )
}

pub fn quiet(builder: RegistryBuilder) -> RegistryBuilder {
    builder.step(
        "Quiet",
        fn_step(|doc: Doc, _cx| {
            let text = doc.text.to_lowercase();
            Ok(doc.styled("quiet", text))
        }),
        ["style:quiet"],
    )
}

pub fn whisper(builder: RegistryBuilder) -> RegistryBuilder {
    builder.step(
        "Whisper",
        fn_step(|doc: Doc, _cx| {
            let text = format!("({})", doc.text);
            Ok(doc.styled("whisper", text))
        }),
        ["style:quiet", "volume:low"],
    )
}

pub fn finish(builder: RegistryBuilder) -> RegistryBuilder {
    builder.step(
        "Finish",
        fn_step(|doc: Doc, _cx| Ok(format!("<{}>", doc.text))),
        no_tags(),
    )
}

pub fn pipeline() -> Registry {
    let builder = parse(Registry::builder());
    let builder = quiet(loud(builder));
    finish(builder).build()
}

/// Parse, Style (trick over Loud and Quiet), Loud, Quiet, Whisper, Finish.
pub fn trick_pipeline() -> Registry {
    let builder = parse(Registry::builder()).trick::<Doc>("Style", ["Loud", "Quiet"]);
    let builder = whisper(quiet(loud(builder)));
    finish(builder).build()
}
