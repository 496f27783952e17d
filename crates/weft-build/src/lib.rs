//! Incremental build engine for multi-file documents.
//!
//! A project declares root documents in its manifest. Roots pull other
//! source files in through include directives, cross-reference anchors in
//! any reachable file, and embed executable code blocks. This crate turns
//! that tree into one display page per root, rebuilding only what a set of
//! changed files can affect.
//!
//! # Architecture
//!
//! - [`analyze_includes`]: include graph of the declared roots
//! - [`collect_anchors`]: anchor index with owning roots
//! - [`resolve_refs`]: cross-references to links
//! - [`plan`] / [`affected_roots`]: what to rebuild, dependencies first
//! - [`Mirror`]: staged copies with placeholders
//! - [`Renderer`]: boundary to the document renderer, [`PandocRenderer`]
//! - [`Assembler`]: display pages spliced from staged HTML
//! - [`inject_navigation`]: page list and heading tree
//! - [`BuildSession`]: the pipeline tying these together
//!
//! # Example
//!
//! ```ignore
//! use weft_build::BuildSession;
//! use weft_config::Config;
//!
//! let config = Config::load(None, None)?;
//! let report = BuildSession::from_config(&config).build(None)?;
//! println!("{} pages assembled", report.assembled.len());
//! ```

mod anchors;
mod assemble;
mod error;
mod include_graph;
mod mirror;
mod navigation;
pub mod paths;
mod placeholder;
mod planner;
mod refs;
mod render;
mod session;
mod sources;

pub use anchors::{Anchor, AnchorIndex, AnchorKind, collect_anchors, scan_anchors};
pub use assemble::{Assembler, body_inner, substitute_code};
pub use error::BuildError;
pub use include_graph::{
    Directive, IncludeGraph, IncludeKind, analyze_includes, parse_directives, resolve_reference,
};
pub use mirror::{Mirror, Mirrored};
pub use navigation::{NavPage, Section, inject_navigation, parse_headings, read_title};
pub use placeholder::{Placeholder, find_placeholders, replace_placeholders};
pub use planner::{BuildPlan, affected_roots, plan};
pub use refs::{ResolvedText, replace_refs_text, resolve_refs};
pub use render::{MATHJAX_SCRIPT, PandocRenderer, RenderJob, Renderer};
pub use session::{BuildReport, BuildSession};
pub use sources::scan_sources;
