//! Cached execution of embedded code blocks.
//!
//! Source files may contain executable blocks. Each file's blocks form one
//! sequence that runs in a shared session, identified by a hash chain over
//! the blocks' contents (see [`block`]). Results are stored as executed
//! notebooks in a write-once [`weft_cache::ArtifactStore`], so a sequence is
//! executed again only when it, or something before it, changes.
//!
//! # Components
//!
//! - [`CodeBlock`] and [`HashChain`]: block identity
//! - [`ExecutionEngine`]: boundary to the code runner, with [`JupyterEngine`]
//! - [`CodeExecutor`]: cache lookup, execution, sticky failure handling
//! - [`outputs_to_html`] / [`cell_html`]: embeddable markup
//! - [`MockEngine`] for testing (behind `mock` feature flag)

pub mod block;
mod engine;
mod executor;
mod html;
#[cfg(any(test, feature = "mock"))]
mod mock;
pub mod notebook;

pub use block::{CodeBlock, HashChain, aggregate_key, sha256_hex};
pub use engine::{ExecError, ExecutionEngine, JupyterEngine};
pub use executor::{
    CodeExecutor, ExecutionSummary, NOT_EXECUTED, RenderedOutputs, apply_sticky_failure,
};
pub use html::{cell_html, escape_html, outputs_to_html};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockCalls, MockEngine};
pub use notebook::{CellOutputs, Notebook, Output};
