//! Mock execution engine for testing.
//!
//! Provides [`MockEngine`] for exercising the execution cache without a
//! Jupyter installation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::{ExecError, ExecutionEngine};
use crate::notebook::{CellOutputs, Output};

#[derive(Debug, Default)]
struct CallLog {
    sequences: Vec<Vec<String>>,
    dirs: Vec<PathBuf>,
}

/// Shared view of the invocations received by a [`MockEngine`].
#[derive(Debug, Clone, Default)]
pub struct MockCalls(Arc<Mutex<CallLog>>);

impl MockCalls {
    /// Number of `execute` calls.
    pub fn count(&self) -> usize {
        self.0.lock().unwrap().sequences.len()
    }

    /// Sources of the latest call.
    pub fn last(&self) -> Option<Vec<String>> {
        self.0.lock().unwrap().sequences.last().cloned()
    }

    /// Working directory of the latest call.
    pub fn last_dir(&self) -> Option<PathBuf> {
        self.0.lock().unwrap().dirs.last().cloned()
    }
}

/// Mock execution engine.
///
/// Each block "prints" its own source to stdout. Blocks listed with
/// [`MockEngine::fail_on`] produce an error output instead, and
/// [`MockEngine::with_engine_error`] makes every call fail at engine level.
/// Clones share one call log.
///
/// # Example
///
/// ```ignore
/// use weft_exec::MockEngine;
///
/// let engine = MockEngine::new().fail_on("1 / 0");
/// let calls = engine.calls();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    calls: MockCalls,
    failing: Vec<String>,
    engine_error: Option<fn() -> ExecError>,
}

impl MockEngine {
    /// Create a mock engine that echoes every block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the block with exactly `source` raise.
    #[must_use]
    pub fn fail_on(mut self, source: &str) -> Self {
        self.failing.push(source.to_owned());
        self
    }

    /// Fail every call with the error produced by `make`.
    #[must_use]
    pub fn with_engine_error(mut self, make: fn() -> ExecError) -> Self {
        self.engine_error = Some(make);
        self
    }

    /// Handle on the call log.
    #[must_use]
    pub fn calls(&self) -> MockCalls {
        self.calls.clone()
    }
}

impl ExecutionEngine for MockEngine {
    fn execute(
        &self,
        sources: &[String],
        working_dir: &Path,
        _timeout: Duration,
    ) -> Result<Vec<CellOutputs>, ExecError> {
        {
            let mut log = self.calls.0.lock().unwrap();
            log.sequences.push(sources.to_vec());
            log.dirs.push(working_dir.to_path_buf());
        }
        if let Some(make) = self.engine_error {
            return Err(make());
        }
        Ok(sources
            .iter()
            .map(|source| {
                if self.failing.contains(source) {
                    vec![Output::error("Exception", source)]
                } else {
                    vec![Output::Stream {
                        name: "stdout".to_owned(),
                        text: format!("{source}\n").as_str().into(),
                    }]
                }
            })
            .collect())
    }
}
