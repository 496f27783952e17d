//! Cached execution of code block sequences.
//!
//! Each file's blocks run as one sequence in a shared session. The executed
//! notebook is stored under `<aggregate key>.ipynb` in a write-once artifact
//! store, so an unchanged sequence is never run again.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use weft_cache::{ArtifactStore, ArtifactStoreExt};

use crate::block::{CodeBlock, aggregate_key};
use crate::engine::{ExecError, ExecutionEngine};
use crate::html::outputs_to_html;
use crate::notebook::{CellOutputs, Notebook, Output};

/// Message placed on blocks after a failing block.
pub const NOT_EXECUTED: &str = "previous step failed\n";

/// Rendered outputs keyed by `(file, 1-based index)`.
pub type RenderedOutputs = BTreeMap<(String, usize), String>;

/// Summary of one [`CodeExecutor::execute_code_blocks`] call.
#[derive(Debug, Default)]
pub struct ExecutionSummary {
    /// Rendered HTML per block.
    pub outputs: RenderedOutputs,
    /// Files whose sequence was run by the engine.
    pub executed_files: Vec<String>,
    /// Files served from the artifact store.
    pub cache_hits: Vec<String>,
}

/// Runs code block sequences through an [`ExecutionEngine`], consulting the
/// artifact store first.
pub struct CodeExecutor {
    engine: Box<dyn ExecutionEngine>,
    store: Box<dyn ArtifactStore>,
    project_root: PathBuf,
    kernel: String,
    timeout: Duration,
}

impl CodeExecutor {
    /// Create an executor.
    ///
    /// Sequences run with the directory of their source file (under
    /// `project_root`) as the working directory.
    #[must_use]
    pub fn new(
        engine: Box<dyn ExecutionEngine>,
        store: Box<dyn ArtifactStore>,
        project_root: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            project_root,
            kernel: "python3".to_owned(),
            timeout,
        }
    }

    /// Kernel name recorded in stored notebooks.
    #[must_use]
    pub fn with_kernel(mut self, kernel: impl Into<String>) -> Self {
        self.kernel = kernel.into();
        self
    }

    /// Whether the sequence `blocks` has a stored result.
    #[must_use]
    pub fn is_cached(&self, blocks: &[CodeBlock]) -> bool {
        blocks.is_empty()
            || self
                .store
                .contains(&format!("{}.ipynb", aggregate_key(blocks)))
    }

    /// Execute every file's block sequence, reusing stored results.
    ///
    /// Never fails: engine errors degrade the affected sequence's outputs.
    pub fn execute_code_blocks(
        &self,
        blocks_by_file: &BTreeMap<String, Vec<CodeBlock>>,
    ) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();
        for (file, blocks) in blocks_by_file {
            if blocks.is_empty() {
                continue;
            }
            let key = format!("{}.ipynb", aggregate_key(blocks));
            let outputs = match self.load(&key, blocks.len()) {
                Some(outputs) => {
                    tracing::debug!(file = %file, key = %key, "execution cache hit");
                    summary.cache_hits.push(file.clone());
                    outputs
                }
                None => {
                    tracing::info!(file = %file, key = %key, "executing code blocks");
                    summary.executed_files.push(file.clone());
                    self.run(file, &key, blocks)
                }
            };
            for (block, cell) in blocks.iter().zip(&outputs) {
                summary
                    .outputs
                    .insert((file.clone(), block.index), outputs_to_html(cell));
            }
        }
        summary
    }

    /// Stored outputs for `key`, if present and shaped like the sequence.
    fn load(&self, key: &str, expected: usize) -> Option<Vec<CellOutputs>> {
        let notebook: Notebook = self.store.load_json(key)?;
        let outputs = notebook.code_outputs();
        if outputs.len() == expected {
            Some(outputs)
        } else {
            tracing::warn!(key, "stored notebook does not match block sequence, re-executing");
            None
        }
    }

    fn run(&self, file: &str, key: &str, blocks: &[CodeBlock]) -> Vec<CellOutputs> {
        let sources: Vec<String> = blocks.iter().map(|b| b.source.clone()).collect();
        let working_dir = match std::path::Path::new(file).parent() {
            Some(parent) => self.project_root.join(parent),
            None => self.project_root.clone(),
        };

        let start = Instant::now();
        let result = self
            .engine
            .execute(&sources, &working_dir, self.timeout)
            .and_then(|outputs| check_cell_count(outputs, sources.len()));
        match result {
            Ok(outputs) => {
                let outputs = apply_sticky_failure(outputs);
                let mut notebook = Notebook::from_sources(&sources, &self.kernel);
                for (cell, cell_outputs) in notebook.cells.iter_mut().zip(&outputs) {
                    cell.outputs.clone_from(cell_outputs);
                }
                if let Err(e) = self.store.store_json(key, &notebook) {
                    tracing::warn!(file, error = %e, "failed to store executed notebook");
                }
                tracing::info!(
                    file,
                    elapsed_ms = start.elapsed().as_millis(),
                    "code blocks executed"
                );
                outputs
            }
            // Not stored: the next build retries.
            Err(e) => {
                tracing::warn!(file, error = %e, "execution engine failed");
                engine_failure(&e.to_string(), blocks.len())
            }
        }
    }
}

/// Engines must return one output list per block.
fn check_cell_count(
    outputs: Vec<CellOutputs>,
    expected: usize,
) -> Result<Vec<CellOutputs>, ExecError> {
    if outputs.len() == expected {
        Ok(outputs)
    } else {
        Err(ExecError::Notebook(format!(
            "expected {expected} code cells, found {}",
            outputs.len()
        )))
    }
}

/// Replace outputs after the first failing block with a not-executed notice.
#[must_use]
pub fn apply_sticky_failure(mut outputs: Vec<CellOutputs>) -> Vec<CellOutputs> {
    if let Some(failed) = outputs
        .iter()
        .position(|cell| cell.iter().any(Output::is_error))
    {
        for cell in outputs.iter_mut().skip(failed + 1) {
            *cell = vec![Output::stderr(NOT_EXECUTED)];
        }
    }
    outputs
}

/// Outputs for a sequence the engine could not run at all.
fn engine_failure(message: &str, len: usize) -> Vec<CellOutputs> {
    (0..len)
        .map(|i| {
            if i == 0 {
                vec![Output::error("ExecutionError", message)]
            } else {
                vec![Output::stderr(NOT_EXECUTED)]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;
    use std::path::Path;
    use weft_cache::{Cache, FileCache, NullCache};

    fn blocks(file: &str, sources: &[&str]) -> BTreeMap<String, Vec<CodeBlock>> {
        BTreeMap::from([(
            file.to_owned(),
            CodeBlock::sequence(file, sources.iter().copied()),
        )])
    }

    fn executor(engine: MockEngine, cache: &dyn Cache, root: PathBuf) -> CodeExecutor {
        CodeExecutor::new(
            Box::new(engine),
            cache.artifacts("notebooks"),
            root,
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_second_run_served_from_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("_nbcache"));
        let engine = MockEngine::new();
        let calls = engine.calls();

        let input = blocks("a.qmd", &["x = 1", "print(x)"]);
        let first = executor(engine.clone(), &cache, tmp.path().to_path_buf())
            .execute_code_blocks(&input);
        let second = executor(engine, &cache, tmp.path().to_path_buf())
            .execute_code_blocks(&input);

        assert_eq!(calls.count(), 1);
        assert_eq!(first.executed_files, vec!["a.qmd"]);
        assert_eq!(second.cache_hits, vec!["a.qmd"]);
        assert_eq!(first.outputs, second.outputs);
        assert_eq!(
            second.outputs.get(&("a.qmd".to_owned(), 2)).map(String::as_str),
            Some("<pre>print(x)\n</pre>")
        );
    }

    #[test]
    fn test_is_cached_after_execution() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("_nbcache"));
        let exec = executor(MockEngine::new(), &cache, tmp.path().to_path_buf());
        let input = blocks("a.qmd", &["x = 1"]);

        assert!(!exec.is_cached(&input["a.qmd"]));
        assert!(exec.is_cached(&[]));
        exec.execute_code_blocks(&input);
        assert!(exec.is_cached(&input["a.qmd"]));
    }

    #[test]
    fn test_artifact_stored_under_aggregate_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("_nbcache"));
        let input = blocks("a.qmd", &["x = 1"]);
        let key = aggregate_key(&input["a.qmd"]);

        executor(MockEngine::new(), &cache, tmp.path().to_path_buf())
            .execute_code_blocks(&input);

        let path = tmp.path().join(format!("_nbcache/notebooks/{key}.ipynb"));
        let stored: Notebook =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(stored.cells.len(), 1);
        assert_eq!(stored.cells[0].source.text(), "x = 1");
    }

    #[test]
    fn test_editing_first_block_reexecutes_whole_sequence() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("_nbcache"));
        let engine = MockEngine::new();
        let calls = engine.calls();

        executor(engine.clone(), &cache, tmp.path().to_path_buf())
            .execute_code_blocks(&blocks("a.qmd", &["x = 1", "print(x)"]));
        executor(engine, &cache, tmp.path().to_path_buf())
            .execute_code_blocks(&blocks("a.qmd", &["x = 2", "print(x)"]));

        assert_eq!(calls.count(), 2);
        assert_eq!(
            calls.last(),
            Some(vec!["x = 2".to_owned(), "print(x)".to_owned()])
        );
    }

    #[test]
    fn test_failure_is_sticky() {
        let tmp = tempfile::TempDir::new().unwrap();
        let engine = MockEngine::new().fail_on("raise ValueError()");
        let summary = executor(engine, &NullCache, tmp.path().to_path_buf())
            .execute_code_blocks(&blocks("a.qmd", &["a = 1", "raise ValueError()", "a"]));

        let out = |i: usize| summary.outputs[&("a.qmd".to_owned(), i)].clone();
        assert_eq!(out(1), "<pre>a = 1\n</pre>");
        assert!(out(2).contains("color:red"));
        assert_eq!(out(3), "<pre>previous step failed\n</pre>");
    }

    #[test]
    fn test_engine_failure_marks_all_blocks() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("_nbcache"));
        let engine = MockEngine::new().with_engine_error(|| ExecError::Timeout(Duration::from_secs(1)));
        let calls = engine.calls();
        let input = blocks("sub/a.qmd", &["a", "b"]);

        let summary = executor(engine.clone(), &cache, tmp.path().to_path_buf())
            .execute_code_blocks(&input);
        assert!(summary.outputs[&("sub/a.qmd".to_owned(), 1)].contains("timed out"));
        assert_eq!(
            summary.outputs[&("sub/a.qmd".to_owned(), 2)],
            "<pre>previous step failed\n</pre>"
        );

        // Engine failures are retried on the next run
        executor(engine, &cache, tmp.path().to_path_buf()).execute_code_blocks(&input);
        assert_eq!(calls.count(), 2);
        assert_eq!(calls.last_dir(), Some(tmp.path().join("sub")));
    }

    /// Engine that returns outputs for the first block only.
    struct ShortEngine;

    impl ExecutionEngine for ShortEngine {
        fn execute(
            &self,
            _sources: &[String],
            _working_dir: &Path,
            _timeout: Duration,
        ) -> Result<Vec<CellOutputs>, ExecError> {
            Ok(vec![vec![Output::stderr("only one\n")]])
        }
    }

    #[test]
    fn test_short_engine_output_is_a_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(tmp.path().join("_nbcache"));
        let input = blocks("a.qmd", &["a", "b", "c"]);
        let executor = CodeExecutor::new(
            Box::new(ShortEngine),
            cache.artifacts("notebooks"),
            tmp.path().to_path_buf(),
            Duration::from_secs(10),
        );
        let summary = executor.execute_code_blocks(&input);

        let out = |i: usize| summary.outputs[&("a.qmd".to_owned(), i)].clone();
        assert!(out(1).contains("expected 3 code cells, found 1"));
        assert_eq!(out(2), "<pre>previous step failed\n</pre>");
        assert_eq!(out(3), "<pre>previous step failed\n</pre>");
        assert!(!executor.is_cached(&input["a.qmd"]));
    }

    #[test]
    fn test_apply_sticky_failure_without_errors() {
        let outputs = vec![vec![Output::stderr("a")], vec![]];
        assert_eq!(apply_sticky_failure(outputs.clone()), outputs);
    }
}
