//! Build session: one configured pipeline, invoked once per build.
//!
//! A build runs these phases in order:
//!
//! 1. read the manifest and analyze the include graph (aborts on a missing
//!    include before anything is written);
//! 2. index anchors over every source file;
//! 3. plan the affected roots and their dependencies;
//! 4. mirror each planned file into the build directory;
//! 5. execute code blocks of the files to render;
//! 6. render, then substitute code placeholders in the staged HTML;
//! 7. assemble display pages and refresh navigation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use ignore::WalkBuilder;
use weft_cache::{Cache, CacheBucket, FileCache};
use weft_config::{BuildPaths, Config, Manifest, MathMode};
use weft_exec::{CodeBlock, CodeExecutor, ExecutionSummary, JupyterEngine, sha256_hex};

use crate::anchors::collect_anchors;
use crate::assemble::{Assembler, substitute_code};
use crate::error::{BuildError, io_err};
use crate::include_graph::analyze_includes;
use crate::mirror::Mirror;
use crate::navigation::{NavPage, inject_navigation, read_title};
use crate::paths;
use crate::planner::{affected_roots, plan};
use crate::render::{MATHJAX_SCRIPT, PandocRenderer, RenderJob, Renderer};
use crate::sources::scan_sources;

/// Outcome of one build.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Roots whose display pages were assembled this build.
    pub roots: Vec<String>,
    /// Files rendered, in render order.
    pub rendered: Vec<String>,
    /// Display pages written because their content changed.
    pub assembled: Vec<String>,
    /// Files whose code blocks ran through the execution engine.
    pub executed_files: Vec<String>,
    /// Files whose code outputs came from the cache.
    pub cache_hits: Vec<String>,
    /// Unresolved cross-reference tokens, deduplicated.
    pub dangling_refs: Vec<String>,
    /// Include cycles detected in the graph.
    pub cycles: Vec<Vec<String>>,
}

impl BuildReport {
    /// Whether the build touched nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.roots.is_empty() && self.rendered.is_empty() && self.assembled.is_empty()
    }
}

/// A configured build pipeline.
///
/// Holds the renderer, the optional code executor and the stamp bucket. The
/// include graph and anchor index are recomputed by every [`build`] call.
///
/// [`build`]: BuildSession::build
pub struct BuildSession {
    root: PathBuf,
    manifest_path: PathBuf,
    extension: String,
    paths: BuildPaths,
    math: MathMode,
    mathjax_dir: Option<PathBuf>,
    renderer: Box<dyn Renderer>,
    executor: Option<CodeExecutor>,
    stamps: Box<dyn CacheBucket>,
}

impl BuildSession {
    /// Create a session with explicit collaborators.
    ///
    /// `executor` is `None` when code execution is disabled.
    #[must_use]
    pub fn new(
        config: &Config,
        renderer: Box<dyn Renderer>,
        executor: Option<CodeExecutor>,
        cache: &dyn Cache,
    ) -> Self {
        let root = config
            .root
            .canonicalize()
            .unwrap_or_else(|_| config.root.clone());
        let rebase = |dir: &Path| match dir.strip_prefix(&config.root) {
            Ok(rel) => root.join(rel),
            Err(_) => dir.to_path_buf(),
        };
        let paths = BuildPaths {
            build_dir: rebase(&config.paths.build_dir),
            display_dir: rebase(&config.paths.display_dir),
            cache_dir: rebase(&config.paths.cache_dir),
        };

        Self {
            manifest_path: root.join(&config.project.manifest),
            root,
            extension: config.project.extension.clone(),
            paths,
            math: config.render_resolved.math,
            mathjax_dir: config.render_resolved.mathjax_dir.clone(),
            renderer,
            executor,
            stamps: cache.bucket("stamps"),
        }
    }

    /// Create a session rendering with pandoc and executing with Jupyter.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let cache = FileCache::new(config.paths.cache_dir.clone());
        let executor = config.execute.enabled.then(|| {
            let engine = JupyterEngine::new(&config.execute.jupyter, &config.execute.kernel);
            CodeExecutor::new(
                Box::new(engine),
                cache.artifacts("notebooks"),
                config.root.clone(),
                config.execute.timeout(),
            )
            .with_kernel(&config.execute.kernel)
        });
        let renderer = PandocRenderer::new(config.render_resolved.clone());
        Self::new(config, Box::new(renderer), executor, &cache)
    }

    /// Project root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Output and cache directories.
    #[must_use]
    pub fn paths(&self) -> &BuildPaths {
        &self.paths
    }

    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Source file extension, without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Build the roots affected by `changed`, or every root when `None`.
    ///
    /// Changed paths may be absolute or relative to the current directory,
    /// and may name deleted files. Paths outside the project or in a
    /// generated directory, or without the source extension, are ignored;
    /// when none remain the build does nothing. A changed manifest triggers
    /// a full build.
    ///
    /// # Errors
    ///
    /// Fails on a missing include target, a renderer failure, a missing
    /// citation resource, an unreadable manifest or a filesystem error.
    pub fn build(&self, changed: Option<&[PathBuf]>) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let changed = match changed {
            Some(changed) if changed.iter().any(|p| self.is_manifest(p)) => {
                tracing::info!("manifest changed, rebuilding everything");
                None
            }
            Some(changed) => {
                let relevant = self.normalize_changed(changed);
                if relevant.is_empty() {
                    tracing::debug!("no relevant changes");
                    return Ok(BuildReport::default());
                }
                Some(relevant)
            }
            None => None,
        };

        let manifest = Manifest::load(&self.manifest_path, &self.root)?;
        let graph = analyze_includes(&self.root, &manifest.roots)?;
        let sources = scan_sources(&self.root, &self.extension, &self.generated_dirs());
        let anchors = collect_anchors(&self.root, &sources, &graph)?;

        let roots = affected_roots(changed.as_deref(), &graph);
        let plan = plan(&roots, &graph);
        let mut report = BuildReport {
            roots: roots.clone(),
            cycles: graph.cycles().to_vec(),
            ..BuildReport::default()
        };
        if roots.is_empty() {
            tracing::debug!("changes reach no declared root");
            return Ok(report);
        }

        for dir in [&self.paths.build_dir, &self.paths.display_dir] {
            std::fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
        let local_mathjax = self.local_mathjax();
        if local_mathjax {
            self.copy_mathjax()?;
        }

        // Stage
        let mirror = Mirror::new(&self.root, &self.paths.build_dir, &graph, &anchors);
        let mut dangling = BTreeSet::new();
        let mut blocks_by_file: BTreeMap<String, Vec<CodeBlock>> = BTreeMap::new();
        let mut to_render = Vec::new();
        for file in &plan.order {
            let mirrored = mirror.mirror_file(file)?;
            dangling.extend(mirrored.dangling);
            let stamp = self.stamp(&mirrored.text, !graph.is_root(file), &manifest);
            if changed.is_some() || self.is_stale(file, &stamp, &mirrored.blocks) {
                to_render.push((file.clone(), stamp));
                if !mirrored.blocks.is_empty() {
                    blocks_by_file.insert(file.clone(), mirrored.blocks);
                }
            }
        }
        report.dangling_refs = dangling.into_iter().collect();

        // Execute
        let summary = match &self.executor {
            Some(executor) if !blocks_by_file.is_empty() => {
                executor.execute_code_blocks(&blocks_by_file)
            }
            _ => ExecutionSummary::default(),
        };
        let outputs = self.executor.as_ref().map(|_| &summary.outputs);

        // Render
        for (file, stamp) in &to_render {
            let job = RenderJob {
                file: file.clone(),
                input: self.paths.build_dir.join(file),
                output: self.paths.build_dir.join(paths::html_path(file)),
                fragment: !graph.is_root(file),
                bibliography: manifest.bibliography.clone(),
                csl: manifest.csl.clone(),
                mathjax: local_mathjax.then(|| self.paths.display_dir.join(MATHJAX_SCRIPT)),
            };
            self.renderer.render(&job)?;

            if blocks_by_file.contains_key(file) {
                let html = std::fs::read_to_string(&job.output).map_err(io_err(&job.output))?;
                let html = substitute_code(&html, &blocks_by_file, outputs);
                std::fs::write(&job.output, html).map_err(io_err(&job.output))?;
            }
            self.stamps.set(file, stamp, stamp.as_bytes());
            report.rendered.push(file.clone());
        }
        report.executed_files = summary.executed_files;
        report.cache_hits = summary.cache_hits;

        // Assemble
        let assembler = Assembler::new(&self.paths.build_dir, local_mathjax);
        let mut pages = BTreeMap::new();
        for root in &roots {
            let page = paths::html_path(root);
            if !self.paths.build_dir.join(&page).is_file() {
                tracing::warn!(root = %root, "no staged page to assemble");
                continue;
            }
            pages.insert(root.clone(), assembler.assemble(&page)?);
        }
        report.assembled = self.write_display_pages(graph.roots(), pages)?;

        tracing::info!(
            roots = report.roots.len(),
            rendered = report.rendered.len(),
            assembled = report.assembled.len(),
            executed = report.executed_files.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "build finished"
        );
        Ok(report)
    }

    /// Inject navigation into the assembled `pages` and every other existing
    /// display page, writing only pages whose bytes change.
    fn write_display_pages(
        &self,
        roots: &[String],
        mut pages: BTreeMap<String, String>,
    ) -> Result<Vec<String>, BuildError> {
        let display = |root: &str| self.paths.display_dir.join(paths::html_path(root));

        let mut nav = Vec::new();
        for root in roots {
            if !pages.contains_key(root) && !display(root).is_file() {
                continue;
            }
            let source = self.root.join(root);
            let text = std::fs::read_to_string(&source).map_err(io_err(&source))?;
            nav.push(NavPage {
                file: root.clone(),
                title: read_title(&text, root),
            });
        }

        let mut written = Vec::new();
        for entry in &nav {
            let path = display(&entry.file);
            let existing = std::fs::read_to_string(&path).ok();
            let html = match pages.remove(&entry.file) {
                Some(html) => html,
                None => match &existing {
                    Some(html) => html.clone(),
                    None => continue,
                },
            };
            let html = inject_navigation(&html, &paths::html_path(&entry.file), &nav);
            if existing.as_deref() == Some(html.as_str()) {
                continue;
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
            std::fs::write(&path, html).map_err(io_err(&path))?;
            written.push(entry.file.clone());
        }
        Ok(written)
    }

    fn stamp(&self, text: &str, fragment: bool, manifest: &Manifest) -> String {
        let resource = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
        sha256_hex(
            format!(
                "{text}\0{}\0{fragment}\0{}\0{:?}\0{:?}",
                self.renderer.fingerprint(),
                self.executor.is_some(),
                resource(&manifest.bibliography),
                resource(&manifest.csl),
            )
            .as_bytes(),
        )
    }

    fn is_stale(&self, file: &str, stamp: &str, blocks: &[CodeBlock]) -> bool {
        let html = self.paths.build_dir.join(paths::html_path(file));
        !html.is_file()
            || self.stamps.get(file, stamp).is_none()
            || self
                .executor
                .as_ref()
                .is_some_and(|executor| !executor.is_cached(blocks))
    }

    fn normalize_changed(&self, changed: &[PathBuf]) -> Vec<String> {
        let mut relevant: Vec<String> = changed
            .iter()
            .filter_map(|path| absolute(path))
            .filter(|path| !self.paths.is_generated(path))
            .filter(|path| path.extension().is_some_and(|ext| ext == self.extension.as_str()))
            .filter_map(|path| paths::to_relative(&self.root, &path))
            .collect();
        relevant.sort();
        relevant.dedup();
        relevant
    }

    fn is_manifest(&self, path: &Path) -> bool {
        path.canonicalize()
            .is_ok_and(|path| path == self.manifest_path)
    }

    fn generated_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.paths.build_dir.clone(),
            self.paths.display_dir.clone(),
            self.paths.cache_dir.clone(),
        ]
    }

    fn local_mathjax(&self) -> bool {
        self.math == MathMode::Mathjax && self.mathjax_dir.is_some()
    }

    /// Copy the configured `MathJax` tree into the display directory.
    ///
    /// Files already present with the same size are skipped.
    fn copy_mathjax(&self) -> Result<(), BuildError> {
        let Some(from) = &self.mathjax_dir else {
            return Ok(());
        };
        if !from.is_dir() {
            return Err(BuildError::MissingResource {
                kind: "MathJax",
                path: from.clone(),
            });
        }
        let to = self.paths.display_dir.join(paths::parent(MATHJAX_SCRIPT));
        let walker = WalkBuilder::new(from).standard_filters(false).build();
        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(from) else {
                continue;
            };
            let dest = to.join(rel);
            let same_size = match (entry.metadata(), dest.metadata()) {
                (Ok(a), Ok(b)) => a.len() == b.len(),
                _ => false,
            };
            if same_size {
                continue;
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
            std::fs::copy(entry.path(), &dest).map_err(io_err(entry.path()))?;
        }
        Ok(())
    }
}

/// Absolute, symlink-free form of `path`, which may no longer exist.
///
/// A deleted file is located through its nearest existing ancestor so it
/// still maps onto the project tree.
fn absolute(path: &Path) -> Option<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    let mut missing = Vec::new();
    let mut base = path.as_path();
    loop {
        if let Ok(mut found) = base.canonicalize() {
            found.extend(missing.iter().rev());
            return Some(found);
        }
        missing.push(base.file_name()?);
        base = base.parent()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRenderer, project};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use weft_exec::{MockCalls, MockEngine};

    struct Harness {
        tmp: tempfile::TempDir,
        config: Config,
        renderer: FakeRenderer,
        engine: MockEngine,
    }

    impl Harness {
        fn new(manifest_roots: &[&str], files: &[(&str, &str)]) -> Self {
            let mut manifest = String::from("project:\n  render:\n");
            for root in manifest_roots {
                manifest.push_str(&format!("    - {root}\n"));
            }
            let mut all = vec![("_quarto.yml", manifest.as_str())];
            all.extend_from_slice(files);
            let tmp = project(&all);
            let config = Config::default_with_base(tmp.path());
            Self {
                tmp,
                config,
                renderer: FakeRenderer::default(),
                engine: MockEngine::new(),
            }
        }

        fn session(&self) -> BuildSession {
            let cache = FileCache::new(self.config.paths.cache_dir.clone());
            let executor = self.config.execute.enabled.then(|| {
                CodeExecutor::new(
                    Box::new(self.engine.clone()),
                    cache.artifacts("notebooks"),
                    self.config.root.clone(),
                    Duration::from_secs(5),
                )
            });
            BuildSession::new(&self.config, Box::new(self.renderer.clone()), executor, &cache)
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.tmp.path().join(rel)
        }

        fn write(&self, rel: &str, text: &str) {
            std::fs::write(self.path(rel), text).unwrap();
        }

        fn display(&self, page: &str) -> String {
            std::fs::read_to_string(self.path("_display").join(page)).unwrap()
        }

        fn calls(&self) -> MockCalls {
            self.engine.calls()
        }
    }

    fn chain() -> Harness {
        Harness::new(
            &["r.qmd"],
            &[
                ("r.qmd", "# Root\n\nSee @sec:x.\n\n{{< include a.qmd >}}\n"),
                ("a.qmd", "A text\n\n{{< include b.qmd >}}\n"),
                ("b.qmd", "# Intro {#sec:x}\n\nB text\n"),
            ],
        )
    }

    #[test]
    fn test_reference_through_include_chain() {
        let h = chain();
        let report = h.session().build(None).unwrap();

        assert_eq!(report.roots, vec!["r.qmd"]);
        assert_eq!(report.rendered, vec!["b.qmd", "a.qmd", "r.qmd"]);
        assert_eq!(report.assembled, vec!["r.qmd"]);

        let page = h.display("r.html");
        assert!(page.contains("See [Intro](r.html#sec:x)."));
        assert!(page.contains("<!-- BEGIN include a.html -->"));
        assert!(page.contains("<!-- BEGIN include b.html -->"));
        assert!(page.contains("B text"));
        assert!(page.contains("<!-- BEGIN weft-nav -->"));
        assert!(!page.contains("data-include"));
    }

    #[test]
    fn test_rebuild_without_changes_is_idempotent() {
        let h = Harness::new(
            &["r.qmd"],
            &[("r.qmd", "# R\n\n```{python}\nx = 1\n```\n\n{{< include a.qmd >}}\n"), ("a.qmd", "a")],
        );
        let first = h.session().build(None).unwrap();
        let before = h.display("r.html");

        let second = h.session().build(None).unwrap();
        assert_eq!(first.executed_files, vec!["r.qmd"]);
        assert!(second.rendered.is_empty());
        assert!(second.assembled.is_empty());
        assert!(second.executed_files.is_empty());
        assert_eq!(h.calls().count(), 1);
        assert_eq!(h.display("r.html"), before);
    }

    #[test]
    fn test_leaf_change_leaves_other_root_identical() {
        let h = Harness::new(
            &["a.qmd", "b.qmd"],
            &[
                ("a.qmd", "# A\n\n{{< include leaf.qmd >}}\n"),
                ("b.qmd", "# B\n\nown text\n"),
                ("leaf.qmd", "old leaf\n"),
            ],
        );
        h.session().build(None).unwrap();
        let b_before = h.display("b.html");

        h.write("leaf.qmd", "new leaf\n");
        let report = h.session().build(Some(&[h.path("leaf.qmd")])).unwrap();

        assert_eq!(report.roots, vec!["a.qmd"]);
        assert_eq!(report.rendered, vec!["leaf.qmd", "a.qmd"]);
        assert_eq!(report.assembled, vec!["a.qmd"]);
        assert!(h.display("a.html").contains("new leaf"));
        assert_eq!(h.display("b.html"), b_before);
    }

    #[test]
    fn test_missing_include_leaves_no_output() {
        let h = Harness::new(&["r.qmd"], &[("r.qmd", "{{< include nowhere.qmd >}}")]);
        match h.session().build(None).unwrap_err() {
            BuildError::MissingInclude { file, reference } => {
                assert_eq!(file, "r.qmd");
                assert_eq!(reference, "nowhere.qmd");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!h.path("_build").exists());
        assert!(!h.path("_display").exists());
        assert!(h.renderer.calls().is_empty());
    }

    #[test]
    fn test_editing_first_block_reexecutes_sequence() {
        let h = Harness::new(
            &["r.qmd"],
            &[("r.qmd", "```{python}\nx = 1\n```\n\n```{python}\nprint(x)\n```\n")],
        );
        h.session().build(None).unwrap();
        h.write("r.qmd", "```{python}\nx = 2\n```\n\n```{python}\nprint(x)\n```\n");
        let report = h.session().build(Some(&[h.path("r.qmd")])).unwrap();

        assert_eq!(report.executed_files, vec!["r.qmd"]);
        assert_eq!(h.calls().count(), 2);
        assert_eq!(
            h.calls().last(),
            Some(vec!["x = 2\n".to_owned(), "print(x)\n".to_owned()])
        );
        let page = h.display("r.html");
        assert!(page.contains("<div class=\"cell-output\"><pre>x = 2\n\n</pre></div>"));
    }

    #[test]
    fn test_unreachable_change_is_noop() {
        let h = Harness::new(
            &["r.qmd"],
            &[("r.qmd", "root"), ("draft.qmd", "draft"), ("notes.txt", "x")],
        );
        h.session().build(None).unwrap();
        let renders = h.renderer.calls().len();

        let report = h.session().build(Some(&[h.path("draft.qmd")])).unwrap();
        assert!(report.is_noop());

        let report = h
            .session()
            .build(Some(&[h.path("notes.txt"), h.path("deleted.qmd")]))
            .unwrap();
        assert_eq!(report, BuildReport::default());
        assert_eq!(h.renderer.calls().len(), renders);
    }

    #[test]
    fn test_deleted_fragment_fails_incremental_build() {
        let h = Harness::new(
            &["r.qmd"],
            &[("r.qmd", "# R\n\n{{< include frag.qmd >}}\n"), ("frag.qmd", "fragment text\n")],
        );
        h.session().build(None).unwrap();
        assert!(h.display("r.html").contains("fragment text"));

        std::fs::remove_file(h.path("frag.qmd")).unwrap();
        match h.session().build(Some(&[h.path("frag.qmd")])).unwrap_err() {
            BuildError::MissingInclude { file, reference } => {
                assert_eq!(file, "r.qmd");
                assert_eq!(reference, "frag.qmd");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_deleted_fragment_with_directive_removed() {
        let h = Harness::new(
            &["r.qmd"],
            &[("r.qmd", "# R\n\n{{< include frag.qmd >}}\n"), ("frag.qmd", "fragment text\n")],
        );
        h.session().build(None).unwrap();

        std::fs::remove_file(h.path("frag.qmd")).unwrap();
        h.write("r.qmd", "# R\n");
        let report = h
            .session()
            .build(Some(&[h.path("frag.qmd"), h.path("r.qmd")]))
            .unwrap();
        assert_eq!(report.roots, vec!["r.qmd"]);
        assert!(!h.display("r.html").contains("fragment text"));
    }

    #[test]
    fn test_anchors_in_ignored_and_hidden_dirs_resolve() {
        let h = Harness::new(
            &["r.qmd"],
            &[
                (".gitignore", "gen/\n"),
                ("r.qmd", "See @sec:p and @sec:h.\n\n{{< include gen/part.qmd >}}\n\n{{< include .shared/frag.qmd >}}\n"),
                ("gen/part.qmd", "# Generated {#sec:p}\n"),
                (".shared/frag.qmd", "# Shared {#sec:h}\n"),
            ],
        );
        let report = h.session().build(None).unwrap();

        assert!(report.dangling_refs.is_empty(), "{:?}", report.dangling_refs);
        let page = h.display("r.html");
        assert!(page.contains("[Generated](r.html#sec:p)"));
        assert!(page.contains("[Shared](r.html#sec:h)"));
    }

    #[test]
    fn test_changed_root_rebuilds_only_itself() {
        let h = Harness::new(&["a.qmd", "b.qmd"], &[("a.qmd", "# A\n"), ("b.qmd", "# B\n")]);
        h.session().build(None).unwrap();
        let report = h.session().build(Some(&[h.path("b.qmd")])).unwrap();
        assert_eq!(report.roots, vec!["b.qmd"]);
        assert_eq!(report.rendered, vec!["b.qmd"]);
    }

    #[test]
    fn test_manifest_change_rebuilds_everything() {
        let h = Harness::new(&["a.qmd"], &[("a.qmd", "# A\n"), ("b.qmd", "# B\n")]);
        h.session().build(None).unwrap();
        h.write("_quarto.yml", "project:\n  render:\n    - a.qmd\n    - b.qmd\n");

        let report = h.session().build(Some(&[h.path("_quarto.yml")])).unwrap();
        assert_eq!(report.roots, vec!["a.qmd", "b.qmd"]);
        assert_eq!(report.rendered, vec!["b.qmd"]);
        assert!(h.display("a.html").contains("href=\"b.html\""));
    }

    #[test]
    fn test_render_failure_aborts_build() {
        let mut h = chain();
        h.renderer = FakeRenderer::failing_on("a.qmd");
        match h.session().build(None).unwrap_err() {
            BuildError::RenderTool { file, stderr, .. } => {
                assert_eq!(file, "a.qmd");
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!h.path("_display/r.html").exists());
    }

    #[test]
    fn test_execution_disabled_shows_source_only() {
        let mut h = Harness::new(&["r.qmd"], &[("r.qmd", "```{python}\n1 < 2\n```\n")]);
        h.config.execute.enabled = false;
        let report = h.session().build(None).unwrap();

        assert!(report.executed_files.is_empty());
        assert_eq!(h.calls().count(), 0);
        let page = h.display("r.html");
        assert!(page.contains("<code class=\"language-python\">1 &lt; 2\n</code>"));
        assert!(!page.contains("cell-output"));
    }

    #[test]
    fn test_fragments_rendered_as_fragments() {
        let h = chain();
        h.session().build(None).unwrap();
        let calls = h.renderer.calls();
        assert!(calls.contains(&("a.qmd".to_owned(), true)));
        assert!(calls.contains(&("r.qmd".to_owned(), false)));
    }

    #[test]
    fn test_cycle_reported_and_build_completes() {
        let h = Harness::new(
            &["r.qmd"],
            &[
                ("r.qmd", "{{< include a.qmd >}}"),
                ("a.qmd", "first part\n{{< include b.qmd >}}"),
                ("b.qmd", "second part\n{{< include a.qmd >}}"),
            ],
        );
        let report = h.session().build(None).unwrap();
        assert_eq!(report.cycles, vec![vec!["a.qmd", "b.qmd", "a.qmd"]]);
        let page = h.display("r.html");
        assert!(page.contains("first part"));
        assert!(page.contains("second part"));
        assert_eq!(page.matches("first part").count(), 1);
    }

    #[test]
    fn test_dangling_refs_reported() {
        let h = Harness::new(&["r.qmd"], &[("r.qmd", "See @fig:none and @fig:none.")]);
        let report = h.session().build(None).unwrap();
        assert_eq!(report.dangling_refs, vec!["@fig:none"]);
        assert!(h.display("r.html").contains("See @fig:none and @fig:none."));
    }

    #[test]
    fn test_local_mathjax_copied() {
        let mut h = Harness::new(
            &["r.qmd"],
            &[("r.qmd", "math"), ("vendor/mj/tex-mml-chtml.js", "// mathjax")],
        );
        h.config.render_resolved.mathjax_dir = Some(h.path("vendor/mj"));
        h.session().build(None).unwrap();
        assert_eq!(
            std::fs::read_to_string(h.path("_display/mathjax/tex-mml-chtml.js")).unwrap(),
            "// mathjax"
        );
    }
}
