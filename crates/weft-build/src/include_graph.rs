//! Transclusion graph discovery.
//!
//! Starting from the declared roots, every include directive is resolved to
//! a project file and followed depth-first. Each file remembers the directory
//! of the root that first reached it; later references inside that file are
//! resolved against it:
//!
//! 1. `parent(file)/ref`
//! 2. `root_dir/ref`
//! 3. `parent(root_dir)/ref`
//!
//! The first existing candidate wins. A directive with no existing candidate
//! aborts the analysis.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BuildError, io_err};
use crate::paths;

static INCLUDE_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*<\s*(include|embed)\s+([^>\s]+)\s*>\s*\}\}").unwrap()
});

/// Kind of transclusion directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// `{{< include path >}}`
    Include,
    /// `{{< embed path >}}`
    Embed,
}

impl IncludeKind {
    /// Attribute suffix used in placeholders.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Embed => "embed",
        }
    }
}

/// One include directive as written in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Directive kind.
    pub kind: IncludeKind,
    /// Path as written.
    pub reference: String,
}

/// Include directives of `text`, in order.
pub fn parse_directives(text: &str) -> Vec<Directive> {
    INCLUDE_DIRECTIVE
        .captures_iter(text)
        .map(|caps| Directive {
            kind: if caps[1].eq_ignore_ascii_case("embed") {
                IncludeKind::Embed
            } else {
                IncludeKind::Include
            },
            reference: caps[2].to_owned(),
        })
        .collect()
}

/// Replace every include directive in `text` via `replace`.
pub(crate) fn replace_directives<F>(text: &str, mut replace: F) -> Result<String, BuildError>
where
    F: FnMut(IncludeKind, &str) -> Result<String, BuildError>,
{
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for caps in INCLUDE_DIRECTIVE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let kind = if caps[1].eq_ignore_ascii_case("embed") {
            IncludeKind::Embed
        } else {
            IncludeKind::Include
        };
        result.push_str(&text[last..whole.start()]);
        result.push_str(&replace(kind, &caps[2])?);
        last = whole.end();
    }
    result.push_str(&text[last..]);
    Ok(result)
}

/// Resolve `reference` found in `file`, whose root directory is `root_dir`.
///
/// Candidates that would leave the project are skipped.
pub fn resolve_reference(
    project_root: &Path,
    file: &str,
    root_dir: &str,
    reference: &str,
) -> Option<String> {
    [paths::parent(file), root_dir, paths::parent(root_dir)]
        .into_iter()
        .filter_map(|dir| paths::join(dir, reference))
        .find(|candidate| project_root.join(candidate).is_file())
}

/// Forward and reverse include adjacency over the files reachable from the
/// declared roots.
#[derive(Debug, Default, Clone)]
pub struct IncludeGraph {
    roots: Vec<String>,
    forward: HashMap<String, Vec<String>>,
    reverse: HashMap<String, Vec<String>>,
    root_dirs: HashMap<String, String>,
    cycles: Vec<Vec<String>>,
}

impl IncludeGraph {
    /// Declared roots that exist, in declaration order.
    #[must_use]
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Whether `file` is a declared root.
    #[must_use]
    pub fn is_root(&self, file: &str) -> bool {
        self.roots.iter().any(|r| r == file)
    }

    /// Files directly included by `file`, in directive order.
    #[must_use]
    pub fn includes(&self, file: &str) -> &[String] {
        self.forward.get(file).map_or(&[], Vec::as_slice)
    }

    /// Files that directly include `file`, first discovered first.
    #[must_use]
    pub fn includers(&self, file: &str) -> &[String] {
        self.reverse.get(file).map_or(&[], Vec::as_slice)
    }

    /// Directory of the root that first reached `file`.
    #[must_use]
    pub fn root_dir<'a>(&'a self, file: &'a str) -> &'a str {
        self.root_dirs
            .get(file)
            .map_or_else(|| paths::parent(file), String::as_str)
    }

    /// Whether `file` is reachable from a declared root.
    #[must_use]
    pub fn contains(&self, file: &str) -> bool {
        self.forward.contains_key(file)
    }

    /// Include cycles found during analysis, each closed on its first file.
    #[must_use]
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// The root whose page displays `file`.
    ///
    /// Follows the first includer of each file until a declared root is
    /// reached. Stops at a file with no includer, or when the walk loops.
    #[must_use]
    pub fn owning_root<'a>(&'a self, file: &'a str) -> &'a str {
        let mut current = file;
        let mut seen = HashSet::new();
        while !self.is_root(current) {
            if !seen.insert(current) {
                break;
            }
            match self.includers(current).first() {
                Some(parent) => current = parent.as_str(),
                None => break,
            }
        }
        current
    }
}

/// Build the include graph for `roots`.
///
/// Missing roots are skipped with a warning. Cycles are recorded and logged;
/// a file already on the traversal stack is not entered again.
pub fn analyze_includes(project_root: &Path, roots: &[String]) -> Result<IncludeGraph, BuildError> {
    let mut analyzer = Analyzer {
        project_root,
        graph: IncludeGraph::default(),
        visited: HashSet::new(),
        stack: Vec::new(),
    };

    for root in roots {
        if !project_root.join(root).is_file() {
            tracing::warn!(file = %root, "declared root not found, skipping");
            continue;
        }
        if !analyzer.graph.is_root(root) {
            analyzer.graph.roots.push(root.clone());
            analyzer
                .graph
                .root_dirs
                .insert(root.clone(), paths::parent(root).to_owned());
        }
    }

    for root in analyzer.graph.roots.clone() {
        analyzer.visit(&root)?;
    }

    tracing::debug!(
        roots = analyzer.graph.roots.len(),
        files = analyzer.graph.forward.len(),
        cycles = analyzer.graph.cycles.len(),
        "include graph analyzed"
    );
    Ok(analyzer.graph)
}

struct Analyzer<'a> {
    project_root: &'a Path,
    graph: IncludeGraph,
    visited: HashSet<String>,
    stack: Vec<String>,
}

impl Analyzer<'_> {
    fn visit(&mut self, file: &str) -> Result<(), BuildError> {
        if let Some(pos) = self.stack.iter().position(|f| f == file) {
            let mut cycle = self.stack[pos..].to_vec();
            cycle.push(file.to_owned());
            tracing::warn!(cycle = %cycle.join(" -> "), "include cycle detected");
            self.graph.cycles.push(cycle);
            return Ok(());
        }
        if !self.visited.insert(file.to_owned()) {
            return Ok(());
        }

        let path = self.project_root.join(file);
        let text = std::fs::read_to_string(&path).map_err(io_err(&path))?;
        let root_dir = self.graph.root_dir(file).to_owned();

        self.graph.forward.entry(file.to_owned()).or_default();
        self.stack.push(file.to_owned());
        for directive in parse_directives(&text) {
            let target =
                resolve_reference(self.project_root, file, &root_dir, &directive.reference)
                    .ok_or_else(|| BuildError::MissingInclude {
                        file: file.to_owned(),
                        reference: directive.reference.clone(),
                    })?;

            let children = self.graph.forward.entry(file.to_owned()).or_default();
            if !children.contains(&target) {
                children.push(target.clone());
            }
            let parents = self.graph.reverse.entry(target.clone()).or_default();
            if !parents.iter().any(|p| p == file) {
                parents.push(file.to_owned());
            }
            self.graph
                .root_dirs
                .entry(target.clone())
                .or_insert_with(|| root_dir.clone());

            self.visit(&target)?;
        }
        self.stack.pop();
        Ok(())
    }
}
