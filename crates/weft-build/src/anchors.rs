//! Anchor index.
//!
//! Anchors are declared with `{#sec:id}`, `{#fig:id}` or `{#tab:id}`. When the
//! declaration sits on a heading line the heading text is the label,
//! otherwise the bare identifier is.
//!
//! Every source file in the project is scanned, including files no root
//! reaches yet. When the same key is declared twice, the declaration scanned
//! last wins; files are scanned in sorted path order.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BuildError, io_err};
use crate::include_graph::IncludeGraph;

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{#(sec|fig|tab):([A-Za-z0-9_-]+)\}").unwrap());

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#+)\s+(.*?)\s*\{#(sec|fig|tab):([A-Za-z0-9_-]+)\}").unwrap()
});

/// Anchor kind, named by its key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorKind {
    /// `sec:`
    Section,
    /// `fig:`
    Figure,
    /// `tab:`
    Table,
}

impl AnchorKind {
    /// Key prefix without the colon.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Section => "sec",
            Self::Figure => "fig",
            Self::Table => "tab",
        }
    }

    /// Parse a key prefix.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "sec" => Some(Self::Section),
            "fig" => Some(Self::Figure),
            "tab" => Some(Self::Table),
            _ => None,
        }
    }
}

impl fmt::Display for AnchorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A resolved anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub kind: AnchorKind,
    pub id: String,
    /// File whose output page displays the anchor.
    pub owner: String,
    /// Link text.
    pub label: String,
}

impl Anchor {
    /// Lookup key, e.g. `sec:intro`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

/// Anchor key to owning file and label.
#[derive(Debug, Default, Clone)]
pub struct AnchorIndex {
    anchors: HashMap<String, Anchor>,
}

impl AnchorIndex {
    /// Look up an anchor by kind and identifier.
    #[must_use]
    pub fn get(&self, kind: AnchorKind, id: &str) -> Option<&Anchor> {
        self.anchors.get(&format!("{kind}:{id}"))
    }

    /// Number of distinct anchor keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Record an anchor, replacing any earlier declaration of the same key.
    pub fn insert(&mut self, anchor: Anchor) {
        let key = anchor.key();
        if let Some(previous) = self.anchors.insert(key.clone(), anchor) {
            tracing::debug!(key = %key, previous = %previous.owner, "anchor redeclared");
        }
    }
}

/// Anchors declared in `text`, labelled but not yet owned.
pub fn scan_anchors(text: &str) -> Vec<(AnchorKind, String, String)> {
    let mut found = Vec::new();
    for line in text.lines() {
        let heading = HEADING.captures(line).map(|caps| caps[2].trim().to_owned());
        for caps in ANCHOR.captures_iter(line) {
            let Some(kind) = AnchorKind::from_prefix(&caps[1]) else {
                continue;
            };
            let id = caps[2].to_owned();
            let label = heading.clone().unwrap_or_else(|| id.clone());
            found.push((kind, id, label));
        }
    }
    found
}

/// Scan `sources` and resolve each anchor's owner through `graph`.
pub fn collect_anchors(
    project_root: &Path,
    sources: &[String],
    graph: &IncludeGraph,
) -> Result<AnchorIndex, BuildError> {
    let mut index = AnchorIndex::default();
    for file in sources {
        let path = project_root.join(file);
        let text = std::fs::read_to_string(&path).map_err(io_err(&path))?;
        let owner = graph.owning_root(file);
        for (kind, id, label) in scan_anchors(&text) {
            index.insert(Anchor {
                kind,
                id,
                owner: owner.to_owned(),
                label,
            });
        }
    }
    tracing::debug!(anchors = index.len(), "anchors collected");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::include_graph::analyze_includes;
    use crate::test_support::project;

    #[test]
    fn test_heading_label() {
        let found = scan_anchors("## Getting  Started {#sec:start}\n");
        assert_eq!(
            found,
            vec![(AnchorKind::Section, "start".to_owned(), "Getting  Started".to_owned())]
        );
    }

    #[test]
    fn test_bare_anchor_label_is_identifier() {
        let found = scan_anchors("![Plot](p.png){#fig:plot}\n| a |\n: Caption {#tab:t-1}");
        assert_eq!(
            found,
            vec![
                (AnchorKind::Figure, "plot".to_owned(), "plot".to_owned()),
                (AnchorKind::Table, "t-1".to_owned(), "t-1".to_owned()),
            ]
        );
    }

    #[test]
    fn test_unknown_prefix_ignored() {
        assert!(scan_anchors("# Eq {#eq:one}").is_empty());
    }

    #[test]
    fn test_owner_walks_include_chain() {
        let tmp = project(&[
            ("r.qmd", "{{< include a.qmd >}}"),
            ("a.qmd", "{{< include b.qmd >}}"),
            ("b.qmd", "# Intro {#sec:x}\n"),
        ]);
        let roots = vec!["r.qmd".to_owned()];
        let graph = analyze_includes(tmp.path(), &roots).unwrap();
        let sources = vec!["a.qmd".to_owned(), "b.qmd".to_owned(), "r.qmd".to_owned()];
        let index = collect_anchors(tmp.path(), &sources, &graph).unwrap();

        let anchor = index.get(AnchorKind::Section, "x").unwrap();
        assert_eq!(anchor.owner, "r.qmd");
        assert_eq!(anchor.label, "Intro");
    }

    #[test]
    fn test_last_declaration_wins() {
        let tmp = project(&[
            ("a.qmd", "# First {#sec:dup}"),
            ("b.qmd", "# Second {#sec:dup}"),
        ]);
        let roots = vec!["a.qmd".to_owned(), "b.qmd".to_owned()];
        let graph = analyze_includes(tmp.path(), &roots).unwrap();
        let index = collect_anchors(tmp.path(), &roots, &graph).unwrap();

        let anchor = index.get(AnchorKind::Section, "dup").unwrap();
        assert_eq!(anchor.owner, "b.qmd");
        assert_eq!(anchor.label, "Second");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_unreachable_draft_owns_itself() {
        let tmp = project(&[("r.qmd", "root"), ("draft.qmd", "# Draft {#sec:d}")]);
        let roots = vec!["r.qmd".to_owned()];
        let graph = analyze_includes(tmp.path(), &roots).unwrap();
        let index =
            collect_anchors(tmp.path(), &["draft.qmd".to_owned()], &graph).unwrap();
        assert_eq!(index.get(AnchorKind::Section, "d").unwrap().owner, "draft.qmd");
    }
}
