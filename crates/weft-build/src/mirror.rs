//! Staging copies of source files.
//!
//! The staged copy of `file` lives at `build_dir/file` and differs from the
//! source in four ways:
//!
//! 1. cross-references are resolved into links (relative to the directory of
//!    the file's owning root, where the content is eventually displayed);
//! 2. include directives become empty placeholder `div`s that survive
//!    rendering and are spliced during assembly;
//! 3. executable blocks become code placeholders;
//! 4. referenced local images are copied next to the staged file.
//!
//! The true source is never written.

use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use weft_exec::CodeBlock;

use crate::anchors::AnchorIndex;
use crate::error::{BuildError, io_err};
use crate::include_graph::{IncludeGraph, replace_directives, resolve_reference};
use crate::paths;
use crate::refs::resolve_refs;

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\{python[^}]*\}\n(.*?)```").unwrap());

static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").unwrap());

/// Result of mirroring one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirrored {
    /// Staged text as written to the build directory.
    pub text: String,
    /// Executable blocks in file order.
    pub blocks: Vec<CodeBlock>,
    /// Cross-references that matched no anchor.
    pub dangling: Vec<String>,
}

/// Writes staged copies into the build directory.
pub struct Mirror<'a> {
    project_root: &'a Path,
    build_dir: &'a Path,
    graph: &'a IncludeGraph,
    anchors: &'a AnchorIndex,
}

impl<'a> Mirror<'a> {
    #[must_use]
    pub fn new(
        project_root: &'a Path,
        build_dir: &'a Path,
        graph: &'a IncludeGraph,
        anchors: &'a AnchorIndex,
    ) -> Self {
        Self {
            project_root,
            build_dir,
            graph,
            anchors,
        }
    }

    /// Transform the project file `file` and write its staged copy.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingInclude`] if a directive cannot be
    /// resolved and [`BuildError::Io`] on filesystem errors.
    pub fn mirror_file(&self, file: &str) -> Result<Mirrored, BuildError> {
        let src = self.project_root.join(file);
        let text = std::fs::read_to_string(&src).map_err(io_err(&src))?;

        let dest_dir = paths::parent(self.graph.owning_root(file));
        let resolved = resolve_refs(&text, self.anchors, dest_dir);

        let text = self.replace_includes(file, &resolved.text)?;
        let (text, blocks) = replace_code_blocks(file, &text);
        self.copy_images(file, &text)?;

        let dest = self.build_dir.join(file);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        std::fs::write(&dest, &text).map_err(io_err(&dest))?;
        tracing::debug!(file, blocks = blocks.len(), "mirrored");

        Ok(Mirrored {
            text,
            blocks,
            dangling: resolved.dangling,
        })
    }

    fn replace_includes(&self, file: &str, text: &str) -> Result<String, BuildError> {
        let root_dir = self.graph.root_dir(file);
        let file_dir = paths::parent(file);
        replace_directives(text, |kind, reference| {
            let target = resolve_reference(self.project_root, file, root_dir, reference)
                .ok_or_else(|| BuildError::MissingInclude {
                    file: file.to_owned(),
                    reference: reference.to_owned(),
                })?;
            let source = paths::html_path(&target);
            Ok(format!(
                "<div data-{}=\"{}\" data-source=\"{source}\"></div>",
                kind.as_str(),
                paths::link_from_dir(file_dir, &source),
            ))
        })
    }

    fn copy_images(&self, file: &str, text: &str) -> Result<(), BuildError> {
        let root_dir = self.graph.root_dir(file);
        for caps in IMAGE.captures_iter(text) {
            let Some(image) = caps[1].split_whitespace().next() else {
                continue;
            };
            if image.starts_with("http://")
                || image.starts_with("https://")
                || image.starts_with("data:")
            {
                continue;
            }
            let Some(rel) = resolve_reference(self.project_root, file, root_dir, image) else {
                tracing::warn!(file, image, "referenced image not found");
                continue;
            };
            let from = self.project_root.join(&rel);
            let to = self.build_dir.join(&rel);
            if let Some(parent) = to.parent() {
                std::fs::create_dir_all(parent).map_err(io_err(parent))?;
            }
            std::fs::copy(&from, &to).map_err(io_err(&from))?;
        }
        Ok(())
    }
}

/// Replace executable blocks of `file` with code placeholders.
fn replace_code_blocks(file: &str, text: &str) -> (String, Vec<CodeBlock>) {
    let sources: Vec<&str> = CODE_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    let blocks = CodeBlock::sequence(file, sources);

    let mut next = blocks.iter();
    let text = CODE_BLOCK
        .replace_all(text, |caps: &Captures<'_>| match next.next() {
            Some(block) => format!(
                "<div data-script=\"{}\" data-index=\"{}\" data-hash=\"{}\"></div>",
                block.file, block.index, block.digest
            ),
            None => caps[0].to_owned(),
        })
        .into_owned();
    (text, blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::collect_anchors;
    use crate::include_graph::analyze_includes;
    use crate::test_support::project;
    use pretty_assertions::assert_eq;

    fn mirror(tmp: &Path, roots: &[&str], file: &str) -> Mirrored {
        let roots: Vec<String> = roots.iter().map(|s| (*s).to_owned()).collect();
        let graph = analyze_includes(tmp, &roots).unwrap();
        let build_dir = tmp.join("_build");
        let sources = crate::sources::scan_sources(tmp, "qmd", &[build_dir.clone()]);
        let anchors = collect_anchors(tmp, &sources, &graph).unwrap();
        Mirror::new(tmp, &build_dir, &graph, &anchors)
            .mirror_file(file)
            .unwrap()
    }

    #[test]
    fn test_include_becomes_placeholder() {
        let tmp = project(&[
            ("book/r.qmd", "{{< include parts/a.qmd >}}"),
            ("book/parts/a.qmd", "{{< embed ../shared/b.qmd >}}"),
            ("book/shared/b.qmd", "leaf"),
        ]);
        let root = mirror(tmp.path(), &["book/r.qmd"], "book/r.qmd");
        assert_eq!(
            root.text,
            r#"<div data-include="parts/a.html" data-source="book/parts/a.html"></div>"#
        );

        let part = mirror(tmp.path(), &["book/r.qmd"], "book/parts/a.qmd");
        assert_eq!(
            part.text,
            r#"<div data-embed="../shared/b.html" data-source="book/shared/b.html"></div>"#
        );
        let staged = std::fs::read_to_string(tmp.path().join("_build/book/parts/a.qmd")).unwrap();
        assert_eq!(staged, part.text);
    }

    #[test]
    fn test_source_untouched() {
        let tmp = project(&[("r.qmd", "{{< include a.qmd >}}"), ("a.qmd", "x")]);
        mirror(tmp.path(), &["r.qmd"], "r.qmd");
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("r.qmd")).unwrap(),
            "{{< include a.qmd >}}"
        );
    }

    #[test]
    fn test_refs_relative_to_owning_root() {
        let tmp = project(&[
            ("ch/r.qmd", "# Intro {#sec:x}\n{{< include ../parts/a.qmd >}}"),
            ("parts/a.qmd", "See @sec:x and @sec:none."),
        ]);
        let part = mirror(tmp.path(), &["ch/r.qmd"], "parts/a.qmd");
        assert_eq!(part.text, "See [Intro](r.html#sec:x) and @sec:none.");
        assert_eq!(part.dangling, vec!["@sec:none"]);
    }

    #[test]
    fn test_code_blocks_become_placeholders() {
        let tmp = project(&[(
            "r.qmd",
            "intro\n```{python}\nx = 1\n```\ntext\n```{python echo=false}\nprint(x)\n```\n",
        )]);
        let staged = mirror(tmp.path(), &["r.qmd"], "r.qmd");
        assert_eq!(staged.blocks.len(), 2);
        assert_eq!(staged.blocks[0].source, "x = 1\n");
        assert_eq!(staged.blocks[1].source, "print(x)\n");
        assert_eq!(
            staged.text,
            format!(
                "intro\n<div data-script=\"r.qmd\" data-index=\"1\" data-hash=\"{}\"></div>\ntext\n\
                 <div data-script=\"r.qmd\" data-index=\"2\" data-hash=\"{}\"></div>\n",
                staged.blocks[0].digest, staged.blocks[1].digest
            )
        );
    }

    #[test]
    fn test_plain_fences_untouched() {
        let tmp = project(&[("r.qmd", "```bash\nls\n```\n")]);
        let staged = mirror(tmp.path(), &["r.qmd"], "r.qmd");
        assert!(staged.blocks.is_empty());
        assert_eq!(staged.text, "```bash\nls\n```\n");
    }

    #[test]
    fn test_images_copied() {
        let tmp = project(&[
            ("ch/r.qmd", "![a](img/p.png \"title\")\n![b](https://x/y.png)\n![c](gone.png)"),
            ("ch/img/p.png", "png"),
        ]);
        mirror(tmp.path(), &["ch/r.qmd"], "ch/r.qmd");
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("_build/ch/img/p.png")).unwrap(),
            "png"
        );
    }
}
