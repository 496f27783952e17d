//! Source file discovery.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::paths;

/// All source files under `project_root` with `extension`, sorted.
///
/// Only the `excluded` directories (build outputs, caches) are skipped.
/// Hidden and gitignored files are still sources: a root may include them.
#[must_use]
pub fn scan_sources(project_root: &Path, extension: &str, excluded: &[PathBuf]) -> Vec<String> {
    let excluded = excluded.to_vec();
    let mut files: Vec<String> = WalkBuilder::new(project_root)
        .standard_filters(false)
        .filter_entry(move |entry| !excluded.iter().any(|dir| entry.path().starts_with(dir)))
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == extension))
        .filter_map(|entry| paths::to_relative(project_root, entry.path()))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::project;

    #[test]
    fn test_scan_sorted_and_filtered() {
        let tmp = project(&[
            ("z.qmd", ""),
            ("ch/a.qmd", ""),
            ("ch/notes.md", ""),
            ("_build/ch/a.qmd", ""),
            ("_display/ch/a.qmd", ""),
        ]);
        let excluded = [tmp.path().join("_build"), tmp.path().join("_display")];
        let files = scan_sources(tmp.path(), "qmd", &excluded);
        assert_eq!(files, vec!["ch/a.qmd", "z.qmd"]);
    }

    #[test]
    fn test_scan_includes_hidden_and_ignored() {
        let tmp = project(&[
            ("r.qmd", ""),
            (".gitignore", "gen/\n"),
            (".ignore", "drafts/\n"),
            ("gen/part.qmd", ""),
            ("drafts/d.qmd", ""),
            (".shared/frag.qmd", ""),
        ]);
        let files = scan_sources(tmp.path(), "qmd", &[]);
        assert_eq!(
            files,
            vec![".shared/frag.qmd", "drafts/d.qmd", "gen/part.qmd", "r.qmd"]
        );
    }
}
