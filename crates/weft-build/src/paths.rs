//! Project-relative path handling.
//!
//! Files are identified by project-relative paths with `/` separators
//! (`chapters/intro.qmd`). The empty string is the project root directory.

use std::path::{Component, Path};

/// Compute a relative URL from one page URL to another (RFC 3986).
///
/// Both `from` and `to` are paths without leading slash. The last segment of
/// `from` is the current document; a trailing slash marks `from` as a
/// directory.
///
/// ```
/// use weft_build::paths::relative_path;
///
/// assert_eq!(relative_path("a/b.html", "a/c.html"), "c.html");
/// assert_eq!(relative_path("a/", "b.html"), "../b.html");
/// assert_eq!(relative_path("", "a/b.html"), "a/b.html");
/// ```
#[must_use]
pub fn relative_path(from: &str, to: &str) -> String {
    let from_segs: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to_segs: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();

    let from_dir = if from.ends_with('/') || from_segs.is_empty() {
        &from_segs[..]
    } else {
        &from_segs[..from_segs.len() - 1]
    };

    let common = from_dir
        .iter()
        .zip(&to_segs)
        .take_while(|(a, b)| a == b)
        .count();

    let ups_part = "../".repeat(from_dir.len() - common);
    let down_part = to_segs[common..].join("/");

    let result = format!("{ups_part}{down_part}");
    if result.is_empty() {
        "./".to_owned()
    } else {
        result
    }
}

/// Relative link from a file in directory `dir` to `target`.
#[must_use]
pub fn link_from_dir(dir: &str, target: &str) -> String {
    if dir.is_empty() {
        relative_path("", target)
    } else {
        relative_path(&format!("{dir}/"), target)
    }
}

/// Directory part of a project-relative path (`""` at the root).
#[must_use]
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// File name without its extension.
#[must_use]
pub fn stem(path: &str) -> &str {
    let name = path.rsplit_once('/').map_or(path, |(_, name)| name);
    name.rsplit_once('.').map_or(name, |(stem, _)| stem)
}

/// Replace the extension of a project-relative path with `.html`.
#[must_use]
pub fn html_path(path: &str) -> String {
    let dir = parent(path);
    let stem = stem(path);
    if dir.is_empty() {
        format!("{stem}.html")
    } else {
        format!("{dir}/{stem}.html")
    }
}

/// Join `reference` onto directory `dir` and normalize `.` and `..`.
///
/// A leading `/` makes `reference` project-absolute. Returns `None` when the
/// result would leave the project.
#[must_use]
pub fn join(dir: &str, reference: &str) -> Option<String> {
    let mut segs: Vec<&str> = Vec::new();
    let base = if reference.starts_with('/') { "" } else { dir };
    for seg in base.split('/').chain(reference.split('/')) {
        match seg {
            "" | "." => {}
            ".." => {
                segs.pop()?;
            }
            _ => segs.push(seg),
        }
    }
    if segs.is_empty() {
        None
    } else {
        Some(segs.join("/"))
    }
}

/// Project-relative form of `path`, which must lie under `root`.
#[must_use]
pub fn to_relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut segs = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(seg) => segs.push(seg.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if segs.is_empty() {
        None
    } else {
        Some(segs.join("/"))
    }
}

/// Relative filesystem path from directory `from_dir` to `to`.
///
/// Both paths must be absolute.
#[must_use]
pub fn relative_fs_path(from_dir: &Path, to: &Path) -> String {
    let from: Vec<_> = from_dir.components().collect();
    let to: Vec<_> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = vec!["..".to_owned(); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}
