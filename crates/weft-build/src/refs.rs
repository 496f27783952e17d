//! Cross-reference resolution.
//!
//! `@sec:id`, `@fig:id` and `@tab:id` tokens become Markdown links to the
//! anchor's owning page. Tokens without a matching anchor stay as written.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::anchors::{AnchorIndex, AnchorKind};
use crate::paths;

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(sec|fig|tab):([A-Za-z0-9_-]+)").unwrap());

/// Text with references resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedText {
    pub text: String,
    /// Unresolved tokens, in order of appearance.
    pub dangling: Vec<String>,
}

/// Rewrite references in `text` as links relative to `dest_dir`.
///
/// `dest_dir` is the project-relative directory the text is displayed from.
#[must_use]
pub fn replace_refs_text(text: &str, anchors: &AnchorIndex, dest_dir: &str) -> String {
    resolve_refs(text, anchors, dest_dir).text
}

/// Like [`replace_refs_text`], also reporting unresolved tokens.
#[must_use]
pub fn resolve_refs(text: &str, anchors: &AnchorIndex, dest_dir: &str) -> ResolvedText {
    let mut dangling = Vec::new();
    let text = REFERENCE
        .replace_all(text, |caps: &Captures<'_>| {
            let anchor = AnchorKind::from_prefix(&caps[1]).and_then(|kind| anchors.get(kind, &caps[2]));
            match anchor {
                Some(anchor) => {
                    let target = paths::html_path(&anchor.owner);
                    let link = paths::link_from_dir(dest_dir, &target);
                    format!("[{}]({link}#{})", anchor.label, anchor.key())
                }
                None => {
                    tracing::debug!(reference = &caps[0], "unresolved cross-reference");
                    dangling.push(caps[0].to_owned());
                    caps[0].to_owned()
                }
            }
        })
        .into_owned();
    ResolvedText { text, dangling }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::Anchor;

    fn index() -> AnchorIndex {
        let mut index = AnchorIndex::default();
        index.insert(Anchor {
            kind: AnchorKind::Section,
            id: "x".to_owned(),
            owner: "r.qmd".to_owned(),
            label: "Intro".to_owned(),
        });
        index.insert(Anchor {
            kind: AnchorKind::Figure,
            id: "plot".to_owned(),
            owner: "ch/two.qmd".to_owned(),
            label: "plot".to_owned(),
        });
        index
    }

    #[test]
    fn test_resolves_to_own_page() {
        assert_eq!(
            replace_refs_text("See @sec:x.", &index(), ""),
            "See [Intro](r.html#sec:x)."
        );
    }

    #[test]
    fn test_link_is_relative_to_dest_dir() {
        assert_eq!(
            replace_refs_text("@fig:plot", &index(), "ch"),
            "[plot](two.html#fig:plot)"
        );
        assert_eq!(
            replace_refs_text("@sec:x", &index(), "ch/deep"),
            "[Intro](../../r.html#sec:x)"
        );
    }

    #[test]
    fn test_dangling_left_verbatim() {
        let resolved = resolve_refs("@sec:missing and @tab:t and @sec:x", &index(), "");
        assert_eq!(
            resolved.text,
            "@sec:missing and @tab:t and [Intro](r.html#sec:x)"
        );
        assert_eq!(resolved.dangling, vec!["@sec:missing", "@tab:t"]);
    }

    #[test]
    fn test_plain_text_unchanged() {
        let text = "email me at someone@example.com";
        assert_eq!(replace_refs_text(text, &index(), ""), text);
    }
}
