//! Placeholder nodes left in rendered HTML by mirroring.
//!
//! A placeholder is an empty `div` carrying `data-*` attributes:
//!
//! ```html
//! <div data-include="parts/a.html" data-source="ch/parts/a.html"></div>
//! <div data-script="ch/a.qmd" data-index="2" data-hash="9f86…"></div>
//! ```
//!
//! The renderer may add whitespace between the tags or reorder attributes,
//! so matching is done on the element rather than on the exact text.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static EMPTY_DIV: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<div\b([^>]*)>\s*</div>").unwrap());

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*"([^"]*)""#).unwrap());

/// An empty `div` with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte range of the whole element in the scanned HTML.
    pub range: Range<usize>,
    attrs: HashMap<String, String>,
}

impl Placeholder {
    /// Attribute value, if present.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Include or embed target, as a staged HTML path.
    #[must_use]
    pub fn include_target(&self) -> Option<&str> {
        if self.attr("data-include").is_none() && self.attr("data-embed").is_none() {
            return None;
        }
        self.attr("data-source")
            .or_else(|| self.attr("data-include"))
            .or_else(|| self.attr("data-embed"))
    }

    /// `(source file, index)` of a code placeholder.
    #[must_use]
    pub fn script(&self) -> Option<(&str, usize)> {
        let file = self.attr("data-script")?;
        let index = self.attr("data-index")?.parse().ok()?;
        Some((file, index))
    }
}

/// All empty `div` elements in `html`, in document order.
#[must_use]
pub fn find_placeholders(html: &str) -> Vec<Placeholder> {
    EMPTY_DIV
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let attrs: HashMap<String, String> = ATTRIBUTE
                .captures_iter(&caps[1])
                .map(|a| (a[1].to_ascii_lowercase(), a[2].to_owned()))
                .collect();
            Some(Placeholder {
                range: whole.range(),
                attrs,
            })
        })
        .collect()
}

/// Replace placeholders in a single pass.
///
/// `replace` returns the new content for a placeholder, or `None` to keep it
/// unchanged.
pub fn replace_placeholders<F>(html: &str, mut replace: F) -> String
where
    F: FnMut(&Placeholder) -> Option<String>,
{
    let mut result = String::with_capacity(html.len());
    let mut last = 0;
    for placeholder in find_placeholders(html) {
        if let Some(content) = replace(&placeholder) {
            result.push_str(&html[last..placeholder.range.start]);
            result.push_str(&content);
            last = placeholder.range.end;
        }
    }
    result.push_str(&html[last..]);
    result
}
