//! Display page assembly from staged HTML.
//!
//! A root's display page is its staged HTML with every include placeholder
//! replaced by the body of the target's staged HTML, recursively. Spliced
//! content is wrapped in `<!-- BEGIN include T -->` / `<!-- END include T -->`
//! comments naming the staged target.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use weft_exec::{CodeBlock, RenderedOutputs, cell_html};

use crate::error::{BuildError, io_err};
use crate::paths::relative_path;
use crate::placeholder::{find_placeholders, replace_placeholders};
use crate::render::MATHJAX_SCRIPT;

static BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body>").unwrap());

static MATH_NODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"class="math (?:inline|display)""#).unwrap());

static MATHJAX_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(<script\b[^>]*\bsrc=")([^"]*(?:mathjax|tex-mml)[^"]*)(")"#).unwrap()
});

static HEAD_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</head>").unwrap());

/// Splices staged fragments into root pages.
pub struct Assembler<'a> {
    build_dir: &'a Path,
    local_mathjax: bool,
}

impl<'a> Assembler<'a> {
    /// `local_mathjax` enables rewriting of `MathJax` script sources to the
    /// copy in the display tree.
    #[must_use]
    pub fn new(build_dir: &'a Path, local_mathjax: bool) -> Self {
        Self {
            build_dir,
            local_mathjax,
        }
    }

    /// Assemble the display page for the staged HTML file `page`.
    ///
    /// `page` is relative to the build directory, and is also the page's path
    /// in the display tree.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] if the page or a fragment cannot be read.
    pub fn assemble(&self, page: &str) -> Result<String, BuildError> {
        let path = self.build_dir.join(page);
        let html = std::fs::read_to_string(&path).map_err(io_err(&path))?;
        let mut active = vec![page.to_owned()];
        let html = self.splice(&html, page, &mut active)?;
        Ok(if self.local_mathjax {
            point_mathjax(&html, page)
        } else {
            html
        })
    }

    fn splice(&self, html: &str, page: &str, active: &mut Vec<String>) -> Result<String, BuildError> {
        let mut out = String::with_capacity(html.len());
        let mut last = 0;
        for placeholder in find_placeholders(html) {
            let Some(target) = placeholder.include_target() else {
                continue;
            };
            out.push_str(&html[last..placeholder.range.start]);
            last = placeholder.range.end;

            if active.iter().any(|a| a == target) {
                tracing::warn!(include = target, page, "cyclic include not expanded");
                continue;
            }
            let path = self.build_dir.join(target);
            if !path.is_file() {
                tracing::warn!(include = target, page, "staged include missing, dropping placeholder");
                continue;
            }

            tracing::info!("including {target} into {page}");
            let fragment = std::fs::read_to_string(&path).map_err(io_err(&path))?;
            active.push(target.to_owned());
            let body = self.splice(body_inner(&fragment), page, active)?;
            active.pop();

            let _ = write!(
                out,
                "<!-- BEGIN include {target} -->\n{body}\n<!-- END include {target} -->"
            );
        }
        out.push_str(&html[last..]);
        Ok(out)
    }
}

/// Content of the `body` element, or the whole document if it has none.
#[must_use]
pub fn body_inner(html: &str) -> &str {
    BODY.captures(html)
        .and_then(|caps| caps.get(1))
        .map_or(html, |m| m.as_str().trim())
}

/// Point `MathJax` at the local copy when `html` contains math.
fn point_mathjax(html: &str, page: &str) -> String {
    if !MATH_NODE.is_match(html) {
        return html.to_owned();
    }
    let src = relative_path(page, MATHJAX_SCRIPT);
    if MATHJAX_SRC.is_match(html) {
        return MATHJAX_SRC
            .replace_all(html, |caps: &regex::Captures<'_>| {
                format!("{}{src}{}", &caps[1], &caps[3])
            })
            .into_owned();
    }
    match HEAD_END.find(html) {
        Some(m) => format!(
            "{}<script id=\"MathJax-script\" async src=\"{src}\"></script>\n{}",
            &html[..m.start()],
            &html[m.start()..]
        ),
        None => html.to_owned(),
    }
}

/// Replace code placeholders with highlighted source and outputs.
///
/// `outputs` is `None` when execution is disabled; blocks then show their
/// source only. Placeholders for unknown blocks are kept.
#[must_use]
pub fn substitute_code(
    html: &str,
    blocks: &BTreeMap<String, Vec<CodeBlock>>,
    outputs: Option<&RenderedOutputs>,
) -> String {
    replace_placeholders(html, |placeholder| {
        let (file, index) = placeholder.script()?;
        let block = blocks.get(file)?.iter().find(|b| b.index == index)?;
        let output = outputs.map(|o| {
            o.get(&(file.to_owned(), index))
                .map_or("", String::as_str)
        });
        Some(cell_html(&block.source, output))
    })
}
