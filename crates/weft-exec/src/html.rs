//! Cell output to HTML conversion.

use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

use crate::notebook::{Output, mime_text};

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]").unwrap());

/// Escape HTML special characters.
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Terminal text as an escaped `<pre>` block, colour codes removed.
fn terminal_pre(text: &str, style: Option<&str>) -> String {
    let clean = ANSI_ESCAPE.replace_all(text, "");
    match style {
        Some(style) => format!("<pre style=\"{style}\">{}</pre>", escape_html(&clean)),
        None => format!("<pre>{}</pre>", escape_html(&clean)),
    }
}

/// Render one cell's outputs to embeddable HTML.
///
/// Rich outputs prefer `text/html`, then PNG, JPEG and SVG images, then
/// `text/plain`.
#[must_use]
pub fn outputs_to_html(outputs: &[Output]) -> String {
    let mut parts = Vec::with_capacity(outputs.len());
    for output in outputs {
        match output {
            Output::Stream { text, .. } => parts.push(terminal_pre(&text.text(), None)),
            Output::DisplayData { data, .. } | Output::ExecuteResult { data, .. } => {
                let text = |mime: &str| data.get(mime).and_then(mime_text);
                if let Some(html) = text("text/html") {
                    parts.push(html);
                } else if let Some(png) = text("image/png") {
                    parts.push(format!("<img src='data:image/png;base64,{}'/>", png.trim()));
                } else if let Some(jpeg) = text("image/jpeg") {
                    parts.push(format!("<img src='data:image/jpeg;base64,{}'/>", jpeg.trim()));
                } else if let Some(svg) = text("image/svg+xml") {
                    parts.push(svg);
                } else if let Some(plain) = text("text/plain") {
                    parts.push(terminal_pre(&plain, None));
                }
            }
            Output::Error {
                ename,
                evalue,
                traceback,
            } => {
                let tb = if traceback.is_empty() {
                    format!("{ename}: {evalue}")
                } else {
                    traceback.join("\n")
                };
                parts.push(terminal_pre(&tb, Some("color:red;")));
            }
            Output::Unknown => {}
        }
    }
    parts.join("\n")
}

/// Final markup for one code block: highlighted source plus its output.
///
/// `output` is `None` when execution is disabled.
#[must_use]
pub fn cell_html(source: &str, output: Option<&str>) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<pre class=\"sourceCode\"><code class=\"language-python\">{}</code></pre>",
        escape_html(source)
    );
    if let Some(output) = output {
        let _ = write!(html, "\n<div class=\"cell-output\">{output}</div>");
    }
    html
}
