//! Page navigation injected into display pages.
//!
//! Every page gets a list of all root pages; the current page's entry
//! expands into the heading tree of that page. The markup sits between
//! comment markers so it can be replaced on the next build.

use std::fmt::Write as _;
use std::sync::LazyLock;

use pulldown_cmark::{Event, HeadingLevel, MetadataBlockKind, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde::Deserialize;
use weft_exec::escape_html;

use crate::paths::{self, relative_path};

const NAV_BEGIN: &str = "<!-- BEGIN weft-nav -->";
const NAV_END: &str = "<!-- END weft-nav -->";
const STYLE_BEGIN: &str = "<!-- BEGIN weft-nav-style -->";
const STYLE_END: &str = "<!-- END weft-nav-style -->";

const NAV_STYLE: &str = "<style>\n\
#weft-nav { font-size: 0.9em; }\n\
#weft-nav ul { list-style: none; padding-left: 1em; }\n\
#weft-nav li.current > a { font-weight: bold; }\n\
</style>";

static OLD_NAV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!-- BEGIN weft-nav -->.*?<!-- END weft-nav -->\n?").unwrap()
});

static OLD_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!-- BEGIN weft-nav-style -->.*?<!-- END weft-nav-style -->\n?").unwrap()
});

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h([1-6])\b([^>]*)>(.*?)</h[1-6]>").unwrap());

static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bclass\s*=\s*"([^"]*)""#).unwrap());

static ID_ATTR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bid\s*=\s*"([^"]*)""#).unwrap());

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static BODY_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<body\b[^>]*>").unwrap());

static HEAD_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</head>").unwrap());

/// A heading and the headings nested under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub level: u8,
    /// Rendered heading content with tags stripped, still HTML-escaped.
    pub text: String,
    pub id: Option<String>,
    pub children: Vec<Section>,
}

/// One entry of the page list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavPage {
    /// Project-relative root source file.
    pub file: String,
    pub title: String,
}

#[derive(Deserialize)]
struct FrontMatter {
    title: Option<String>,
}

/// Heading tree of `html`, skipping page-title headings (`class="title"`).
#[must_use]
pub fn parse_headings(html: &str) -> Vec<Section> {
    let mut items = Vec::new();
    for caps in HEADING.captures_iter(html) {
        let attrs = &caps[2];
        let is_title = CLASS_ATTR
            .captures(attrs)
            .is_some_and(|c| c[1].split_whitespace().any(|class| class == "title"));
        if is_title {
            continue;
        }
        let text = TAG.replace_all(&caps[3], "");
        let section = Section {
            level: caps[1].parse().unwrap_or(1),
            text: text.split_whitespace().collect::<Vec<_>>().join(" "),
            id: ID_ATTR.captures(attrs).map(|c| c[1].to_owned()),
            children: Vec::new(),
        };
        insert_section(&mut items, section);
    }
    items
}

fn insert_section(items: &mut Vec<Section>, section: Section) {
    match items.last_mut() {
        Some(last) if last.level < section.level => insert_section(&mut last.children, section),
        _ => items.push(section),
    }
}

/// Title of a source document.
///
/// Front matter `title`, else the first level-1 heading, else the file stem.
#[must_use]
pub fn read_title(text: &str, file: &str) -> String {
    let options = Options::ENABLE_YAML_STYLE_METADATA_BLOCKS | Options::ENABLE_HEADING_ATTRIBUTES;
    let mut in_metadata = false;
    let mut in_h1 = false;
    let mut heading = String::new();

    for event in Parser::new_ext(text, options) {
        match event {
            Event::Start(Tag::MetadataBlock(MetadataBlockKind::YamlStyle)) => in_metadata = true,
            Event::End(TagEnd::MetadataBlock(_)) => in_metadata = false,
            Event::Text(yaml) if in_metadata => {
                let title = serde_yaml::from_str::<FrontMatter>(&yaml)
                    .ok()
                    .and_then(|fm| fm.title);
                if let Some(title) = title {
                    return title;
                }
            }
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => in_h1 = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) => {
                let title = heading.trim();
                if !title.is_empty() {
                    return title.to_owned();
                }
                in_h1 = false;
            }
            Event::Text(text) | Event::Code(text) if in_h1 => heading.push_str(&text),
            _ => {}
        }
    }
    paths::stem(file).to_owned()
}

/// Replace the navigation of the display page `page` (a display-relative
/// HTML path) by one built from `pages` and the page's own headings.
///
/// Pages without a `body` element are returned unchanged.
#[must_use]
pub fn inject_navigation(html: &str, page: &str, pages: &[NavPage]) -> String {
    let html = OLD_STYLE.replace_all(&OLD_NAV.replace_all(html, ""), "").into_owned();
    let Some(body) = BODY_OPEN.find(&html) else {
        return html;
    };
    let sections = parse_headings(&html);

    let mut nav = String::new();
    let _ = writeln!(nav, "{NAV_BEGIN}");
    let _ = writeln!(nav, "<nav id=\"weft-nav\">\n<ul class=\"weft-pages\">");
    for entry in pages {
        let target = paths::html_path(&entry.file);
        let href = relative_path(page, &target);
        let title = escape_html(&entry.title);
        if target == page {
            let _ = write!(nav, "<li class=\"current\"><a href=\"{href}\">{title}</a>");
            write_sections(&mut nav, &sections);
            let _ = writeln!(nav, "</li>");
        } else {
            let _ = writeln!(nav, "<li><a href=\"{href}\">{title}</a></li>");
        }
    }
    let _ = writeln!(nav, "</ul>\n</nav>\n{NAV_END}");

    let mut out = String::with_capacity(html.len() + nav.len() + NAV_STYLE.len());
    out.push_str(&html[..body.end()]);
    out.push_str(&nav);
    out.push_str(&html[body.end()..]);

    match HEAD_CLOSE.find(&out) {
        Some(head) => format!(
            "{}{STYLE_BEGIN}\n{NAV_STYLE}\n{STYLE_END}\n{}",
            &out[..head.start()],
            &out[head.start()..]
        ),
        None => out,
    }
}

fn write_sections(nav: &mut String, sections: &[Section]) {
    if sections.is_empty() {
        return;
    }
    let _ = write!(nav, "\n<ul>");
    for section in sections {
        match &section.id {
            Some(id) => {
                let _ = write!(nav, "\n<li><a href=\"#{id}\">{}</a>", section.text);
            }
            None => {
                let _ = write!(nav, "\n<li>{}", section.text);
            }
        }
        write_sections(nav, &section.children);
        let _ = write!(nav, "</li>");
    }
    let _ = write!(nav, "\n</ul>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pages() -> Vec<NavPage> {
        vec![
            NavPage {
                file: "index.qmd".to_owned(),
                title: "Home".to_owned(),
            },
            NavPage {
                file: "ch/r.qmd".to_owned(),
                title: "R & D".to_owned(),
            },
        ]
    }

    #[test]
    fn test_parse_headings_nested() {
        let html = r#"<h1 class="title">Doc</h1>
<h1 id="a">A</h1><h2 id="a1">A <em>one</em></h2><h3 id="deep">Deep</h3>
<h2 id="a2">A2</h2><h1 id="b">B</h1>"#;
        let sections = parse_headings(html);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].text, "A");
        assert_eq!(sections[0].children.len(), 2);
        assert_eq!(sections[0].children[0].text, "A one");
        assert_eq!(sections[0].children[0].children[0].id.as_deref(), Some("deep"));
        assert_eq!(sections[1].id.as_deref(), Some("b"));
    }

    #[test]
    fn test_parse_headings_starting_below_top_level() {
        let sections = parse_headings(r#"<h3 id="x">X</h3><h2 id="y">Y</h2>"#);
        assert_eq!(sections.len(), 2);
    }

    #[test]
    fn test_title_from_front_matter() {
        let text = "---\ntitle: \"Guide\"\nauthor: me\n---\n\n# Heading\n";
        assert_eq!(read_title(text, "ch/x.qmd"), "Guide");
    }

    #[test]
    fn test_title_from_first_heading() {
        let text = "intro\n\n# The `Intro` {#sec:intro}\n\n# Second\n";
        assert_eq!(read_title(text, "ch/x.qmd"), "The Intro");
    }

    #[test]
    fn test_title_from_stem() {
        assert_eq!(read_title("## only level two\n", "ch/notes.qmd"), "notes");
        assert_eq!(read_title("---\nauthor: me\n---\ntext\n", "a.qmd"), "a");
    }

    #[test]
    fn test_inject_navigation() {
        let html = "<html><head><title>t</title></head><body>\n<h2 id=\"s\">S</h2>\n</body></html>";
        let out = inject_navigation(html, "ch/r.html", &pages());

        assert!(out.contains("<li><a href=\"../index.html\">Home</a></li>"));
        assert!(out.contains(
            "<li class=\"current\"><a href=\"r.html\">R &amp; D</a>\n<ul>\n<li><a href=\"#s\">S</a></li>\n</ul>\n</li>"
        ));
        assert!(out.contains(&format!("{STYLE_END}\n</head>")));
        assert!(out.starts_with(&format!("<html><head><title>t</title>{STYLE_BEGIN}")));
    }

    #[test]
    fn test_injection_is_idempotent() {
        let html = "<html><head></head><body class=\"x\">\n<h1 id=\"a\">A</h1>\n</body></html>";
        let once = inject_navigation(html, "index.html", &pages());
        let twice = inject_navigation(&once, "index.html", &pages());
        assert_eq!(once, twice);

        let stripped = OLD_STYLE
            .replace_all(&OLD_NAV.replace_all(&once, ""), "")
            .into_owned();
        assert_eq!(stripped, html);
    }

    #[test]
    fn test_page_without_body_unchanged() {
        assert_eq!(inject_navigation("<p>x</p>", "index.html", &pages()), "<p>x</p>");
    }
}
