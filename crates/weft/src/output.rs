//! Colored terminal output utilities.

use console::{Style, Term};
use weft_build::BuildReport;

/// Terminal output formatter.
pub(crate) struct Output {
    term: Term,
    green: Style,
    yellow: Style,
    red: Style,
    dim: Style,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            red: Style::new().red(),
            dim: Style::new().dim(),
        }
    }

    pub(crate) fn info(&self, msg: &str) {
        let _ = self.term.write_line(msg);
    }

    /// Print a success message (green).
    pub(crate) fn success(&self, msg: &str) {
        let _ = self.term.write_line(&self.green.apply_to(msg).to_string());
    }

    /// Print a warning message (yellow).
    pub(crate) fn warning(&self, msg: &str) {
        let _ = self.term.write_line(&self.yellow.apply_to(msg).to_string());
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.term.write_line(&self.red.apply_to(msg).to_string());
    }

    /// Print a secondary detail line (dim, indented).
    pub(crate) fn detail(&self, msg: &str) {
        let _ = self
            .term
            .write_line(&format!("  {}", self.dim.apply_to(msg)));
    }

    /// Print the outcome of a build.
    pub(crate) fn report(&self, report: &BuildReport) {
        if report.is_noop() {
            self.info("Nothing to rebuild");
            return;
        }
        self.success(&summary(report));
        for file in &report.executed_files {
            self.detail(&format!("executed {file}"));
        }
        for cycle in &report.cycles {
            self.warning(&format!("Include cycle: {}", cycle.join(" -> ")));
        }
        if !report.dangling_refs.is_empty() {
            self.warning(&format!(
                "Unresolved references: {}",
                report.dangling_refs.join(", ")
            ));
        }
    }
}

/// One-line summary of a build.
fn summary(report: &BuildReport) -> String {
    let plural = |n: usize, word: &str| {
        if n == 1 {
            format!("{n} {word}")
        } else {
            format!("{n} {word}s")
        }
    };
    format!(
        "Built {}: {} rendered, {} updated, {} executed, {} from cache",
        plural(report.roots.len(), "root"),
        plural(report.rendered.len(), "file"),
        plural(report.assembled.len(), "page"),
        report.executed_files.len(),
        report.cache_hits.len(),
    )
}
