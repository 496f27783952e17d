//! Document renderer boundary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use weft_config::{MathMode, RenderConfig};

use crate::error::BuildError;
use crate::paths::relative_fs_path;

/// Local `MathJax` entry script, relative to the display directory.
pub const MATHJAX_SCRIPT: &str = "mathjax/tex-mml-chtml.js";

/// One file to render.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Project-relative source file, for diagnostics.
    pub file: String,
    /// Staged input file.
    pub input: PathBuf,
    /// HTML output file, next to the input.
    pub output: PathBuf,
    /// Whether the file is only ever displayed inside another page.
    pub fragment: bool,
    pub bibliography: Option<PathBuf>,
    pub csl: Option<PathBuf>,
    /// Absolute path of the local `MathJax` script, when one is served.
    pub mathjax: Option<PathBuf>,
}

impl RenderJob {
    /// Directory the renderer runs in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        self.input.parent().unwrap_or(Path::new("."))
    }
}

/// Converts one staged source file into HTML.
pub trait Renderer: Send + Sync {
    /// Render `job.input` into `job.output`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::RenderTool`] when the tool fails and
    /// [`BuildError::MissingResource`] when a citation resource is missing.
    fn render(&self, job: &RenderJob) -> Result<(), BuildError>;

    /// Summary of every option that affects output, for staleness checks.
    fn fingerprint(&self) -> String;
}

/// Renders through the `pandoc` executable.
#[derive(Debug, Clone)]
pub struct PandocRenderer {
    config: RenderConfig,
}

impl PandocRenderer {
    #[must_use]
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for `job`, with paths relative to its working
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingResource`] if the bibliography or CSL
    /// file does not exist.
    pub fn args(&self, job: &RenderJob) -> Result<Vec<String>, BuildError> {
        let cwd = job.working_dir();
        let rel = |path: &Path| relative_fs_path(cwd, path);
        let name = |path: &Path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let mut args = vec![
            name(&job.input),
            "--from".to_owned(),
            "markdown+raw_html".to_owned(),
            "--embed-resources".to_owned(),
        ];
        let template = if job.fragment {
            self.config.fragment_template.as_deref()
        } else {
            self.config.template.as_deref()
        };
        if !job.fragment || template.is_some() {
            args.push("--standalone".to_owned());
        }
        if let Some(lua) = &self.config.lua_filter {
            args.push("--lua-filter".to_owned());
            args.push(rel(lua));
        }
        for filter in &self.config.filters {
            args.push("--filter".to_owned());
            args.push(filter.clone());
        }
        args.push("--citeproc".to_owned());
        args.push(match (self.config.math, &job.mathjax) {
            (MathMode::Webtex, _) => "--webtex".to_owned(),
            (MathMode::Mathjax, Some(script)) => format!("--mathjax={}", rel(script)),
            (MathMode::Mathjax, None) => "--mathjax".to_owned(),
        });
        if let Some(template) = template {
            args.push("--template".to_owned());
            args.push(rel(template));
        }
        if let Some(bib) = &job.bibliography {
            if !bib.exists() {
                return Err(BuildError::MissingResource {
                    kind: "Bibliography",
                    path: bib.clone(),
                });
            }
            args.push("--bibliography".to_owned());
            args.push(rel(bib));
        }
        if let Some(csl) = &job.csl {
            if !csl.exists() {
                return Err(BuildError::MissingResource {
                    kind: "CSL",
                    path: csl.clone(),
                });
            }
            args.push("--csl".to_owned());
            args.push(rel(csl));
        }
        args.push("-o".to_owned());
        args.push(name(&job.output));
        Ok(args)
    }
}

impl Renderer for PandocRenderer {
    fn render(&self, job: &RenderJob) -> Result<(), BuildError> {
        let args = self.args(job)?;
        let command = format!("{} {}", self.config.pandoc, args.join(" "));

        tracing::info!(file = %job.file, fragment = job.fragment, "rendering");
        let start = Instant::now();
        let output = Command::new(&self.config.pandoc)
            .args(&args)
            .current_dir(job.working_dir())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| BuildError::RenderTool {
                file: job.file.clone(),
                command: command.clone(),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(BuildError::RenderTool {
                file: job.file.clone(),
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        tracing::info!(
            file = %job.file,
            elapsed_ms = start.elapsed().as_millis(),
            "rendered"
        );
        Ok(())
    }

    fn fingerprint(&self) -> String {
        let RenderConfig {
            pandoc,
            filters,
            lua_filter,
            template,
            fragment_template,
            math,
            mathjax_dir,
        } = &self.config;
        let mut out = format!("{pandoc}|{}|{math:?}", filters.join(","));
        for path in [lua_filter, template, fragment_template, mathjax_dir] {
            let path = path.as_ref().map(|p| p.display().to_string());
            let _ = write!(out, "|{}", path.unwrap_or_default());
        }
        out
    }
}
