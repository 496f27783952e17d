//! Configuration management for weft.
//!
//! Parses `weft.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories. The directory that
//! holds the config file is the project root.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `render.pandoc`
//! - `execute.jupyter`
//! - `execute.kernel`

mod expand;
mod manifest;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use manifest::Manifest;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override math rendering mode.
    pub math: Option<MathMode>,
    /// Override code execution flag.
    pub execute: Option<bool>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "weft.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project layout configuration.
    pub project: ProjectConfig,
    /// Output directories (relative strings from TOML).
    build: BuildConfigRaw,
    /// Renderer configuration (paths as relative strings from TOML).
    render: RenderConfigRaw,
    /// Code execution configuration.
    pub execute: ExecuteConfig,
    /// Server configuration.
    pub server: ServerConfig,
    /// File watcher configuration.
    pub watch: WatchConfig,

    /// Project root directory (set after loading).
    #[serde(skip)]
    pub root: PathBuf,
    /// Resolved output directories (set after loading).
    #[serde(skip)]
    pub paths: BuildPaths,
    /// Resolved renderer configuration (set after loading).
    #[serde(skip)]
    pub render_resolved: RenderConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Project layout configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Manifest filename, relative to the project root.
    pub manifest: String,
    /// Source file extension (without the dot).
    pub extension: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            manifest: "_quarto.yml".to_owned(),
            extension: "qmd".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BuildConfigRaw {
    build_dir: Option<String>,
    display_dir: Option<String>,
    cache_dir: Option<String>,
}

/// Resolved output directories with absolute paths.
#[derive(Debug, Default, Clone)]
pub struct BuildPaths {
    /// Staging tree: mirrored sources and per-file rendered HTML.
    pub build_dir: PathBuf,
    /// Display tree: assembled pages, one per root.
    pub display_dir: PathBuf,
    /// Persistent cache root.
    pub cache_dir: PathBuf,
}

impl BuildPaths {
    fn with_base(base: &Path, raw: &BuildConfigRaw) -> Self {
        let resolve = |path: Option<&str>, default: &str| base.join(path.unwrap_or(default));
        Self {
            build_dir: resolve(raw.build_dir.as_deref(), "_build"),
            display_dir: resolve(raw.display_dir.as_deref(), "_display"),
            cache_dir: resolve(raw.cache_dir.as_deref(), "_nbcache"),
        }
    }

    /// Whether `path` lies in one of the generated directories.
    #[must_use]
    pub fn is_generated(&self, path: &Path) -> bool {
        path.starts_with(&self.build_dir)
            || path.starts_with(&self.display_dir)
            || path.starts_with(&self.cache_dir)
    }
}

/// How math is delivered to rendered pages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MathMode {
    /// `MathJax` script, local when `render.mathjax_dir` is set.
    #[default]
    Mathjax,
    /// Pre-rendered images via an external `WebTeX` service.
    Webtex,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RenderConfigRaw {
    pandoc: Option<String>,
    filters: Option<Vec<String>>,
    lua_filter: Option<String>,
    template: Option<String>,
    fragment_template: Option<String>,
    math: Option<MathMode>,
    mathjax_dir: Option<String>,
}

/// Resolved renderer configuration.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Renderer executable.
    pub pandoc: String,
    /// JSON filters passed with `--filter`, in order.
    pub filters: Vec<String>,
    /// Lua filter passed with `--lua-filter`.
    pub lua_filter: Option<PathBuf>,
    /// Template for root pages.
    pub template: Option<PathBuf>,
    /// Template for fragments. When set, fragments render standalone too.
    pub fragment_template: Option<PathBuf>,
    /// Math delivery mode.
    pub math: MathMode,
    /// Local `MathJax` distribution copied into the display tree.
    pub mathjax_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pandoc: "pandoc".to_owned(),
            filters: vec!["pandoc-crossref".to_owned()],
            lua_filter: None,
            template: None,
            fragment_template: None,
            math: MathMode::default(),
            mathjax_dir: None,
        }
    }
}

/// Code execution configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExecuteConfig {
    /// Whether executable blocks are run. When false, only sources are shown.
    pub enabled: bool,
    /// Jupyter executable.
    pub jupyter: String,
    /// Kernel name.
    pub kernel: String,
    /// Wall-clock limit for one file's block sequence.
    pub timeout_secs: u64,
}

impl ExecuteConfig {
    /// Wall-clock limit as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jupyter: "jupyter".to_owned(),
            kernel: "python3".to_owned(),
            timeout_secs: 10_800,
        }
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
        }
    }
}

/// File watcher configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a changed path is handed to the rebuild worker.
    pub debounce_ms: u64,
}

impl WatchConfig {
    /// Debounce window as a [`Duration`].
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Manifest parsing error.
    #[error("Manifest parse error: {0}")]
    Manifest(#[from] serde_yaml::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`render.pandoc`").
        field: String,
        /// Error message (e.g., "${`PANDOC`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `weft.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Load the project manifest named by `project.manifest`.
    ///
    /// # Errors
    ///
    /// Returns error if the manifest is missing or malformed.
    pub fn manifest(&self) -> Result<Manifest, ConfigError> {
        Manifest::load(&self.root.join(&self.project.manifest), &self.root)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(math) = settings.math {
            self.render_resolved.math = math;
        }
        if let Some(execute) = settings.execute {
            self.execute.enabled = execute;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    pub fn default_with_base(base: &Path) -> Self {
        let build = BuildConfigRaw::default();
        Self {
            project: ProjectConfig::default(),
            paths: BuildPaths::with_base(base, &build),
            build,
            render: RenderConfigRaw::default(),
            execute: ExecuteConfig::default(),
            server: ServerConfig::default(),
            watch: WatchConfig::default(),
            root: base.to_path_buf(),
            render_resolved: RenderConfig::default(),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        require_non_empty(&self.project.extension, "project.extension")?;
        require_non_empty(&self.project.manifest, "project.manifest")?;
        require_non_empty(&self.render_resolved.pandoc, "render.pandoc")?;

        if self.execute.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "execute.timeout_secs must be greater than 0".to_owned(),
            ));
        }

        let BuildPaths {
            build_dir,
            display_dir,
            cache_dir,
        } = &self.paths;
        if build_dir == display_dir || build_dir == cache_dir || display_dir == cache_dir {
            return Err(ConfigError::Validation(
                "build.build_dir, build.display_dir and build.cache_dir must be distinct"
                    .to_owned(),
            ));
        }

        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        self.execute.jupyter = expand::expand_env(&self.execute.jupyter, "execute.jupyter")?;
        self.execute.kernel = expand::expand_env(&self.execute.kernel, "execute.kernel")?;
        if let Some(ref pandoc) = self.render.pandoc {
            self.render.pandoc = Some(expand::expand_env(pandoc, "render.pandoc")?);
        }
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: &Option<String>| path.as_ref().map(|p| config_dir.join(p));
        let defaults = RenderConfig::default();

        self.root = config_dir.to_path_buf();
        self.paths = BuildPaths::with_base(config_dir, &self.build);
        self.render_resolved = RenderConfig {
            pandoc: self.render.pandoc.clone().unwrap_or(defaults.pandoc),
            filters: self.render.filters.clone().unwrap_or(defaults.filters),
            lua_filter: resolve(&self.render.lua_filter),
            template: resolve(&self.render.template),
            fragment_template: resolve(&self.render.fragment_template),
            math: self.render.math.unwrap_or_default(),
            mathjax_dir: resolve(&self.render.mathjax_dir),
        };
    }
}
