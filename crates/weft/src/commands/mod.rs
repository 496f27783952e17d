//! CLI command implementations.

pub(crate) mod build;
pub(crate) mod serve;

use clap::Args;
use weft_config::{CliSettings, MathMode};

pub(crate) use build::BuildArgs;
pub(crate) use serve::ServeArgs;

/// Options shared by `build` and `serve`.
#[derive(Args, Debug)]
pub(crate) struct CommonArgs {
    /// Path to configuration file (default: auto-discover weft.toml).
    #[arg(short, long)]
    pub config: Option<std::path::PathBuf>,

    /// Render math as images through WebTeX instead of MathJax.
    #[arg(long)]
    pub webtex: bool,

    /// Do not execute code blocks; show their source only.
    #[arg(long)]
    pub no_execute: bool,

    /// Enable verbose output (render and cache logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    /// Overrides for the loaded configuration.
    pub(crate) fn settings(&self) -> CliSettings {
        CliSettings {
            math: self.webtex.then_some(MathMode::Webtex),
            execute: self.no_execute.then_some(false),
            ..CliSettings::default()
        }
    }
}
