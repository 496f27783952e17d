//! `weft build` command implementation.

use std::path::PathBuf;

use clap::Args;
use weft_build::BuildSession;
use weft_config::Config;

use super::CommonArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the build command.
#[derive(Args, Debug)]
pub(crate) struct BuildArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Rebuild only the roots affected by these files (default: full build).
    #[arg(long, num_args = 1..)]
    pub changed: Vec<PathBuf>,
}

impl BuildArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.common.config.as_deref(), Some(&self.common.settings()))?;

        output.info(&format!("Project: {}", config.root.display()));
        if !config.execute.enabled {
            output.info("Code execution: disabled");
        }

        let session = BuildSession::from_config(&config);
        let changed = (!self.changed.is_empty()).then_some(self.changed.as_slice());
        let report = session.build(changed)?;

        output.report(&report);
        output.info(&format!(
            "Output: {}",
            session.paths().display_dir.display()
        ));
        Ok(())
    }
}
