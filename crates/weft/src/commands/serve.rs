//! `weft serve` command implementation.

use clap::Args;
use weft_build::BuildSession;
use weft_config::{CliSettings, Config};
use weft_server::{ServerConfig, run_server};

use super::CommonArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// Performs a full build, then serves and rebuilds on change until
    /// interrupted. A failing initial build is reported but does not stop
    /// the server, so the error can be fixed while watching.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            ..self.common.settings()
        };
        let config = Config::load(self.common.config.as_deref(), Some(&cli_settings))?;

        output.info(&format!("Project: {}", config.root.display()));
        let session = BuildSession::from_config(&config);
        match session.build(None) {
            Ok(report) => output.report(&report),
            Err(e) => output.error(&format!("Initial build failed: {e}")),
        }

        output.info(&format!(
            "Serving {} on http://{}:{}",
            session.paths().display_dir.display(),
            config.server.host,
            config.server.port
        ));
        output.info("Watching for changes, press Ctrl-C to stop");

        run_server(ServerConfig::from_config(&config), session).await?;
        Ok(())
    }
}
