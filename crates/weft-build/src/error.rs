use std::path::{Path, PathBuf};

use weft_config::ConfigError;

/// Error that aborts a build.
///
/// Dangling cross-references and failures of executed code are not errors:
/// the former degrade to literal text, the latter become inline markup.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// An include directive matched no candidate path.
    #[error("Include file '{reference}' not found for '{file}'")]
    MissingInclude {
        /// Project-relative file containing the directive.
        file: String,
        /// Path as written in the directive.
        reference: String,
    },
    /// The document renderer exited unsuccessfully.
    #[error("Rendering '{file}' failed: {stderr}\nwhen running: {command}")]
    RenderTool {
        /// Project-relative file being rendered.
        file: String,
        /// Command line that was run.
        command: String,
        /// The tool's diagnostic output.
        stderr: String,
    },
    /// A resource named by the project manifest does not exist.
    #[error("{kind} file {} not found", path.display())]
    MissingResource {
        /// Resource kind, e.g. "Bibliography".
        kind: &'static str,
        /// Resolved path.
        path: PathBuf,
    },
    /// Filesystem error.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Configuration or manifest error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Adapter for `map_err` that attaches `path` to an I/O error.
pub(crate) fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError + '_ {
    move |source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    }
}
