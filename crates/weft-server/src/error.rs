//! Server error types.

use std::path::PathBuf;

/// Error that prevents watch-and-serve mode from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
