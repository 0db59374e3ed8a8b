//! Versioned SQL script catalog and the selection of what runs at each
//! schema version.

use std::path::PathBuf;
use thiserror::Error;

pub mod catalog;
pub mod filename;
pub mod plan;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unrecognized migration file name `{filename}`: {reason}")]
    InvalidFileName {
        filename: String,
        reason: &'static str,
    },

    #[error("failed to read migrations from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no SQL files found")]
    NoScripts,
}
