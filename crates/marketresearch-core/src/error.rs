use std::path::PathBuf;

use thiserror::Error;

/// Core error type for MarketResearch.
#[derive(Debug, Error)]
pub enum MarketResearchError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write report to {path}: {source}")]
    ExportIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to assemble document archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("failed to render report view: {0}")]
    Render(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MarketResearchError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn export_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ExportIo { path, source }
    }
}

impl From<minijinja::Error> for MarketResearchError {
    fn from(error: minijinja::Error) -> Self {
        Self::Render(error.to_string())
    }
}
