use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::RoleFailure;

#[derive(Debug, Error, Diagnostic)]
pub enum AdxError {
    #[error("no resources were requested")]
    #[diagnostic(help("provide at least one of --video, --image, --audio or --data"))]
    NoResources,

    #[error("no files were downloaded")]
    NoFilesDownloaded {
        requested: usize,
        failures: Vec<RoleFailure>,
    },

    #[error("failed to build archive: {0}")]
    Packaging(String),

    #[error("failed to deliver archive: {0}")]
    Delivery(String),

    #[error("download cancelled")]
    Cancelled,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("missing config file adx.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid item: {0}")]
    InvalidItem(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl AdxError {
    /// Errors caused by what the caller asked for rather than by the network.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AdxError::NoResources
                | AdxError::MissingConfig
                | AdxError::ConfigRead(_)
                | AdxError::ConfigParse(_)
                | AdxError::InvalidItem(_)
        )
    }
}
