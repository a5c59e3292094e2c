use std::path::PathBuf;

use thiserror::Error;

/// Failures while reading the source spreadsheet. Recovered at startup
/// by falling back to an empty dataset; never fatal.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to open dataset at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported dataset format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to read spreadsheet: {0}")]
    Sheet(String),

    #[error("dataset is missing required column \"{0}\"")]
    MissingColumn(&'static str),

    #[error("failed to parse csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Invalid query input. Recovered locally by returning an empty result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryInputError {
    #[error("year filter is neither \"All\" nor an integer: {0:?}")]
    InvalidYear(String),
}
