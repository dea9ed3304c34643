use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring localization or loading tables
#[derive(Error, Debug)]
pub enum LocalizationError {
    #[error("The {0} cannot be empty")]
    EmptyReference(&'static str),
    #[error("Invalid locale tag: {0}")]
    InvalidLocale(String),
    #[error("Unsupported locale: {0}")]
    UnsupportedLocale(String),
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Config(#[from] ron::error::SpannedError),
    #[error("Failed to parse string table '{table}': {message}")]
    StringTableParse { table: String, message: String },
    #[error("Failed to parse asset table '{table}': {message}")]
    AssetTableParse { table: String, message: String },
}
