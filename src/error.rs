use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown record type: {0}")]
    UnknownRecordType(String),

    #[error("scope {scope:?} matched {matches} scope records, expected exactly one")]
    AmbiguousScope { scope: String, matches: usize },

    #[error("store query failed: {0}")]
    StoreQuery(String),

    #[error("{record_type} record with {field}={value:?} already exists")]
    StoreConflict {
        record_type: String,
        field: String,
        value: String,
    },

    #[error("failed to read catalog: {0}")]
    CatalogRead(String),

    #[error("failed to parse catalog: {0}")]
    CatalogParse(String),

    #[error("missing config file bionty.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
