use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HermesError {
    #[error("unknown collector: {0}")]
    UnknownCollector(String),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("invalid record kind: {0}")]
    InvalidRecordKind(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    #[error("{0} collection run(s) closed as failure")]
    RunsFailed(usize),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error, Diagnostic)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("natural key field `{field}` missing for table {table}")]
    MissingKeyField { table: String, field: String },

    #[error("nothing to insert into {0}")]
    EmptyRow(String),

    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}
