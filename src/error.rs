use crate::fs_ops::TransientKind;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("IO error on {}: {source}", path.display())]
    HardIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Transient error ({kind:?}) on {} persisted after retries: {source}", path.display())]
    Transient {
        kind: TransientKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("File not accessible: {}", .0.display())]
    NotAccessible(PathBuf),

    #[error("Target already exists: {}", .0.display())]
    TargetExists(PathBuf),

    #[error("Cannot read library root {}: {source}", path.display())]
    LibraryUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "Book {record_id} points at {} but the file was not committed (temp file: {}, restored: {restored})",
        target.display(),
        temp_path.display()
    )]
    Inconsistent {
        record_id: i64,
        temp_path: PathBuf,
        target: PathBuf,
        restored: bool,
    },

    #[error("Book {0} not found")]
    RecordNotFound(i64),

    #[error("Library {0} not found")]
    LibraryNotFound(i64),

    #[error("Library path {0} not found")]
    LibraryPathNotFound(i64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}
