//! Error types shared across the core

use thiserror::Error;

/// Errors raised by storage, import and progression operations
#[derive(Error, Debug)]
pub enum LexiError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read Excel file: {0}")]
    Excel(#[from] calamine::XlsxError),

    #[error("curriculum import failed: {0}")]
    Import(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("stage not found: {0}")]
    StageNotFound(String),

    #[error("stage is locked: {0}")]
    StageLocked(String),

    #[error("practice session has no items")]
    EmptySession,

    #[error("no active practice session")]
    NoActiveSession,
}

pub type LexiResult<T> = Result<T, LexiError>;
