// src/error.rs
use serde::Serialize;
use thiserror::Error;

/// Per-item failures. None of these abort a batch: the caller records them
/// against the target or campaign that produced them and moves on.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("cooldown ledger unavailable: {0}")]
    Ledger(String),

    #[error("metrics source failed: {0}")]
    Source(String),
}

impl EngineError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Config(_) => ErrorKind::Config,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Ledger(_) => ErrorKind::Ledger,
            Self::Source(_) => ErrorKind::Source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Config,
    Persistence,
    Ledger,
    Source,
}

pub type EngineResult<T> = Result<T, EngineError>;
