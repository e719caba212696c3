//! Error types for the guard layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a subprocess input was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizationKind {
    EmptyInput,
    TooLong,
    DangerousChar,
    NullByte,
    InvalidFormat,
    NotWhitelisted,
}

impl std::fmt::Display for SanitizationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SanitizationKind::EmptyInput => write!(f, "empty_input"),
            SanitizationKind::TooLong => write!(f, "too_long"),
            SanitizationKind::DangerousChar => write!(f, "dangerous_char"),
            SanitizationKind::NullByte => write!(f, "null_byte"),
            SanitizationKind::InvalidFormat => write!(f, "invalid_format"),
            SanitizationKind::NotWhitelisted => write!(f, "not_whitelisted"),
        }
    }
}

/// A rejected subprocess input, tagged with the field that carried it
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{field}: {message}")]
pub struct SanitizationFailure {
    pub kind: SanitizationKind,
    pub field: String,
    pub message: String,
}

impl SanitizationFailure {
    pub fn new(kind: SanitizationKind, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Guard error type
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Sanitization failed: {0}")]
    Sanitization(#[from] SanitizationFailure),

    #[error("Invalid or expired confirmation token")]
    InvalidToken,

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Invalid project name: {0}")]
    InvalidProjectName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for guard operations
pub type Result<T> = std::result::Result<T, GuardError>;
