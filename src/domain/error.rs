use serde::{Deserialize, Serialize};
use std::fmt;

use super::stage::StageName;

#[derive(Debug, Serialize, Deserialize)]
pub enum AppError {
    Internal(String),
    NotFound(String),
    InputError(String),
    ExternalCapability(String),
    SchemaViolation(String),
    GenerationFailed(String),
    CacheCorruption(String),
    DatabaseError(String),
    IoError(String),
    InStage {
        stage: StageName,
        key: String,
        cause: Box<AppError>,
    },
}

impl AppError {
    /// Attach the stage and cache key a failure happened under.
    ///
    /// Wrapping twice keeps the innermost stage; an error already scoped to a
    /// stage is returned unchanged.
    pub fn in_stage(self, stage: StageName, key: impl Into<String>) -> Self {
        match self {
            AppError::InStage { .. } => self,
            other => AppError::InStage {
                stage,
                key: key.into(),
                cause: Box::new(other),
            },
        }
    }

    /// The underlying failure, with any stage scoping stripped.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::InStage { cause, .. } => cause.root(),
            other => other,
        }
    }

    pub fn stage(&self) -> Option<StageName> {
        match self {
            AppError::InStage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Failures of an external collaborator that are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.root(), AppError::ExternalCapability(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InputError(msg) => write!(f, "Input error: {}", msg),
            AppError::ExternalCapability(msg) => write!(f, "External capability error: {}", msg),
            AppError::SchemaViolation(msg) => write!(f, "Schema violation: {}", msg),
            AppError::GenerationFailed(msg) => write!(f, "Generation failed: {}", msg),
            AppError::CacheCorruption(msg) => write!(f, "Cache corruption: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::IoError(msg) => write!(f, "IO error: {}", msg),
            AppError::InStage { stage, key, cause } => {
                write!(f, "[stage={} key={}] {}", stage, key, cause)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
