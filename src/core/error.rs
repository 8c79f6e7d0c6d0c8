use super::types::EntityKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Command bus closed: {0}")]
    BusClosed(String),

    #[error("Backpressure: {0}")]
    Backpressure(String),
}

impl StoreError {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Entity kind carried by a `NotFound` error.
    pub fn missing_kind(&self) -> Option<EntityKind> {
        match self {
            Self::NotFound { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}
