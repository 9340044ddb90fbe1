use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("missing reference: {0}")]
    MissingReference(String),
    #[error("unknown event state '{0}'")]
    UnknownState(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("action '{action}' is not available while {phase}")]
    IllegalAction { phase: String, action: String },
    #[error("transaction protocol error: {0}")]
    Protocol(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl DomainError {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingReference(what.into())
    }
}
