use thiserror::Error;

use crate::guardrails::PhraseTableError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Stable class name used in structured logs and CLI output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<PhraseTableError> for ApplicationError {
    fn from(value: PhraseTableError) -> Self {
        Self::Configuration(value.to_string())
    }
}
