//! Crate error taxonomy.
//!
//! Fatal conditions (`Schema`, `MalformedPlan`) abort the whole analysis and
//! carry enough context to locate the failing fragment. Everything local to a
//! single value degrades inside the parser instead of surfacing here.

use thiserror::Error;

use crate::parser::error::ParseError;

#[derive(Error, Debug)]
pub enum AdvisorError {
    /// The plan document's schema namespace could not be determined.
    #[error("schema error: {0}")]
    Schema(String),

    /// The document contains no analyzable statement.
    #[error("malformed plan: {0}")]
    MalformedPlan(String),

    /// The external index/statistics lookup could not be consumed; coverage
    /// checks are skipped, all other analyses proceed.
    #[error("schema facts unavailable: {0}")]
    LookupUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdvisorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn lookup_unavailable(message: impl Into<String>) -> Self {
        Self::LookupUnavailable(message.into())
    }
}

impl From<ParseError> for AdvisorError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Schema(msg) => AdvisorError::Schema(msg),
            ParseError::MalformedPlan(msg) => AdvisorError::MalformedPlan(msg),
            ParseError::Xml(e) => AdvisorError::MalformedPlan(format!("invalid XML: {e}")),
        }
    }
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;
