//! Parser error types.
//!
//! Only structurally fatal conditions become errors; a value that fails to
//! parse is logged and treated as absent.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The document namespace could not be determined.
    #[error("schema namespace undetectable: {0}")]
    Schema(String),

    /// No statement node carrying an operator tree was found.
    #[error("no analyzable statement: {0}")]
    MalformedPlan(String),
}

pub type ParseResult<T> = Result<T, ParseError>;
