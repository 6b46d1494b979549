//! Codegen error type: a logic error (unsupported construct reached) and a
//! formatting error (since IR emission is `write!`-based).

use std::fmt;

#[derive(Debug)]
pub enum CodeGenError {
    Logic(String),
    Format(fmt::Error),
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeGenError::Logic(msg) => write!(f, "codegen error: {msg}"),
            CodeGenError::Format(e) => write!(f, "codegen formatting error: {e}"),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<fmt::Error> for CodeGenError {
    fn from(e: fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}
