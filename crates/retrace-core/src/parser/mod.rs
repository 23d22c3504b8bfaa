// Parser module - pest grammar for the script subset plus the normalizing rewrite
use thiserror::Error;

use crate::ast::{Program, Span};

pub mod normalize;
pub mod script;

pub use normalize::Normalizer;
pub use script::ScriptParser;

#[cfg(test)]
mod tests;

#[cfg(test)]
mod normalize_tests;

/// Errors raised while turning source text into an AST.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("syntax error at {span}: {message}")]
    Syntax { message: String, span: Span },

    #[error("unsupported syntax at {span}: {construct}")]
    Unsupported { construct: String, span: Span },

    #[error("identifier `{name}` at {span} uses the reserved `$` prefix")]
    ReservedIdentifier { name: String, span: Span },

    #[error("invalid assignment target at {span}")]
    InvalidTarget { span: Span },

    #[error("invalid number literal: {0}")]
    InvalidNumber(String),
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn unsupported(construct: impl Into<String>, span: Span) -> Self {
        Self::Unsupported {
            construct: construct.into(),
            span,
        }
    }
}

/// Parse source text into a program AST.
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    ScriptParser::parse_source(source)
}
