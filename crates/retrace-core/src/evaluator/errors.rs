use thiserror::Error;

use crate::callbacks::HostIoError;
use crate::recorder::TraceError;

/// Errors raised while running a program
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("{0} is not defined")]
    VariableNotFound(String),

    #[error("assignment to constant variable `{0}`")]
    ConstAssignment(String),

    #[error("type error: {operation} requires {expected}, got {actual}")]
    TypeError {
        operation: String,
        expected: String,
        actual: String,
    },

    #[error("{0} is not a function")]
    NotAFunction(String),

    #[error("cannot find module `{0}`")]
    UnknownModule(String),

    #[error("break to label `{0}`, which is not open")]
    UnknownLabel(String),

    #[error("maximum call depth of {0} exceeded")]
    CallDepth(usize),

    #[error("loop ran for more than {0} iterations")]
    LoopLimit(usize),

    #[error("array index {index} is past the maximum array length of {limit}")]
    ArrayLength { index: usize, limit: usize },

    #[error("a request listener is already registered")]
    ListenTwice,

    #[error("no request listener is registered")]
    NoListener,

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("host request failed: {0}")]
    Host(#[from] HostIoError),
}

impl EvalError {
    pub fn type_error(operation: &str, expected: &str, actual: &str) -> Self {
        Self::TypeError {
            operation: operation.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn variable_not_found(name: &str) -> Self {
        Self::VariableNotFound(name.to_string())
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
