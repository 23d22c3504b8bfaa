use thiserror::Error;

use super::ContextId;
use crate::callbacks::ConversationId;
use crate::exp::Mismatch;

/// Errors raised while recording or retracing an execution.
///
/// Any of these leaves the recorder unusable; later calls report
/// [`TraceError::Poisoned`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceError {
    #[error("execution diverged from the recorded trace: {0}")]
    Mismatch(#[from] Mismatch),

    #[error("block exited at step {cursor} of {len}; a {next} was recorded next")]
    PrematureExit {
        cursor: usize,
        len: usize,
        next: &'static str,
    },

    #[error("execution ran past the end of a block recorded with {len} steps")]
    BlockOverrun { len: usize },

    #[error("exit_block called with no open block")]
    ExitPastTopLevel,

    #[error("no open block; call new_trace first")]
    NotTracing,

    #[error("break targets label `{0}`, which is not open")]
    UnknownLabel(String),

    #[error("function body entered with no pending call arguments")]
    EmptyArgStack,

    #[error("function body declares {arity} parameters; at most {max} are supported")]
    Arity { arity: usize, max: usize },

    #[error("expected the innermost scope to be a {expected}, found a {found}")]
    ScopeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown trace context {0}")]
    UnknownContext(ContextId),

    #[error("respond called outside of any request")]
    NoConversation,

    #[error("conversation {0} has no pending response")]
    UnknownConversation(ConversationId),

    #[error("cursor path no longer resolves to a block")]
    DanglingPath,

    #[error("recorder is unusable after an earlier error: {0}")]
    Poisoned(String),
}
