//! # Retrace Core
//!
//! Trace instrumentation for a small closure-based scripting language:
//! - Abstract Syntax Tree (AST) definitions and a source printer
//! - pest grammar, parser and the normalizing rewrite
//! - The instrumentation pass and its capture analysis
//! - The trace IR and the incremental trace recorder
//! - The callback adapter for asynchronous host operations
//! - An evaluator and runtime that run instrumented programs against one recorder
//!
//! Running an instrumented program many times merges every execution into
//! one trace, with `unknown` holes where no execution has been yet.

#![warn(clippy::all)]

pub mod ast;
pub mod callbacks;
pub mod evaluator;
pub mod exp;
pub mod parser;
pub mod recorder;
pub mod runtime;
pub mod tracer;

// Re-export commonly used types
pub use ast::{Expr, Program, Span, Stmt, ToSource};
pub use callbacks::{Callbacks, ConversationId, Event, HostIo, HostIoError, StaticIo};
pub use evaluator::{ControlFlow, EvalError, Evaluator, Value};
pub use exp::{Exp, LVal, Mismatch};
pub use parser::{parse_program, Normalizer, ParseError};
pub use recorder::{ContextId, Recorder, TraceError};
pub use runtime::{RunOutcome, TracingRuntime};
pub use tracer::{instrument_program, InstrumentError, InstrumentOptions};

use serde::{Deserialize, Serialize};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for retrace components. Safe to call more than once.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "retrace_core=info".parse::<tracing_subscriber::filter::Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetraceConfig {
    /// Module names and reserved bindings of instrumented programs
    pub instrument: InstrumentOptions,
    /// Maximum function call depth
    pub max_call_depth: usize,
    /// Iterations after which a single loop is considered runaway
    pub max_loop_iterations: usize,
    /// Largest array an indexed write may grow
    pub max_array_length: usize,
}

impl Default for RetraceConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentOptions::default(),
            max_call_depth: 512,
            max_loop_iterations: 1_000_000,
            max_array_length: 1 << 24,
        }
    }
}

/// Error types for retrace operations
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RetraceError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Instrumentation error: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),
}

/// Result type for retrace operations
pub type Result<T> = std::result::Result<T, RetraceError>;

/// Parse, normalize and instrument `source`, returning the instrumented
/// program as source text.
pub fn instrument_source(source: &str, config: &RetraceConfig) -> Result<String> {
    let program = Normalizer::new().normalize(parse_program(source)?)?;
    let instrumented = instrument_program(&program, &config.instrument)?;
    Ok(instrumented.to_source())
}
