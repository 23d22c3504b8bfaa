/*!
# Instrumentation Pass

Rewrites a normalized program so that running it also drives the trace
recorder. The rewritten program is ordinary script source: it requires the
IR-builder module and the callbacks module and calls into `cb.trace` around
every traced construct.

## Architecture

- `env`: capture analysis, classifying each name as local or captured
- `reify`: lowers expressions into IR-builder calls (`exp.binop(...)`)
- `primitives`: the table of calls that are traced as primitives or methods
- `instrument`: the statement rewriter

## Example

```text
let x = 1;
```

becomes

```text
let exp = require("containerless/exp");
let cb = require("containerless");
cb.trace.newTrace();
cb.trace.traceLet("x", exp.number(1));
let x = 1;
cb.trace.exitBlock();
```
*/

pub mod env;
pub mod instrument;
pub mod primitives;
pub mod reify;

pub use env::{Binding, CaptureEnv};
pub use instrument::Instrumenter;
pub use primitives::{CallKind, PrimitiveTable};
pub use reify::Reifier;



use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Program, Span};

/// Static errors: the program cannot be instrumented as written.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentError {
    #[error("unsupported syntax at {span}: {construct}")]
    Unsupported { construct: String, span: Span },

    #[error("`{name}` at {span} is not bound anywhere in the program")]
    UnboundVariable { name: String, span: Span },

    #[error("`{name}` at {span} is both captured and bound locally in the same function")]
    CaptureConflict { name: String, span: Span },

    #[error("`{name}` at {span} is reserved for the instrumented program")]
    ReservedBinding { name: String, span: Span },

    #[error("break at {span} targets label `{label}`, which is not open")]
    UnknownLabel { label: String, span: Span },

    #[error("return at {span} is outside of any function")]
    ReturnOutsideFunction { span: Span },
}

impl InstrumentError {
    pub fn unsupported(construct: impl Into<String>, span: Span) -> Self {
        Self::Unsupported {
            construct: construct.into(),
            span,
        }
    }
}

pub type TransformResult<T> = std::result::Result<T, InstrumentError>;

/// Names the instrumented program uses to reach the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentOptions {
    /// Module path of the IR builders
    pub exp_module: String,
    /// Module path of the recorder and callback adapter
    pub callbacks_module: String,
    /// Label every function body is wrapped in; `return` breaks to it
    pub return_label: String,
    pub exp_binding: String,
    pub callbacks_binding: String,
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        Self {
            exp_module: "containerless/exp".to_string(),
            callbacks_module: "containerless".to_string(),
            return_label: "'ret".to_string(),
            exp_binding: "exp".to_string(),
            callbacks_binding: "cb".to_string(),
        }
    }
}

impl InstrumentOptions {
    pub fn is_reserved(&self, name: &str) -> bool {
        name == self.exp_binding || name == self.callbacks_binding
    }
}

/// Where the rewriter currently is: how many functions deep, and which
/// labels a `break` may target.
#[derive(Debug, Clone, Default)]
pub struct TransformationContext {
    pub function_depth: usize,
    pub labels: Vec<String>,
}

impl TransformationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels do not cross function boundaries.
    pub fn enter_function(&self) -> Self {
        Self {
            function_depth: self.function_depth + 1,
            labels: Vec::new(),
        }
    }

    pub fn with_label(&self, label: &str) -> Self {
        let mut labels = self.labels.clone();
        labels.push(label.to_string());
        Self {
            function_depth: self.function_depth,
            labels,
        }
    }

    pub fn in_function(&self) -> bool {
        self.function_depth > 0
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|open| open == label)
    }
}

/// Instrument a normalized program.
pub fn instrument_program(program: &Program, options: &InstrumentOptions) -> TransformResult<Program> {
    Instrumenter::new(options).instrument(program)
}
