//! Retrace Runtime - instrument once, run many times, read back the trace
//!
//! Wraps the parser, the instrumentation pass and the evaluator. A traced
//! runtime keeps one recorder for its whole life, so every `run` and every
//! `request` is merged into the same trace.

use anyhow::Result;
use serde_json::Value as Json;
use tracing::{debug, info};

use crate::{
    ast::{Program, ToSource},
    callbacks::{Callbacks, ConversationId, HostIo, StaticIo},
    evaluator::{Evaluator, Value},
    exp::Exp,
    parser::{parse_program, Normalizer},
    recorder::Recorder,
    tracer::instrument_program,
    RetraceConfig, RetraceError,
};

/// What one run of the program produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Value of a top-level `return`, otherwise `undefined`
    pub value: Value,
    /// Console output, one entry per `console.log` call
    pub output: Vec<String>,
}

/// What one inbound request produced
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub conversation: ConversationId,
    /// The value passed to `respond`, if the handler responded
    pub body: Option<Json>,
    pub output: Vec<String>,
}

pub struct TracingRuntime {
    program: Program,
    instrumented: Option<String>,
    evaluator: Evaluator,
    runs: usize,
}

impl TracingRuntime {
    /// Instrument `source` and prepare to trace it.
    pub fn new(source: &str, config: RetraceConfig) -> Result<Self> {
        Self::with_io(source, config, Box::new(StaticIo::new()))
    }

    pub fn with_io(source: &str, config: RetraceConfig, io: Box<dyn HostIo>) -> Result<Self> {
        let normalized = Normalizer::new()
            .normalize(parse_program(source).map_err(RetraceError::from)?)
            .map_err(RetraceError::from)?;
        let instrumented = instrument_program(&normalized, &config.instrument)
            .map_err(RetraceError::from)?
            .to_source();
        // Run the printed program so the trace comes from exactly what a host would load
        let program = parse_program(&instrumented).map_err(RetraceError::from)?;
        info!(
            statements = program.body.len(),
            bytes = instrumented.len(),
            "instrumented program"
        );

        let evaluator = Evaluator::new(config, Callbacks::traced(Recorder::new(), io));
        Ok(Self {
            program,
            instrumented: Some(instrumented),
            evaluator,
            runs: 0,
        })
    }

    /// Run `source` as written, without instrumentation or tracing.
    pub fn plain(source: &str, config: RetraceConfig) -> Result<Self> {
        Self::plain_with_io(source, config, Box::new(StaticIo::new()))
    }

    pub fn plain_with_io(source: &str, config: RetraceConfig, io: Box<dyn HostIo>) -> Result<Self> {
        let program = parse_program(source).map_err(RetraceError::from)?;
        Ok(Self {
            program,
            instrumented: None,
            evaluator: Evaluator::new(config, Callbacks::untraced(io)),
            runs: 0,
        })
    }

    pub fn is_tracing(&self) -> bool {
        self.evaluator.callbacks().is_tracing()
    }

    pub fn instrumented_source(&self) -> Option<&str> {
        self.instrumented.as_deref()
    }

    /// Completed runs so far
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Run the program from the top with fresh globals, then every callback
    /// it queued.
    pub fn run(&mut self) -> Result<RunOutcome> {
        self.evaluator.reset();
        let value = self
            .evaluator
            .run(&self.program)
            .map_err(RetraceError::from)?;
        self.runs += 1;
        debug!(run = self.runs, "run complete");
        Ok(RunOutcome {
            value,
            output: self.evaluator.take_output(),
        })
    }

    /// Deliver an inbound request to the handler the last run registered
    /// with `listen`.
    pub fn request(&mut self, body: &Json) -> Result<Response> {
        let (conversation, response) = self
            .evaluator
            .request(body)
            .map_err(RetraceError::from)?;
        debug!(conversation = %conversation, responded = response.is_some(), "request complete");
        Ok(Response {
            conversation,
            body: response,
            output: self.evaluator.take_output(),
        })
    }

    /// The merged trace of every execution so far; `None` for a plain runtime.
    pub fn trace(&self) -> Option<Exp> {
        self.recorder().map(Recorder::get_trace)
    }

    /// The recorder behind the trace; `None` for a plain runtime.
    pub fn recorder(&self) -> Option<&Recorder> {
        self.evaluator.callbacks().recorder()
    }

    pub fn trace_json(&self) -> Option<Json> {
        self.trace().map(|trace| trace.to_json())
    }
}
