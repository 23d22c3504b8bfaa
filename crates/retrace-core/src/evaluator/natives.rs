// Native modules: `console`, the IR builders (`exp`) and the callbacks
// module (`cb`) whose `trace` object is the recorder.

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::errors::{EvalError, EvalResult};
use super::value::{Native, Value};
use super::{Evaluator, Listener, Task};
use crate::callbacks::Event;
use crate::exp::builders;
use crate::exp::{BinOp, Exp, LVal, Op1};
use crate::recorder::MAX_ARITY;

const BUILDERS: &[&str] = &[
    "unknown",
    "number",
    "boolean",
    "string",
    "identifier",
    "from",
    "froms",
    "get",
    "binop",
    "op1",
    "let_",
    "set",
    "block",
    "if_",
    "while_",
    "callback",
    "label",
    "break_",
    "clos",
    "obj",
    "array",
    "index",
    "methodCall",
    "primApp",
];

const TRACE_OPS: &[&str] = &[
    "newTrace",
    "exitBlock",
    "traceLet",
    "traceSet",
    "tracePrimApp",
    "traceIfTrue",
    "traceIfFalse",
    "traceWhile",
    "traceLoop",
    "traceLabel",
    "traceBreak",
    "traceFunctionCall",
    "traceFunctionBody",
    "pushArgs",
    "popArgs",
    "getTrace",
];

pub(super) fn console_module() -> Value {
    Value::object(
        ["log", "error"]
            .into_iter()
            .map(|method| (method.to_string(), Value::Native(Native::Console(method.to_string()))))
            .collect(),
    )
}

fn exp_module() -> Value {
    let mut properties: IndexMap<String, Value> = BUILDERS
        .iter()
        .map(|name| (name.to_string(), Value::Native(Native::Builder(name.to_string()))))
        .collect();
    properties.insert("undefined_".to_string(), Value::exp(Exp::Undefined));
    Value::object(properties)
}

fn callbacks_module() -> Value {
    let trace: IndexMap<String, Value> = TRACE_OPS
        .iter()
        .map(|op| (op.to_string(), Value::Native(Native::Trace(op.to_string()))))
        .collect();
    let mut properties: IndexMap<String, Value> = Event::ALL
        .into_iter()
        .map(|event| (event.name().to_string(), Value::Native(Native::Host(event))))
        .collect();
    properties.insert("respond".to_string(), Value::Native(Native::Respond));
    properties.insert("trace".to_string(), Value::object(trace));
    Value::object(properties)
}

/// Positional access to native arguments with typed conversions.
struct Args<'a> {
    operation: &'a str,
    values: Vec<Value>,
}

impl<'a> Args<'a> {
    fn new(operation: &'a str, values: Vec<Value>) -> Self {
        Self { operation, values }
    }

    fn value(&self, i: usize) -> Value {
        self.values.get(i).cloned().unwrap_or(Value::Undefined)
    }

    fn mismatch(&self, expected: &str, actual: &Value) -> EvalError {
        EvalError::type_error(self.operation, expected, actual.describe())
    }

    fn string(&self, i: usize) -> EvalResult<String> {
        match self.value(i) {
            Value::String(s) => Ok(s),
            other => Err(self.mismatch("a string", &other)),
        }
    }

    fn number(&self, i: usize) -> EvalResult<f64> {
        match self.value(i) {
            Value::Number(n) => Ok(n),
            other => Err(self.mismatch("a number", &other)),
        }
    }

    fn boolean(&self, i: usize) -> EvalResult<bool> {
        match self.value(i) {
            Value::Boolean(b) => Ok(b),
            other => Err(self.mismatch("a boolean", &other)),
        }
    }

    fn exp(&self, i: usize) -> EvalResult<Exp> {
        to_exp(&self.value(i)).ok_or_else(|| self.mismatch("a trace expression", &self.value(i)))
    }

    fn exps(&self, i: usize) -> EvalResult<Vec<Exp>> {
        let value = self.value(i);
        let Value::Array(elements) = &value else {
            return Err(self.mismatch("an array of trace expressions", &value));
        };
        let elements = elements.borrow();
        elements
            .iter()
            .map(|element| to_exp(element).ok_or_else(|| self.mismatch("a trace expression", element)))
            .collect()
    }

    fn strings(&self, i: usize) -> EvalResult<Vec<String>> {
        let value = self.value(i);
        let Value::Array(elements) = &value else {
            return Err(self.mismatch("an array of strings", &value));
        };
        let elements = elements.borrow();
        elements
            .iter()
            .map(|element| match element {
                Value::String(s) => Ok(s.clone()),
                other => Err(self.mismatch("a string", other)),
            })
            .collect()
    }

    fn exp_map(&self, i: usize) -> EvalResult<IndexMap<String, Exp>> {
        let value = self.value(i);
        let Value::Object(properties) = &value else {
            return Err(self.mismatch("an object of trace expressions", &value));
        };
        let properties = properties.borrow();
        properties
            .iter()
            .map(|(key, element)| {
                to_exp(element)
                    .map(|exp| (key.clone(), exp))
                    .ok_or_else(|| self.mismatch("a trace expression", element))
            })
            .collect()
    }

    fn lval(&self, i: usize) -> EvalResult<LVal> {
        LVal::try_from(self.exp(i)?).map_err(|exp| {
            EvalError::type_error(self.operation, "an assignable expression", exp.kind_name())
        })
    }

    fn callback(&self) -> EvalResult<Value> {
        match self.values.last() {
            Some(value) if value.is_callable() => Ok(value.clone()),
            Some(other) => Err(self.mismatch("a callback function", other)),
            None => Err(EvalError::type_error(self.operation, "a callback function", "nothing")),
        }
    }
}

fn to_exp(value: &Value) -> Option<Exp> {
    match value {
        Value::Exp(exp) => Some(exp.as_ref().clone()),
        _ => None,
    }
}

fn exps_value(exps: Vec<Exp>) -> Value {
    Value::array(exps.into_iter().map(Value::exp).collect())
}

fn build(name: &str, args: &Args<'_>) -> EvalResult<Value> {
    let exp = match name {
        "unknown" => builders::unknown(),
        "number" => builders::number(args.number(0)?),
        "boolean" => builders::boolean(args.boolean(0)?),
        "string" => builders::string(args.string(0)?),
        "identifier" => builders::identifier(args.string(0)?),
        "from" => builders::from(args.exp(0)?, args.string(1)?),
        "froms" => {
            let clos = args.exp(0)?;
            let froms = args
                .strings(1)?
                .into_iter()
                .map(|field| builders::from(clos.clone(), field))
                .collect();
            return Ok(exps_value(froms));
        }
        "get" => builders::get(args.exp(0)?, args.string(1)?),
        "binop" => {
            let symbol = args.string(0)?;
            let op = BinOp::from_symbol(&symbol)
                .ok_or_else(|| EvalError::type_error("binop", "a binary operator", &symbol))?;
            builders::binop(op, args.exp(1)?, args.exp(2)?)
        }
        "op1" => {
            let symbol = args.string(0)?;
            let op = Op1::from_symbol(&symbol)
                .ok_or_else(|| EvalError::type_error("op1", "a unary operator", &symbol))?;
            builders::op1(op, args.exp(1)?)
        }
        "let_" => builders::let_(args.string(0)?, args.exp(1)?),
        "set" => builders::set(args.lval(0)?, args.exp(1)?),
        "block" => builders::block(args.exps(0)?),
        "if_" => builders::if_(args.exp(0)?, args.exps(1)?, args.exps(2)?),
        "while_" => builders::while_(args.exp(0)?, args.exps(1)?),
        "callback" => builders::callback(
            args.string(0)?,
            args.exp(1)?,
            args.strings(2)?,
            args.exp(3)?,
            args.exps(4)?,
        ),
        "label" => builders::label(args.string(0)?, args.exps(1)?),
        "break_" => builders::break_(args.string(0)?, args.exp(1)?),
        "clos" => builders::clos(args.exp_map(0)?),
        "obj" => builders::object(args.exp_map(0)?),
        "array" => builders::array(args.exps(0)?),
        "index" => builders::index(args.exp(0)?, args.exp(1)?),
        "methodCall" => builders::method_call(args.exp(0)?, args.string(1)?, args.exps(2)?),
        "primApp" => builders::prim_app(args.string(0)?, args.exps(1)?),
        other => return Err(EvalError::NotAFunction(format!("exp.{other}"))),
    };
    Ok(Value::exp(exp))
}

/// The URL and body of an outbound request: `get(url, cb)` or
/// `post({url, body}, cb)`.
fn request_target(event: Event, target: &Value) -> EvalResult<(String, Option<serde_json::Value>)> {
    match target {
        Value::String(url) => Ok((url.clone(), None)),
        Value::Object(properties) => {
            let properties = properties.borrow();
            match properties.get("url") {
                Some(Value::String(url)) => {
                    Ok((url.clone(), properties.get("body").map(Value::to_json)))
                }
                _ => Err(EvalError::type_error(event.name(), "a `url` property", "none")),
            }
        }
        other => Err(EvalError::type_error(
            event.name(),
            "a URL or request object",
            other.describe(),
        )),
    }
}

impl Evaluator {
    pub(super) fn call_native(&mut self, native: &Native, values: Vec<Value>) -> EvalResult<Value> {
        match native {
            Native::Require => {
                let args = Args::new("require", values);
                let module = args.string(0)?;
                if module == self.config.instrument.exp_module {
                    Ok(exp_module())
                } else if module == self.config.instrument.callbacks_module {
                    Ok(callbacks_module())
                } else {
                    Err(EvalError::UnknownModule(module))
                }
            }
            Native::Console(method) => {
                let line: Vec<String> = values.iter().map(Value::inspect).collect();
                let line = line.join(" ");
                debug!(stream = method.as_str(), line = line.as_str(), "console");
                self.output.push(line);
                Ok(Value::Undefined)
            }
            Native::Builder(name) => build(name, &Args::new(name, values)),
            Native::Trace(op) => self.call_trace(op, &Args::new(op, values)),
            Native::Host(event) => self.call_host(*event, Args::new(event.name(), values)),
            Native::Respond => {
                let args = Args::new("respond", values);
                self.callbacks.respond(args.value(0).to_json())?;
                Ok(Value::Undefined)
            }
        }
    }

    fn call_trace(&mut self, op: &str, args: &Args<'_>) -> EvalResult<Value> {
        let recorder = self.callbacks.trace()?;
        match op {
            "newTrace" => recorder.new_trace()?,
            "exitBlock" => recorder.exit_block()?,
            "traceLet" => recorder.trace_let(&args.string(0)?, args.exp(1)?)?,
            "traceSet" => recorder.trace_set(args.lval(0)?, args.exp(1)?)?,
            "tracePrimApp" => recorder.trace_prim_app(&args.string(0)?, args.exps(1)?)?,
            "traceIfTrue" => recorder.trace_if_true(args.exp(0)?)?,
            "traceIfFalse" => recorder.trace_if_false(args.exp(0)?)?,
            "traceWhile" => recorder.trace_while(args.exp(0)?)?,
            "traceLoop" => recorder.trace_loop()?,
            "traceLabel" => recorder.trace_label(&args.string(0)?)?,
            "traceBreak" => recorder.trace_break(&args.string(0)?, args.exp(1)?)?,
            "traceFunctionCall" => recorder.trace_function_call(&args.string(0)?, args.exps(1)?)?,
            "traceFunctionBody" => {
                let label = args.string(0)?;
                let arity = args.number(1)?;
                if !(arity >= 0.0 && arity.fract() == 0.0 && arity <= MAX_ARITY as f64) {
                    return Err(EvalError::type_error(
                        "trace.traceFunctionBody",
                        "a parameter count",
                        &Value::Number(arity).to_js_string(),
                    ));
                }
                let bindings = recorder.trace_function_body(&label, arity as usize)?;
                return Ok(exps_value(bindings));
            }
            "pushArgs" => recorder.push_args(args.exps(0)?)?,
            "popArgs" => return Ok(exps_value(recorder.pop_args()?)),
            "getTrace" => return Ok(Value::exp(recorder.get_trace())),
            other => return Err(EvalError::NotAFunction(format!("trace.{other}"))),
        }
        Ok(Value::Undefined)
    }

    fn call_host(&mut self, event: Event, args: Args<'_>) -> EvalResult<Value> {
        let callback = args.callback()?;
        let registration = self.callbacks.register(event)?;
        match event {
            Event::Listen => {
                if self.listener.is_some() {
                    self.callbacks.discard(&registration);
                    return Err(EvalError::ListenTwice);
                }
                self.listener = Some(Listener {
                    registration,
                    callback,
                });
            }
            Event::Immediate => self.tasks.push_back(Task {
                registration,
                callback,
                arg: args.value(0),
            }),
            _ => {
                let (url, body) = request_target(event, &args.value(0))?;
                if url.starts_with("data:") {
                    // Answered without I/O, so the callback runs right away
                    let response = self.callbacks.fetch(event, &url, body.as_ref())?;
                    self.fire(&registration, None, &callback, Value::from_json(&response))?;
                } else {
                    let arg = match self.callbacks.fetch(event, &url, body.as_ref()) {
                        Ok(response) => Value::from_json(&response),
                        Err(error) => {
                            warn!(event = event.name(), url = url.as_str(), error = %error, "request failed");
                            Value::Undefined
                        }
                    };
                    self.tasks.push_back(Task {
                        registration,
                        callback,
                        arg,
                    });
                }
            }
        }
        Ok(Value::Undefined)
    }
}
