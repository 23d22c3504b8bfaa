/*!
# Evaluator

A tree-walking interpreter for the script subset. It runs the original
program and the instrumented one alike; the instrumented program reaches the
recorder through the `cb.trace` natives, so running it is what builds the
trace.

Values follow the host language for the supported constructs: numbers are
`f64`, arrays and objects are shared by reference, closures capture their
defining environment by reference.

Asynchronous callbacks (`immediate`, outbound requests) are queued and run
after the synchronous part of the program, in registration order.
*/

pub mod errors;
mod natives;
pub mod value;

pub use errors::{EvalError, EvalResult};
pub use value::{Closure, Environment, Native, Value};

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::rc::Rc;

use serde_json::Value as Json;
use tracing::{debug, trace};

use crate::ast::{BinaryOp, DeclKind, Expr, ExprKind, Pattern, Program, Stmt, StmtKind, UnaryOp};
use crate::callbacks::{Callbacks, ConversationId, Registration};
use crate::RetraceConfig;

/// Control flow result for handling break/return
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    None(Value),
    Break(Option<String>),
    Return(Value),
}

/// A callback waiting in the task queue
struct Task {
    registration: Registration,
    callback: Value,
    arg: Value,
}

struct Listener {
    registration: Registration,
    callback: Value,
}

pub struct Evaluator {
    config: RetraceConfig,
    callbacks: Callbacks,
    globals: Environment,
    output: Vec<String>,
    tasks: VecDeque<Task>,
    listener: Option<Listener>,
    depth: usize,
}

impl Evaluator {
    pub fn new(config: RetraceConfig, callbacks: Callbacks) -> Self {
        Self {
            config,
            callbacks,
            globals: global_environment(),
            output: Vec::new(),
            tasks: VecDeque::new(),
            listener: None,
            depth: 0,
        }
    }

    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    pub fn into_callbacks(self) -> Callbacks {
        self.callbacks
    }

    /// Lines written by `console.log` and `console.error` so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Forget the previous run's globals, listener and queued callbacks.
    /// The callback adapter, and the trace it holds, are kept.
    pub fn reset(&mut self) {
        self.globals = global_environment();
        for task in self.tasks.drain(..) {
            self.callbacks.discard(&task.registration);
        }
        if let Some(listener) = self.listener.take() {
            self.callbacks.discard(&listener.registration);
        }
        self.depth = 0;
    }

    /// Run a program to completion, including every callback it queues.
    pub fn run(&mut self, program: &Program) -> EvalResult<Value> {
        let globals = self.globals.clone();
        let value = match self.exec_block(&program.body, &globals)? {
            ControlFlow::None(value) | ControlFlow::Return(value) => value,
            ControlFlow::Break(label) => {
                return Err(EvalError::UnknownLabel(label.unwrap_or_default()));
            }
        };
        self.drain()?;
        Ok(value)
    }

    /// Deliver an inbound request to the registered listener and return the
    /// response it produced, if any.
    pub fn request(&mut self, body: &Json) -> EvalResult<(ConversationId, Option<Json>)> {
        let (registration, callback) = match &self.listener {
            Some(listener) => (listener.registration.clone(), listener.callback.clone()),
            None => return Err(EvalError::NoListener),
        };
        let conversation = self.callbacks.open_conversation();
        debug!(conversation = %conversation, "delivering request");
        self.fire(&registration, Some(conversation), &callback, Value::from_json(body))?;
        self.drain()?;
        Ok((conversation, self.callbacks.take_response(conversation)))
    }

    /// Run queued callbacks until the queue is empty.
    pub fn drain(&mut self) -> EvalResult<()> {
        while let Some(task) = self.tasks.pop_front() {
            trace!(event = task.registration.event.name(), "running queued callback");
            self.fire(&task.registration, None, &task.callback, task.arg)?;
        }
        Ok(())
    }

    /// Invoke a registered callback inside its recorder context. The
    /// previous context and conversation are restored even when the
    /// callback fails.
    fn fire(
        &mut self,
        registration: &Registration,
        conversation: Option<ConversationId>,
        callback: &Value,
        arg: Value,
    ) -> EvalResult<()> {
        let scope = self.callbacks.enter(registration, conversation)?;
        let result = self.call_value(callback, vec![arg]);
        let left = self.callbacks.leave(scope, result.is_ok());
        result?;
        left?;
        Ok(())
    }

    fn exec_block(&mut self, stmts: &[Stmt], env: &Environment) -> EvalResult<ControlFlow> {
        // Function declarations are visible throughout their block
        for stmt in stmts {
            if let StmtKind::Function { name, params, body } = &stmt.kind {
                let closure = self.make_closure(Some(name.clone()), params, body, env, false);
                env.declare(name, closure, false);
            }
        }
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                ControlFlow::None(_) => {}
                flow => return Ok(flow),
            }
        }
        Ok(ControlFlow::None(Value::Undefined))
    }

    fn exec_scoped(&mut self, stmts: &[Stmt], env: &Environment) -> EvalResult<ControlFlow> {
        self.exec_block(stmts, &env.child())
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Environment) -> EvalResult<ControlFlow> {
        match &stmt.kind {
            StmtKind::Declare { kind, declarations } => {
                for declarator in declarations {
                    let value = match &declarator.init {
                        Some(init) => self.eval(init, env)?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(&declarator.target, value, *kind, env)?;
                }
                Ok(ControlFlow::None(Value::Undefined))
            }
            // Hoisted by exec_block
            StmtKind::Function { .. } => Ok(ControlFlow::None(Value::Undefined)),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.is_truthy() {
                    self.exec_scoped(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.exec_scoped(alternate, env)
                } else {
                    Ok(ControlFlow::None(Value::Undefined))
                }
            }
            StmtKind::While { test, body } => {
                let mut iterations = 0usize;
                while self.eval(test, env)?.is_truthy() {
                    iterations += 1;
                    if iterations > self.config.max_loop_iterations {
                        return Err(EvalError::LoopLimit(self.config.max_loop_iterations));
                    }
                    match self.exec_scoped(body, env)? {
                        ControlFlow::None(_) => {}
                        ControlFlow::Break(None) => break,
                        flow => return Ok(flow),
                    }
                }
                Ok(ControlFlow::None(Value::Undefined))
            }
            StmtKind::Labeled { label, body } => match self.exec_scoped(body, env)? {
                ControlFlow::Break(Some(target)) if &target == label => {
                    Ok(ControlFlow::None(Value::Undefined))
                }
                flow => Ok(flow),
            },
            StmtKind::Break { label } => Ok(ControlFlow::Break(label.clone())),
            StmtKind::Return { value } => {
                let value = match value {
                    Some(value) => self.eval(value, env)?,
                    None => Value::Undefined,
                };
                Ok(ControlFlow::Return(value))
            }
            StmtKind::Block(body) => self.exec_scoped(body, env),
            StmtKind::Expr(expr) => Ok(ControlFlow::None(self.eval(expr, env)?)),
        }
    }

    fn bind_pattern(&mut self, pattern: &Pattern, value: Value, kind: DeclKind, env: &Environment) -> EvalResult<()> {
        let constant = kind == DeclKind::Const;
        match pattern {
            Pattern::Identifier(name) => env.declare(name, value, constant),
            Pattern::Array(names) => {
                let Value::Array(elements) = &value else {
                    return Err(EvalError::type_error(
                        "array destructuring",
                        "an array",
                        value.describe(),
                    ));
                };
                let elements = elements.borrow();
                for (i, name) in names.iter().enumerate() {
                    let element = elements.get(i).cloned().unwrap_or(Value::Undefined);
                    env.declare(name, element, constant);
                }
            }
        }
        Ok(())
    }

    fn make_closure(
        &self,
        name: Option<String>,
        params: &[String],
        body: &[Stmt],
        env: &Environment,
        binds_self: bool,
    ) -> Value {
        Value::Function(Rc::new(Closure {
            name,
            params: params.to_vec(),
            body: Rc::new(body.to_vec()),
            env: env.clone(),
            binds_self,
        }))
    }

    pub fn eval(&mut self, expr: &Expr, env: &Environment) -> EvalResult<Value> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Boolean(b) => Ok(Value::Boolean(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Identifier(name) => env
                .get(name)
                .ok_or_else(|| EvalError::variable_not_found(name)),
            ExprKind::Array(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval(element, env)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::Object(entries) => {
                let mut properties = indexmap::IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let value = self.eval(value, env)?;
                    properties.insert(key.clone(), value);
                }
                Ok(Value::object(properties))
            }
            ExprKind::Function { name, params, body } => {
                Ok(self.make_closure(name.clone(), params, body, env, name.is_some()))
            }
            ExprKind::Member { object, property } => {
                let object = self.eval(object, env)?;
                self.get_property(&object, property)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                self.get_index(&object, &index)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, env),
            ExprKind::Unary { op, operand } => {
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Not => Value::Boolean(!value.is_truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Typeof => Value::string(value.type_of()),
                    UnaryOp::Void => Value::Undefined,
                })
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                match op {
                    BinaryOp::And if !left.is_truthy() => Ok(left),
                    BinaryOp::Or if left.is_truthy() => Ok(left),
                    BinaryOp::And | BinaryOp::Or => self.eval(right, env),
                    _ => {
                        let right = self.eval(right, env)?;
                        Ok(binary(*op, &left, &right))
                    }
                }
            }
            ExprKind::Assign { op, target, value } => {
                let value = self.eval(value, env)?;
                let value = match op.binary() {
                    None => value,
                    Some(binary_op) => {
                        let current = self.eval(target, env)?;
                        binary(binary_op, &current, &value)
                    }
                };
                self.assign(target, value.clone(), env)?;
                Ok(value)
            }
            ExprKind::Update { op, prefix, target } => {
                let old = Value::Number(self.eval(target, env)?.to_number());
                let new = binary(op.binary(), &old, &Value::Number(1.0));
                self.assign(target, new.clone(), env)?;
                Ok(if *prefix { new } else { old })
            }
        }
    }

    fn assign(&mut self, target: &Expr, value: Value, env: &Environment) -> EvalResult<()> {
        match &target.kind {
            ExprKind::Identifier(name) => env.set(name, value),
            ExprKind::Member { object, property } => {
                let object = self.eval(object, env)?;
                self.set_index(&object, &Value::string(property.clone()), value)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval(object, env)?;
                let index = self.eval(index, env)?;
                self.set_index(&object, &index, value)
            }
            _ => Err(EvalError::type_error(
                "assignment",
                "an identifier or member",
                target.describe(),
            )),
        }
    }

    fn get_property(&self, object: &Value, property: &str) -> EvalResult<Value> {
        match (object, property) {
            (Value::Array(elements), "length") => Ok(Value::Number(elements.borrow().len() as f64)),
            (Value::String(s), "length") => Ok(Value::Number(s.encode_utf16().count() as f64)),
            (Value::Object(properties), _) => Ok(properties
                .borrow()
                .get(property)
                .cloned()
                .unwrap_or(Value::Undefined)),
            (Value::Undefined | Value::Null, _) => Err(EvalError::type_error(
                &format!("reading `{property}`"),
                "an object",
                object.describe(),
            )),
            _ => Ok(Value::Undefined),
        }
    }

    fn get_index(&self, object: &Value, index: &Value) -> EvalResult<Value> {
        match (object, index) {
            (Value::Array(elements), Value::Number(n)) => Ok(array_slot(*n)
                .and_then(|i| elements.borrow().get(i).cloned())
                .unwrap_or(Value::Undefined)),
            (Value::String(s), Value::Number(n)) => Ok(array_slot(*n)
                .and_then(|i| s.encode_utf16().nth(i))
                .map(|unit| Value::String(String::from_utf16_lossy(&[unit])))
                .unwrap_or(Value::Undefined)),
            _ => self.get_property(object, &index.to_js_string()),
        }
    }

    fn set_index(&self, object: &Value, index: &Value, value: Value) -> EvalResult<()> {
        match (object, index) {
            (Value::Array(elements), Value::Number(n)) => {
                let Some(i) = array_slot(*n) else {
                    return Err(EvalError::type_error("array write", "an index", &index.to_js_string()));
                };
                let limit = self.config.max_array_length;
                if i >= limit {
                    return Err(EvalError::ArrayLength { index: i, limit });
                }
                let mut elements = elements.borrow_mut();
                if i >= elements.len() {
                    elements.resize(i + 1, Value::Undefined);
                }
                elements[i] = value;
                Ok(())
            }
            (Value::Object(properties), _) => {
                properties.borrow_mut().insert(index.to_js_string(), value);
                Ok(())
            }
            _ => Err(EvalError::type_error(
                &format!("writing `{}`", index.to_js_string()),
                "an object",
                object.describe(),
            )),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], env: &Environment) -> EvalResult<Value> {
        let (receiver, function) = match &callee.kind {
            ExprKind::Member { object, property } => {
                let receiver = self.eval(object, env)?;
                let function = self.get_property(&receiver, property)?;
                (Some((receiver, property.as_str())), function)
            }
            _ => (None, self.eval(callee, env)?),
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, env)?);
        }

        if let Some((receiver, method)) = &receiver {
            if !function.is_callable() {
                if let Some(result) = builtin_method(receiver, method, &values)? {
                    return Ok(result);
                }
            }
        }
        if !function.is_callable() {
            return Err(EvalError::NotAFunction(callee.to_string()));
        }
        self.call_value(&function, values)
    }

    /// Call a closure or native with already evaluated arguments.
    pub fn call_value(&mut self, function: &Value, args: Vec<Value>) -> EvalResult<Value> {
        match function {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Native(native) => self.call_native(native, args),
            other => Err(EvalError::NotAFunction(other.to_js_string())),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> EvalResult<Value> {
        if self.depth >= self.config.max_call_depth {
            return Err(EvalError::CallDepth(self.config.max_call_depth));
        }
        let env = closure.env.child();
        if let (true, Some(name)) = (closure.binds_self, &closure.name) {
            env.declare(name, Value::Function(Rc::clone(closure)), false);
        }
        let mut args = args.into_iter();
        for param in &closure.params {
            env.declare(param, args.next().unwrap_or(Value::Undefined), false);
        }

        self.depth += 1;
        let result = self.exec_block(&closure.body, &env);
        self.depth -= 1;
        match result? {
            ControlFlow::None(_) => Ok(Value::Undefined),
            ControlFlow::Return(value) => Ok(value),
            ControlFlow::Break(label) => Err(EvalError::UnknownLabel(label.unwrap_or_default())),
        }
    }
}

fn global_environment() -> Environment {
    let globals = Environment::new();
    globals.declare("undefined", Value::Undefined, true);
    globals.declare("require", Value::Native(Native::Require), true);
    globals.declare("console", natives::console_module(), true);
    globals
}

/// A non-negative integral number as a vector index.
fn array_slot(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64).then_some(n as usize)
}

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{}{}", left.to_js_string(), right.to_js_string()))
            }
            _ => Value::Number(left.to_number() + right.to_number()),
        },
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Mod => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::StrictEq => Value::Boolean(left.strict_equals(right)),
        BinaryOp::StrictNe => Value::Boolean(!left.strict_equals(right)),
        BinaryOp::LooseEq => Value::Boolean(left.loose_equals(right)),
        BinaryOp::LooseNe => Value::Boolean(!left.loose_equals(right)),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Value::Boolean(ordering.is_some_and(|ordering| match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Le => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }
        // Short-circuiting forms are handled by the caller
        BinaryOp::And => {
            if left.is_truthy() {
                right.clone()
            } else {
                left.clone()
            }
        }
        BinaryOp::Or => {
            if left.is_truthy() {
                left.clone()
            } else {
                right.clone()
            }
        }
    }
}

/// Array and string methods. `Ok(None)` when the receiver has no such method.
fn builtin_method(receiver: &Value, method: &str, args: &[Value]) -> EvalResult<Option<Value>> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
    let result = match (receiver, method) {
        (Value::Array(elements), "push") => {
            let mut elements = elements.borrow_mut();
            elements.extend(args.iter().cloned());
            Value::Number(elements.len() as f64)
        }
        (Value::Array(elements), "pop") => elements.borrow_mut().pop().unwrap_or(Value::Undefined),
        (Value::Array(elements), "shift") => {
            let mut elements = elements.borrow_mut();
            if elements.is_empty() {
                Value::Undefined
            } else {
                elements.remove(0)
            }
        }
        (Value::Array(elements), "unshift") => {
            let mut elements = elements.borrow_mut();
            for (i, value) in args.iter().enumerate() {
                elements.insert(i, value.clone());
            }
            Value::Number(elements.len() as f64)
        }
        (Value::Array(elements), "includes") => {
            let needle = arg(0);
            let found = elements.borrow().iter().any(|element| match (element, &needle) {
                (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
                _ => element.strict_equals(&needle),
            });
            Value::Boolean(found)
        }
        (Value::String(s), "startsWith") => Value::Boolean(s.starts_with(&arg(0).to_js_string())),
        (Value::String(s), "endsWith") => Value::Boolean(s.ends_with(&arg(0).to_js_string())),
        (Value::String(s), "includes") => Value::Boolean(s.contains(&arg(0).to_js_string())),
        _ => return Ok(None),
    };
    Ok(Some(result))
}
