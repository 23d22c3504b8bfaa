// Run-time values and scopes of the script subset

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value as Json};

use super::errors::{EvalError, EvalResult};
use crate::ast::Stmt;
use crate::callbacks::Event;
use crate::exp::Exp;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<IndexMap<String, Value>>>),
    Function(Rc<Closure>),
    Native(Native),
    /// A trace expression built by the IR-builder module
    Exp(Rc<Exp>),
}

pub struct Closure {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Rc<Vec<Stmt>>,
    pub env: Environment,
    /// Named function expressions see their own name
    pub binds_self: bool,
}

/// Functions implemented by the runtime rather than by script code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Native {
    Require,
    Console(String),
    /// `exp.<name>(...)`
    Builder(String),
    /// `cb.trace.<name>(...)`
    Trace(String),
    /// `cb.get`, `cb.listen`, ...
    Host(Event),
    Respond,
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn object(properties: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(properties)))
    }

    pub fn exp(exp: Exp) -> Self {
        Value::Exp(Rc::new(exp))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Exp(_) => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) | Value::Native(_) => "function",
        }
    }

    /// Name used in type errors; finer than `typeof`.
    pub fn describe(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Exp(_) => "trace expression",
            other => other.type_of(),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Native(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// `String(value)`
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(elements) => elements
                .borrow()
                .iter()
                .map(|element| match element {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(closure) => {
                format!("function {}() {{ ... }}", closure.name.as_deref().unwrap_or(""))
            }
            Value::Native(_) => "function () { [native code] }".to_string(),
            Value::Exp(exp) => exp.to_string(),
        }
    }

    /// How `console.log` prints a value.
    pub fn inspect(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.inspect_nested(),
        }
    }

    fn inspect_nested(&self) -> String {
        match self {
            Value::String(s) => format!("'{s}'"),
            Value::Array(elements) => {
                let elements = elements.borrow();
                if elements.is_empty() {
                    return "[]".to_string();
                }
                let parts: Vec<String> = elements.iter().map(Value::inspect_nested).collect();
                format!("[ {} ]", parts.join(", "))
            }
            Value::Object(properties) => {
                let properties = properties.borrow();
                if properties.is_empty() {
                    return "{}".to_string();
                }
                let parts: Vec<String> = properties
                    .iter()
                    .map(|(key, value)| format!("{key}: {}", value.inspect_nested()))
                    .collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Value::Function(closure) => match &closure.name {
                Some(name) => format!("[Function: {name}]"),
                None => "[Function (anonymous)]".to_string(),
            },
            other => other.to_js_string(),
        }
    }

    /// `===`: primitives by value, everything else by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a == b,
            (Value::Exp(a), Value::Exp(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`, limited to same-type comparisons and `null == undefined`.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            _ => self.strict_equals(other),
        }
    }

    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(elements) => Value::array(elements.iter().map(Value::from_json).collect()),
            Json::Object(properties) => Value::object(
                properties
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// `JSON.stringify`-like conversion; functions and `undefined` become null.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) | Value::Native(_) => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Number(n) => Number::from_f64(*n).map(Json::Number).unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(elements) => Json::Array(elements.borrow().iter().map(Value::to_json).collect()),
            Value::Object(properties) => Json::Object(
                properties
                    .borrow()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Value::Exp(exp) => exp.to_json(),
        }
    }
}

/// Numbers print without a fractional part when they have none.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

// Structural equality, for tests and assertions
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => *a.borrow() == *b.borrow(),
            (Value::Object(a), Value::Object(b)) => *a.borrow() == *b.borrow(),
            (Value::Exp(a), Value::Exp(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Exp(exp) => write!(f, "Exp({exp})"),
            Value::Native(native) => write!(f, "Native({native:?})"),
            other => f.write_str(&other.inspect_nested()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

#[derive(Default)]
struct Scope {
    variables: HashMap<String, Value>,
    const_bindings: HashSet<String>,
    parent: Option<Environment>,
}

/// A chain of block scopes. Closures hold their defining environment by
/// reference, so writes through one closure are seen by every other.
#[derive(Clone, Default)]
pub struct Environment {
    scope: Rc<RefCell<Scope>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            scope: Rc::new(RefCell::new(Scope {
                parent: Some(self.clone()),
                ..Scope::default()
            })),
        }
    }

    pub fn declare(&self, name: &str, value: Value, constant: bool) {
        let mut scope = self.scope.borrow_mut();
        if constant {
            scope.const_bindings.insert(name.to_string());
        } else {
            scope.const_bindings.remove(name);
        }
        scope.variables.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let scope = self.scope.borrow();
        match scope.variables.get(name) {
            Some(value) => Some(value.clone()),
            None => scope.parent.as_ref().and_then(|parent| parent.get(name)),
        }
    }

    pub fn set(&self, name: &str, value: Value) -> EvalResult<()> {
        let mut scope = self.scope.borrow_mut();
        if scope.variables.contains_key(name) {
            if scope.const_bindings.contains(name) {
                return Err(EvalError::ConstAssignment(name.to_string()));
            }
            scope.variables.insert(name.to_string(), value);
            return Ok(());
        }
        match &scope.parent {
            Some(parent) => parent.set(name, value),
            None => Err(EvalError::variable_not_found(name)),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = self.scope.borrow();
        let mut names: Vec<&String> = scope.variables.keys().collect();
        names.sort();
        f.debug_struct("Environment").field("names", &names).finish()
    }
}
