/*!
# Primitive Calls

Calls the recorder traces as something other than a user function call:
`require("module")`, console output and the array/string methods the trace
interpreter implements natively.
*/

use crate::ast::{Expr, ExprKind};

/// How a call site is traced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallKind<'a> {
    /// `require("path")` with a literal path
    Require(&'a str),
    /// `console.log(...)` and friends
    Console { method: &'a str },
    /// A native method on an array or string value
    Method { object: &'a Expr, method: &'a str },
    /// Anything else: a user function, or a host function entered through
    /// the callback adapter
    Function,
}

/// Known primitive names.
#[derive(Debug, Clone)]
pub struct PrimitiveTable {
    console_object: String,
    console_methods: Vec<String>,
    traced_methods: Vec<String>,
    globals: Vec<String>,
}

impl PrimitiveTable {
    pub fn new() -> Self {
        Self {
            console_object: "console".to_string(),
            console_methods: vec!["log".to_string(), "error".to_string()],
            traced_methods: vec![
                "push".to_string(),
                "pop".to_string(),
                "shift".to_string(),
                "unshift".to_string(),
                "startsWith".to_string(),
                "endsWith".to_string(),
                "includes".to_string(),
            ],
            globals: vec!["console".to_string(), "require".to_string()],
        }
    }

    /// Trace calls to `method` as method calls.
    pub fn add_method(mut self, method: &str) -> Self {
        self.traced_methods.push(method.to_string());
        self
    }

    /// Names provided by the host that are never captured.
    pub fn add_global(mut self, name: &str) -> Self {
        self.globals.push(name.to_string());
        self
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.iter().any(|global| global == name)
    }

    pub fn classify<'a>(&self, callee: &'a Expr, args: &'a [Expr]) -> CallKind<'a> {
        match &callee.kind {
            ExprKind::Identifier(name) if name == "require" => match args {
                [Expr {
                    kind: ExprKind::String(path),
                    ..
                }] => CallKind::Require(path),
                _ => CallKind::Function,
            },
            ExprKind::Member { object, property } => {
                if object.as_identifier() == Some(self.console_object.as_str())
                    && self.console_methods.contains(property)
                {
                    CallKind::Console { method: property }
                } else if self.traced_methods.contains(property) {
                    CallKind::Method {
                        object,
                        method: property,
                    }
                } else {
                    CallKind::Function
                }
            }
            _ => CallKind::Function,
        }
    }

    /// Event name recorded for a console call (`console.log`).
    pub fn console_event(&self, method: &str) -> String {
        format!("{}.{}", self.console_object, method)
    }
}

impl Default for PrimitiveTable {
    fn default() -> Self {
        Self::new()
    }
}
