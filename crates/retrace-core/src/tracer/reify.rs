// Lowering of script expressions into expressions that build their trace IR
// at run time: `x + 1` becomes `exp.binop("+", exp.identifier("x"), exp.number(1))`.

use super::env::{Binding, CaptureEnv};
use super::primitives::PrimitiveTable;
use super::{InstrumentError, InstrumentOptions, TransformResult};
use crate::ast::{Expr, ExprKind, Span};

/// Name of the closure value inside every instrumented function body.
pub const CLOSURE_PARAM: &str = "$clos";

pub struct Reifier<'a> {
    options: &'a InstrumentOptions,
    primitives: &'a PrimitiveTable,
}

impl<'a> Reifier<'a> {
    pub fn new(options: &'a InstrumentOptions, primitives: &'a PrimitiveTable) -> Self {
        Self {
            options,
            primitives,
        }
    }

    /// `exp.<name>(args...)`
    pub fn builder(&self, name: &str, args: Vec<Expr>) -> Expr {
        Expr::method_call(Expr::ident(&self.options.exp_binding), name, args)
    }

    pub fn undefined(&self) -> Expr {
        Expr::member(Expr::ident(&self.options.exp_binding), "undefined_")
    }

    /// The IR for a reference to `name`.
    pub fn variable(&self, name: &str, span: Span, env: CaptureEnv) -> (Expr, CaptureEnv) {
        if name == "undefined" {
            return (self.undefined(), env);
        }
        if self.primitives.is_global(name) {
            return (self.builder("identifier", vec![Expr::string(name)]), env);
        }
        let (binding, env) = env.resolve(name, span);
        (self.binding_source(name, binding), env)
    }

    fn binding_source(&self, name: &str, binding: Binding) -> Expr {
        match binding {
            Binding::Local => self.builder("identifier", vec![Expr::string(name)]),
            Binding::Captured => self.builder(
                "from",
                vec![Expr::ident(CLOSURE_PARAM), Expr::string(name)],
            ),
        }
    }

    /// `exp.clos({ x: exp.identifier("x"), y: exp.from($clos, "y") })`
    ///
    /// `own` is a function expression's own name and the variable holding
    /// it, `{ h: exp.identifier("g") }` for `let g = function h() {..}`.
    pub fn closure_record(&self, own: Option<(&str, &str)>, sources: &[(String, Binding)]) -> Expr {
        let own = own.map(|(own_name, target)| {
            (
                own_name.to_string(),
                self.binding_source(target, Binding::Local),
            )
        });
        let fields = own
            .into_iter()
            .chain(
                sources
                    .iter()
                    .map(|(name, binding)| (name.clone(), self.binding_source(name, *binding))),
            )
            .collect();
        self.builder("clos", vec![Expr::object(fields)])
    }

    pub fn reify(&self, expr: &Expr, env: CaptureEnv) -> TransformResult<(Expr, CaptureEnv)> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Number(value) => Ok((self.builder("number", vec![Expr::number(*value)]), env)),
            ExprKind::String(value) => Ok((
                self.builder("string", vec![Expr::string(value.clone())]),
                env,
            )),
            ExprKind::Boolean(value) => Ok((self.builder("boolean", vec![Expr::boolean(*value)]), env)),
            ExprKind::Identifier(name) => Ok(self.variable(name, span, env)),
            ExprKind::Array(elements) => {
                let (elements, env) = self.reify_all(elements, env)?;
                Ok((self.builder("array", vec![Expr::array(elements)]), env))
            }
            ExprKind::Object(entries) => {
                let mut fields = Vec::with_capacity(entries.len());
                let mut env = env;
                for (key, value) in entries {
                    let (value, next) = self.reify(value, env)?;
                    fields.push((key.clone(), value));
                    env = next;
                }
                Ok((self.builder("obj", vec![Expr::object(fields)]), env))
            }
            ExprKind::Member { object, property } => {
                let (object, env) = self.reify(object, env)?;
                Ok((
                    self.builder("get", vec![object, Expr::string(property.clone())]),
                    env,
                ))
            }
            ExprKind::Index { object, index } => {
                let (object, env) = self.reify(object, env)?;
                let (index, env) = self.reify(index, env)?;
                Ok((self.builder("index", vec![object, index]), env))
            }
            ExprKind::Unary { op, operand } => {
                let (operand, env) = self.reify(operand, env)?;
                Ok((
                    self.builder("op1", vec![Expr::string(op.symbol()), operand]),
                    env,
                ))
            }
            ExprKind::Binary { op, left, right } => {
                let (left, env) = self.reify(left, env)?;
                let (right, env) = self.reify(right, env)?;
                Ok((
                    self.builder("binop", vec![Expr::string(op.symbol()), left, right]),
                    env,
                ))
            }
            // Calls, assignments, updates and function expressions are
            // statements after normalization
            ExprKind::Null
            | ExprKind::Function { .. }
            | ExprKind::Call { .. }
            | ExprKind::Assign { .. }
            | ExprKind::Update { .. } => Err(InstrumentError::unsupported(
                format!("{} in traced expression", expr.describe()),
                span,
            )),
        }
    }

    pub fn reify_all(&self, exprs: &[Expr], env: CaptureEnv) -> TransformResult<(Vec<Expr>, CaptureEnv)> {
        let mut out = Vec::with_capacity(exprs.len());
        let mut env = env;
        for expr in exprs {
            let (expr, next) = self.reify(expr, env)?;
            out.push(expr);
            env = next;
        }
        Ok((out, env))
    }
}
