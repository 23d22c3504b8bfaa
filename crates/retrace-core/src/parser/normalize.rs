/*!
# Normalization

Rewrites a parsed program into the shape the instrumentation pass expects:

- every call is bound by its own `let $tN = f(...)` statement,
- function expressions become function declarations,
- declarations bind one name each,
- compound assignments are spelled out (`x += 1` becomes `x = x + 1`).

Generated names start with `$`, so user identifiers may not.
*/

use tracing::debug;

use super::ParseError;
use crate::ast::*;

type NormalizeResult<T> = std::result::Result<T, ParseError>;

/// Where an expression sits, which decides whether calls may be hoisted out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Evaluated unconditionally, once per execution of the statement
    Free,
    /// Evaluated conditionally or repeatedly; hoisting would change behavior
    Guarded(&'static str),
}

#[derive(Debug, Default)]
pub struct Normalizer {
    temp_counter: usize,
    function_counter: usize,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&mut self, program: Program) -> NormalizeResult<Program> {
        let body = self.stmts(program.body)?;
        debug!(
            temporaries = self.temp_counter,
            lifted_functions = self.function_counter,
            "normalized program"
        );
        Ok(Program::new(body))
    }

    fn fresh_temp(&mut self) -> String {
        let name = format!("$t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn fresh_function(&mut self) -> String {
        let name = format!("$f{}", self.function_counter);
        self.function_counter += 1;
        name
    }

    fn stmts(&mut self, stmts: Vec<Stmt>) -> NormalizeResult<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    fn stmt(&mut self, stmt: Stmt, out: &mut Vec<Stmt>) -> NormalizeResult<()> {
        let span = stmt.span;
        match stmt.kind {
            StmtKind::Declare { kind, declarations } => {
                for Declarator { target, init } in declarations {
                    for name in target.names() {
                        check_name(name, span)?;
                    }
                    let init = init.map(|init| self.bound_value(init, out)).transpose()?;
                    out.push(Stmt::new(
                        StmtKind::Declare {
                            kind,
                            declarations: vec![Declarator { target, init }],
                        },
                        span,
                    ));
                }
            }
            StmtKind::Function { name, params, body } => {
                check_name(&name, span)?;
                let body = self.function_body(&params, body, span)?;
                out.push(Stmt::new(StmtKind::Function { name, params, body }, span));
            }
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                let test = self.lift(test, out, Position::Free)?;
                let consequent = self.stmts(consequent)?;
                let alternate = alternate.map(|alt| self.stmts(alt)).transpose()?;
                out.push(Stmt::new(
                    StmtKind::If {
                        test,
                        consequent,
                        alternate,
                    },
                    span,
                ));
            }
            StmtKind::While { test, body } => {
                let test = self.lift(test, out, Position::Guarded("call in loop condition"))?;
                let body = self.stmts(body)?;
                out.push(Stmt::new(StmtKind::While { test, body }, span));
            }
            StmtKind::Labeled { label, body } => {
                let body = self.stmts(body)?;
                out.push(Stmt::new(StmtKind::Labeled { label, body }, span));
            }
            kind @ StmtKind::Break { .. } => out.push(Stmt::new(kind, span)),
            StmtKind::Return { value } => {
                let value = value
                    .map(|v| self.lift(v, out, Position::Free))
                    .transpose()?;
                out.push(Stmt::new(StmtKind::Return { value }, span));
            }
            StmtKind::Block(body) => {
                let body = self.stmts(body)?;
                out.push(Stmt::new(StmtKind::Block(body), span));
            }
            StmtKind::Expr(expr) => self.expr_stmt(expr, out)?,
        }
        Ok(())
    }

    fn expr_stmt(&mut self, expr: Expr, out: &mut Vec<Stmt>) -> NormalizeResult<()> {
        let span = expr.span;
        match expr.kind {
            ExprKind::Call { .. } => {
                let call = self.call(expr, out)?;
                let temp = self.fresh_temp();
                out.push(let_at(temp, call, span));
            }
            ExprKind::Assign { op, target, value } => {
                let target = self.lift(*target, out, Position::Guarded("call in assignment target"))?;
                let value = match op.binary() {
                    Some(binary) => Expr::new(
                        ExprKind::Binary {
                            op: binary,
                            left: Box::new(target.clone()),
                            right: value,
                        },
                        span,
                    ),
                    None => *value,
                };
                let value = self.lift(value, out, Position::Free)?;
                out.push(Stmt::expr(Expr::new(
                    ExprKind::Assign {
                        op: AssignOp::Assign,
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                    span,
                )));
            }
            ExprKind::Update { op, prefix, target } => {
                let target = self.lift(*target, out, Position::Guarded("call in update target"))?;
                out.push(Stmt::expr(Expr::new(
                    ExprKind::Update {
                        op,
                        prefix,
                        target: Box::new(target),
                    },
                    span,
                )));
            }
            kind => {
                let expr = self.lift(Expr::new(kind, span), out, Position::Free)?;
                out.push(Stmt::expr(expr));
            }
        }
        Ok(())
    }

    /// Right-hand side of a declaration: a call or function stays in place.
    fn bound_value(&mut self, init: Expr, out: &mut Vec<Stmt>) -> NormalizeResult<Expr> {
        let span = init.span;
        match init.kind {
            ExprKind::Call { .. } => self.call(init, out),
            ExprKind::Function { name, params, body } => {
                let body = self.function_body(&params, body, span)?;
                Ok(Expr::new(ExprKind::Function { name, params, body }, span))
            }
            kind => self.lift(Expr::new(kind, span), out, Position::Free),
        }
    }

    fn function_body(
        &mut self,
        params: &[String],
        body: Vec<Stmt>,
        span: Span,
    ) -> NormalizeResult<Vec<Stmt>> {
        for param in params {
            check_name(param, span)?;
        }
        self.stmts(body)
    }

    /// Normalize the callee and arguments of a call, leaving the call itself.
    fn call(&mut self, call: Expr, out: &mut Vec<Stmt>) -> NormalizeResult<Expr> {
        let span = call.span;
        let ExprKind::Call { callee, args } = call.kind else {
            return Err(ParseError::syntax("expected a call expression", span));
        };
        let callee_span = callee.span;
        let callee = match callee.kind {
            ExprKind::Identifier(_) => self.lift(*callee, out, Position::Free)?,
            ExprKind::Member { object, property } => {
                let object = self.lift(*object, out, Position::Free)?;
                Expr::new(
                    ExprKind::Member {
                        object: Box::new(object),
                        property,
                    },
                    callee_span,
                )
            }
            kind => self.lift(Expr::new(kind, callee_span), out, Position::Free)?,
        };
        let args = args
            .into_iter()
            .map(|arg| self.lift(arg, out, Position::Free))
            .collect::<NormalizeResult<Vec<_>>>()?;
        Ok(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
            span,
        ))
    }

    /// Replace nested calls and function expressions with fresh names bound
    /// by statements pushed onto `out`.
    fn lift(&mut self, expr: Expr, out: &mut Vec<Stmt>, position: Position) -> NormalizeResult<Expr> {
        let span = expr.span;
        let kind = match expr.kind {
            ExprKind::Call { .. } => {
                if let Position::Guarded(construct) = position {
                    return Err(ParseError::unsupported(construct, span));
                }
                let call = self.call(expr, out)?;
                let temp = self.fresh_temp();
                out.push(let_at(temp.clone(), call, span));
                ExprKind::Identifier(temp)
            }
            ExprKind::Function { name, params, body } => {
                let name = match name {
                    Some(name) => {
                        check_name(&name, span)?;
                        name
                    }
                    None => self.fresh_function(),
                };
                let body = self.function_body(&params, body, span)?;
                out.push(Stmt::new(
                    StmtKind::Function {
                        name: name.clone(),
                        params,
                        body,
                    },
                    span,
                ));
                ExprKind::Identifier(name)
            }
            ExprKind::Identifier(name) => {
                check_name(&name, span)?;
                ExprKind::Identifier(name)
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.lift(*left, out, position)?;
                let right_position = if op.is_logical() {
                    Position::Guarded("call in short-circuit operand")
                } else {
                    position
                };
                let right = self.lift(*right, out, right_position)?;
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op,
                operand: Box::new(self.lift(*operand, out, position)?),
            },
            ExprKind::Member { object, property } => ExprKind::Member {
                object: Box::new(self.lift(*object, out, position)?),
                property,
            },
            ExprKind::Index { object, index } => {
                let object = self.lift(*object, out, position)?;
                let index = self.lift(*index, out, position)?;
                ExprKind::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                }
            }
            ExprKind::Array(items) => ExprKind::Array(
                items
                    .into_iter()
                    .map(|item| self.lift(item, out, position))
                    .collect::<NormalizeResult<_>>()?,
            ),
            ExprKind::Object(entries) => ExprKind::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| -> NormalizeResult<(String, Expr)> {
                        Ok((key, self.lift(value, out, position)?))
                    })
                    .collect::<NormalizeResult<_>>()?,
            ),
            ExprKind::Assign { .. } => {
                return Err(ParseError::unsupported("assignment inside expression", span))
            }
            ExprKind::Update { .. } => {
                return Err(ParseError::unsupported("update inside expression", span))
            }
            literal => literal,
        };
        Ok(Expr::new(kind, span))
    }
}

fn check_name(name: &str, span: Span) -> NormalizeResult<()> {
    if name.starts_with('$') {
        return Err(ParseError::ReservedIdentifier {
            name: name.to_string(),
            span,
        });
    }
    Ok(())
}

fn let_at(name: String, init: Expr, span: Span) -> Stmt {
    let mut stmt = Stmt::let_(name, init);
    stmt.span = span;
    stmt
}
