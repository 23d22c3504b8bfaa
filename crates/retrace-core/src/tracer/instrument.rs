/*!
# Statement Rewriter

Walks a normalized program and emits, next to every traced statement, the
recorder call describing it. The original statements are kept as they are,
so the instrumented program computes exactly what the original did.
*/

use tracing::{debug, trace};

use super::env::{Binding, CaptureEnv};
use super::primitives::{CallKind, PrimitiveTable};
use super::reify::{Reifier, CLOSURE_PARAM};
use super::{InstrumentError, InstrumentOptions, TransformResult, TransformationContext};
use crate::ast::*;

pub struct Instrumenter<'a> {
    options: &'a InstrumentOptions,
    primitives: PrimitiveTable,
    test_counter: usize,
    functions: usize,
}

impl<'a> Instrumenter<'a> {
    pub fn new(options: &'a InstrumentOptions) -> Self {
        Self {
            options,
            primitives: PrimitiveTable::new(),
            test_counter: 0,
            functions: 0,
        }
    }

    pub fn with_primitives(mut self, primitives: PrimitiveTable) -> Self {
        self.primitives = primitives;
        self
    }

    pub fn instrument(&mut self, program: &Program) -> TransformResult<Program> {
        let ctx = TransformationContext::new();
        let (body, env) = self.block(&program.body, CaptureEnv::new(), &ctx)?;
        if let Some((name, span)) = env.captures().next() {
            return Err(InstrumentError::UnboundVariable {
                name: name.to_string(),
                span,
            });
        }

        let mut out = Vec::with_capacity(body.len() + 4);
        out.push(self.require(&self.options.exp_binding, &self.options.exp_module));
        out.push(self.require(&self.options.callbacks_binding, &self.options.callbacks_module));
        out.push(self.trace_call("newTrace", Vec::new()));
        out.extend(body);
        out.push(self.trace_call("exitBlock", Vec::new()));

        debug!(
            functions = self.functions,
            conditionals = self.test_counter,
            "instrumented program"
        );
        Ok(Program::new(out))
    }

    fn reifier(&self) -> Reifier<'_> {
        Reifier::new(self.options, &self.primitives)
    }

    fn require(&self, binding: &str, module: &str) -> Stmt {
        let call = Expr::synthetic(ExprKind::Call {
            callee: Box::new(Expr::ident("require")),
            args: vec![Expr::string(module)],
        });
        Stmt::let_(binding, call)
    }

    /// `cb.trace.<method>(args...)`
    fn trace_expr(&self, method: &str, args: Vec<Expr>) -> Expr {
        let trace = Expr::member(Expr::ident(&self.options.callbacks_binding), "trace");
        Expr::method_call(trace, method, args)
    }

    fn trace_call(&self, method: &str, args: Vec<Expr>) -> Stmt {
        Stmt::expr(self.trace_expr(method, args))
    }

    fn trace_let(&self, name: &str, named: Expr) -> Stmt {
        self.trace_call("traceLet", vec![Expr::string(name), named])
    }

    fn exit_block(&self) -> Stmt {
        self.trace_call("exitBlock", Vec::new())
    }

    fn fresh_test(&mut self) -> String {
        let name = format!("$test{}", self.test_counter);
        self.test_counter += 1;
        name
    }

    fn check_binding(&self, name: &str, span: Span) -> TransformResult<()> {
        if self.options.is_reserved(name) {
            return Err(InstrumentError::ReservedBinding {
                name: name.to_string(),
                span,
            });
        }
        Ok(())
    }

    /// Rewrite a statement list. Every name the list declares is bound up
    /// front, so functions may refer to declarations that follow them.
    fn block(
        &mut self,
        stmts: &[Stmt],
        env: CaptureEnv,
        ctx: &TransformationContext,
    ) -> TransformResult<(Vec<Stmt>, CaptureEnv)> {
        let mut env = env;
        for stmt in stmts {
            for name in declared_names(stmt) {
                self.check_binding(name, stmt.span)?;
                env = env.bind(name, stmt.span);
            }
        }

        let mut out = Vec::with_capacity(stmts.len() * 2);
        for stmt in stmts {
            env = self.stmt(stmt, env, ctx, &mut out)?;
        }
        Ok((out, env))
    }

    /// A nested block: its own declarations do not outlive it.
    fn scoped_block(
        &mut self,
        stmts: &[Stmt],
        env: CaptureEnv,
        ctx: &TransformationContext,
    ) -> TransformResult<(Vec<Stmt>, CaptureEnv)> {
        let outer = env.clone();
        let (body, inner) = self.block(stmts, env, ctx)?;
        Ok((body, inner.leave_scope(&outer)))
    }

    fn stmt(
        &mut self,
        stmt: &Stmt,
        env: CaptureEnv,
        ctx: &TransformationContext,
        out: &mut Vec<Stmt>,
    ) -> TransformResult<CaptureEnv> {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Declare { kind, declarations } => {
                let [Declarator { target, init }] = declarations.as_slice() else {
                    return Err(InstrumentError::unsupported(
                        "declaration with several declarators",
                        span,
                    ));
                };
                let Pattern::Identifier(name) = target else {
                    return Err(InstrumentError::unsupported("destructuring declaration", span));
                };
                self.declaration(*kind, name, init.as_ref(), stmt, env, ctx, out)
            }

            StmtKind::Function { name, params, body } => {
                let (body, clos, env) = self.function(params, body, None, span, env, ctx)?;
                out.push(self.trace_let(name, clos));
                out.push(Stmt::new(
                    StmtKind::Function {
                        name: name.clone(),
                        params: params.clone(),
                        body,
                    },
                    span,
                ));
                Ok(env)
            }

            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                let (test_rep, env) = self.reifier().reify(test, env)?;
                let test_name = self.fresh_test();
                out.push(Stmt::let_(&test_name, test_rep));

                let (mut then_body, then_env) = self.scoped_block(consequent, env.clone(), ctx)?;
                then_body.insert(0, self.trace_call("traceIfTrue", vec![Expr::ident(&test_name)]));

                let (mut else_body, else_env) = match alternate {
                    Some(alternate) => self.scoped_block(alternate, env, ctx)?,
                    None => (Vec::new(), env),
                };
                else_body.insert(0, self.trace_call("traceIfFalse", vec![Expr::ident(&test_name)]));

                out.push(Stmt::new(
                    StmtKind::If {
                        test: test.clone(),
                        consequent: then_body,
                        alternate: Some(else_body),
                    },
                    span,
                ));
                out.push(self.exit_block());
                then_env.merge(else_env)
            }

            StmtKind::While { test, body } => {
                let (test_rep, env) = self.reifier().reify(test, env)?;
                out.push(self.trace_call("traceWhile", vec![test_rep]));
                let (mut body, env) = self.scoped_block(body, env, ctx)?;
                body.insert(0, self.trace_call("traceLoop", Vec::new()));
                out.push(Stmt::new(
                    StmtKind::While {
                        test: test.clone(),
                        body,
                    },
                    span,
                ));
                out.push(self.exit_block());
                Ok(env)
            }

            StmtKind::Labeled { label, body } => {
                out.push(self.trace_call("traceLabel", vec![Expr::string(label)]));
                let (mut body, env) = self.scoped_block(body, env, &ctx.with_label(label))?;
                body.push(self.exit_block());
                out.push(Stmt::new(
                    StmtKind::Labeled {
                        label: label.clone(),
                        body,
                    },
                    span,
                ));
                Ok(env)
            }

            StmtKind::Break { label: None } => {
                Err(InstrumentError::unsupported("break without a label", span))
            }

            StmtKind::Break { label: Some(label) } => {
                if !ctx.has_label(label) {
                    return Err(InstrumentError::UnknownLabel {
                        label: label.clone(),
                        span,
                    });
                }
                let undefined = self.reifier().undefined();
                out.push(self.trace_call("traceBreak", vec![Expr::string(label), undefined]));
                out.push(stmt.clone());
                Ok(env)
            }

            StmtKind::Return { value } => {
                if !ctx.in_function() {
                    return Err(InstrumentError::ReturnOutsideFunction { span });
                }
                let (value_rep, env) = match value {
                    Some(value) => self.reifier().reify(value, env)?,
                    None => (self.reifier().undefined(), env),
                };
                out.push(self.trace_call(
                    "traceBreak",
                    vec![Expr::string(&self.options.return_label), value_rep],
                ));
                out.push(stmt.clone());
                Ok(env)
            }

            StmtKind::Block(body) => {
                let (body, env) = self.scoped_block(body, env, ctx)?;
                out.push(Stmt::new(StmtKind::Block(body), span));
                Ok(env)
            }

            StmtKind::Expr(expr) => self.expression(expr, stmt, env, out),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn declaration(
        &mut self,
        kind: DeclKind,
        name: &str,
        init: Option<&Expr>,
        stmt: &Stmt,
        env: CaptureEnv,
        ctx: &TransformationContext,
        out: &mut Vec<Stmt>,
    ) -> TransformResult<CaptureEnv> {
        let span = stmt.span;
        let Some(init) = init else {
            out.push(self.trace_let(name, self.reifier().undefined()));
            out.push(stmt.clone());
            return Ok(env.bind(name, span));
        };

        let env = match &init.kind {
            ExprKind::Function {
                name: function_name,
                params,
                body,
            } => {
                let own = function_name.as_deref().map(|own_name| (own_name, name));
                let (body, clos, env) = self.function(params, body, own, init.span, env, ctx)?;
                out.push(self.trace_let(name, clos));
                let function = Expr::new(
                    ExprKind::Function {
                        name: function_name.clone(),
                        params: params.clone(),
                        body,
                    },
                    init.span,
                );
                out.push(Stmt::new(
                    StmtKind::Declare {
                        kind,
                        declarations: vec![Declarator {
                            target: Pattern::Identifier(name.to_string()),
                            init: Some(function),
                        }],
                    },
                    span,
                ));
                env
            }
            ExprKind::Call { callee, args } => self.call(name, callee, args, stmt, env, out)?,
            _ => {
                let (named, env) = self.reifier().reify(init, env)?;
                out.push(self.trace_let(name, named));
                out.push(stmt.clone());
                env
            }
        };
        Ok(env.bind(name, span))
    }

    fn call(
        &mut self,
        name: &str,
        callee: &Expr,
        args: &[Expr],
        stmt: &Stmt,
        env: CaptureEnv,
        out: &mut Vec<Stmt>,
    ) -> TransformResult<CaptureEnv> {
        let reifier = self.reifier();
        match self.primitives.classify(callee, args) {
            CallKind::Require(path) => {
                let path = reifier.builder("string", vec![Expr::string(path)]);
                let named = reifier.builder(
                    "primApp",
                    vec![Expr::string("require"), Expr::array(vec![path])],
                );
                out.push(self.trace_let(name, named));
                out.push(stmt.clone());
                Ok(env)
            }
            CallKind::Console { method } => {
                let (args, env) = reifier.reify_all(args, env)?;
                out.push(self.trace_call(
                    "tracePrimApp",
                    vec![
                        Expr::string(self.primitives.console_event(method)),
                        Expr::array(args),
                    ],
                ));
                if !is_generated(name) {
                    out.push(self.trace_let(name, reifier.undefined()));
                }
                out.push(stmt.clone());
                Ok(env)
            }
            CallKind::Method { object, method } => {
                let (object, env) = reifier.reify(object, env)?;
                let (args, env) = reifier.reify_all(args, env)?;
                let named = reifier.builder(
                    "methodCall",
                    vec![object, Expr::string(method), Expr::array(args)],
                );
                out.push(self.trace_let(name, named));
                out.push(stmt.clone());
                Ok(env)
            }
            CallKind::Function => {
                let (callee, env) = self.callee(callee, env)?;
                let (args, env) = reifier.reify_all(args, env)?;
                let mut traced = Vec::with_capacity(args.len() + 1);
                traced.push(callee);
                traced.extend(args);
                out.push(self.trace_call(
                    "traceFunctionCall",
                    vec![Expr::string(name), Expr::array(traced)],
                ));
                out.push(stmt.clone());
                // The call opened a block of its own
                out.push(self.exit_block());
                Ok(env)
            }
        }
    }

    fn callee(&self, callee: &Expr, env: CaptureEnv) -> TransformResult<(Expr, CaptureEnv)> {
        let reifier = self.reifier();
        match &callee.kind {
            ExprKind::Identifier(name) => Ok(reifier.variable(name, callee.span, env)),
            ExprKind::Member { object, property } => {
                if matches!(object.kind, ExprKind::Member { .. } | ExprKind::Index { .. }) {
                    return Err(InstrumentError::unsupported("chained member call", callee.span));
                }
                let (object, env) = reifier.reify(object, env)?;
                Ok((
                    reifier.builder("get", vec![object, Expr::string(property)]),
                    env,
                ))
            }
            _ => Err(InstrumentError::unsupported(
                format!("call of a {}", callee.describe()),
                callee.span,
            )),
        }
    }

    fn expression(
        &mut self,
        expr: &Expr,
        stmt: &Stmt,
        env: CaptureEnv,
        out: &mut Vec<Stmt>,
    ) -> TransformResult<CaptureEnv> {
        let reifier = self.reifier();
        let env = match &expr.kind {
            ExprKind::Assign {
                op: AssignOp::Assign,
                target,
                value,
            } => {
                let (value, env) = reifier.reify(value, env)?;
                let (target, env) = self.assign_target(target, env)?;
                out.push(self.trace_call("traceSet", vec![target, value]));
                env
            }
            ExprKind::Update { op, target, .. } => {
                let Some(name) = target.as_identifier() else {
                    return Err(InstrumentError::unsupported(
                        "update of a non-identifier",
                        target.span,
                    ));
                };
                let (current, env) = reifier.variable(name, target.span, env);
                let next = reifier.builder(
                    "binop",
                    vec![
                        Expr::string(op.binary().symbol()),
                        current.clone(),
                        reifier.builder("number", vec![Expr::number(1.0)]),
                    ],
                );
                out.push(self.trace_call("traceSet", vec![current, next]));
                env
            }
            ExprKind::Assign { op, .. } => {
                return Err(InstrumentError::unsupported(
                    format!("compound assignment `{}`", op.symbol()),
                    expr.span,
                ));
            }
            ExprKind::Call { .. } => {
                return Err(InstrumentError::unsupported(
                    "call outside of a declaration",
                    expr.span,
                ));
            }
            // Evaluated for effect only; nothing to record
            _ => reifier.reify(expr, env)?.1,
        };
        out.push(stmt.clone());
        Ok(env)
    }

    fn assign_target(&self, target: &Expr, env: CaptureEnv) -> TransformResult<(Expr, CaptureEnv)> {
        let reifier = self.reifier();
        match &target.kind {
            ExprKind::Identifier(name) => {
                if name == "undefined" || self.primitives.is_global(name) {
                    return Err(InstrumentError::unsupported(
                        format!("assignment to `{name}`"),
                        target.span,
                    ));
                }
                Ok(reifier.variable(name, target.span, env))
            }
            ExprKind::Member { object, property } => {
                if object.as_identifier().is_none() {
                    return Err(InstrumentError::unsupported(
                        "chained member assignment",
                        target.span,
                    ));
                }
                let (object, env) = reifier.reify(object, env)?;
                let key = reifier.builder("string", vec![Expr::string(property)]);
                Ok((reifier.builder("index", vec![object, key]), env))
            }
            ExprKind::Index { object, index } => {
                let Some(name) = object.as_identifier() else {
                    return Err(InstrumentError::unsupported(
                        "chained member assignment",
                        target.span,
                    ));
                };
                if env.lookup(name) != Some(Binding::Local) {
                    return Err(InstrumentError::unsupported(
                        "computed member write to a captured variable",
                        target.span,
                    ));
                }
                let (object, env) = reifier.reify(object, env)?;
                let (index, env) = reifier.reify(index, env)?;
                Ok((reifier.builder("index", vec![object, index]), env))
            }
            _ => Err(InstrumentError::unsupported(
                format!("assignment to a {}", target.describe()),
                target.span,
            )),
        }
    }

    /// `let [$clos, $p0, ...] = cb.trace.traceFunctionBody("'ret", n);`
    /// followed by a traced `let` for each parameter, the body and the
    /// closing `exitBlock`. Returns the new body, the closure record and
    /// the enclosing environment updated with any new captures.
    ///
    /// `own` pairs the name a function expression gives itself with the
    /// variable it is assigned to. References to the own name inside the
    /// body read that variable through the closure record.
    fn function(
        &mut self,
        params: &[String],
        body: &[Stmt],
        own: Option<(&str, &str)>,
        span: Span,
        env: CaptureEnv,
        ctx: &TransformationContext,
    ) -> TransformResult<(Vec<Stmt>, Expr, CaptureEnv)> {
        for param in params {
            self.check_binding(param, span)?;
        }
        if let Some((own_name, _)) = own {
            self.check_binding(own_name, span)?;
        }
        let body_env = CaptureEnv::for_function(params, span);
        let (instrumented, body_env) = self.block(body, body_env, &ctx.enter_function())?;
        let (body_env, own) = match own {
            Some((own_name, target)) => {
                let (body_env, captured) = body_env.forget_capture(own_name);
                (body_env, captured.then_some((own_name, target)))
            }
            None => (body_env, None),
        };
        let (env, sources) = env.close_over(&body_env);
        self.functions += 1;
        trace!(
            params = params.len(),
            captures = sources.len(),
            depth = ctx.function_depth + 1,
            "instrumented function"
        );

        let argument_names: Vec<String> = (0..params.len()).map(|i| format!("$p{i}")).collect();
        let mut pattern = vec![CLOSURE_PARAM.to_string()];
        pattern.extend(argument_names.iter().cloned());
        let prologue = Stmt::synthetic(StmtKind::Declare {
            kind: DeclKind::Let,
            declarations: vec![Declarator {
                target: Pattern::Array(pattern),
                init: Some(self.trace_expr(
                    "traceFunctionBody",
                    vec![
                        Expr::string(&self.options.return_label),
                        Expr::number(params.len() as f64),
                    ],
                )),
            }],
        });

        let mut out = Vec::with_capacity(instrumented.len() + params.len() + 2);
        out.push(prologue);
        for (param, argument) in params.iter().zip(&argument_names) {
            out.push(self.trace_let(param, Expr::ident(argument)));
        }
        out.extend(instrumented);
        out.push(self.exit_block());

        let clos = self.reifier().closure_record(own, &sources);
        Ok((out, clos, env))
    }
}

fn is_generated(name: &str) -> bool {
    name.starts_with('$')
}

fn declared_names(stmt: &Stmt) -> Vec<&str> {
    match &stmt.kind {
        StmtKind::Declare { declarations, .. } => declarations
            .iter()
            .flat_map(|declarator| declarator.target.names())
            .collect(),
        StmtKind::Function { name, .. } => vec![name.as_str()],
        _ => Vec::new(),
    }
}
