use std::sync::OnceLock;

use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;

use super::ParseError;
use crate::ast::*;

#[derive(Parser)]
#[grammar = "parser/script.pest"]
pub struct ScriptParser;

type BuildResult<T> = std::result::Result<T, ParseError>;

impl ScriptParser {
    /// Parse a complete program.
    pub fn parse_source(source: &str) -> BuildResult<Program> {
        let mut pairs = Self::parse(Rule::program, source).map_err(from_pest)?;
        let program = pairs
            .next()
            .ok_or_else(|| ParseError::syntax("empty parse result", Span::default()))?;
        let body = build_stmts(program.into_inner())?;
        Ok(Program::new(body))
    }
}

fn from_pest(error: pest::error::Error<Rule>) -> ParseError {
    let (line, column) = match error.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    ParseError::Syntax {
        message: error.variant.message().to_string(),
        span: Span::new(line, column),
    }
}

fn pratt() -> &'static PrattParser<Rule> {
    static PRATT: OnceLock<PrattParser<Rule>> = OnceLock::new();
    PRATT.get_or_init(|| {
        PrattParser::new()
            .op(Op::infix(Rule::or, Assoc::Left))
            .op(Op::infix(Rule::and, Assoc::Left))
            .op(Op::infix(Rule::strict_eq, Assoc::Left)
                | Op::infix(Rule::strict_ne, Assoc::Left)
                | Op::infix(Rule::loose_eq, Assoc::Left)
                | Op::infix(Rule::loose_ne, Assoc::Left))
            .op(Op::infix(Rule::lt, Assoc::Left)
                | Op::infix(Rule::gt, Assoc::Left)
                | Op::infix(Rule::le, Assoc::Left)
                | Op::infix(Rule::ge, Assoc::Left))
            .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
            .op(Op::infix(Rule::mul, Assoc::Left)
                | Op::infix(Rule::div, Assoc::Left)
                | Op::infix(Rule::rem, Assoc::Left))
            .op(Op::prefix(Rule::not)
                | Op::prefix(Rule::neg)
                | Op::prefix(Rule::pos)
                | Op::prefix(Rule::typeof_op)
                | Op::prefix(Rule::void_op)
                | Op::prefix(Rule::pre_increment)
                | Op::prefix(Rule::pre_decrement))
            .op(Op::postfix(Rule::increment) | Op::postfix(Rule::decrement))
    })
}

fn span_of(pair: &Pair<'_, Rule>) -> Span {
    let (line, column) = pair.as_span().start_pos().line_col();
    Span::new(line, column)
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_function
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_for
            | Rule::kw_do
            | Rule::kw_switch
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_finally
            | Rule::kw_throw
            | Rule::kw_continue
            | Rule::kw_break
            | Rule::kw_return
            | Rule::kw_new
    )
}

/// Inner pairs with keyword tokens removed.
fn children(pair: Pair<'_, Rule>) -> Vec<Pair<'_, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule())).collect()
}

fn missing(what: &str, span: Span) -> ParseError {
    ParseError::syntax(format!("expected {what}"), span)
}

fn build_stmts<'a>(pairs: impl Iterator<Item = Pair<'a, Rule>>) -> BuildResult<Vec<Stmt>> {
    pairs
        .filter(|p| !matches!(p.as_rule(), Rule::EOI | Rule::empty_stmt))
        .map(build_stmt)
        .collect()
}

/// Statement bodies are stored as lists; a braced block is flattened.
fn into_body(stmt: Stmt) -> Vec<Stmt> {
    match stmt.kind {
        StmtKind::Block(body) => body,
        _ => vec![stmt],
    }
}

fn build_stmt(pair: Pair<'_, Rule>) -> BuildResult<Stmt> {
    let span = span_of(&pair);
    let kind = match pair.as_rule() {
        Rule::block => StmtKind::Block(build_stmts(pair.into_inner())?),
        Rule::empty_stmt => StmtKind::Block(Vec::new()),
        Rule::declaration => build_declaration(pair)?,
        Rule::function_decl => {
            let mut parts = children(pair).into_iter();
            let name = parts
                .next()
                .ok_or_else(|| missing("function name", span))?
                .as_str()
                .to_string();
            let (params, body) = build_function_tail(&mut parts, span)?;
            StmtKind::Function { name, params, body }
        }
        Rule::if_stmt => {
            let mut parts = children(pair).into_iter();
            let test = build_expr(parts.next().ok_or_else(|| missing("condition", span))?)?;
            let consequent = into_body(build_stmt(
                parts.next().ok_or_else(|| missing("statement", span))?,
            )?);
            let alternate = parts
                .next()
                .map(|p| build_stmt(p).map(into_body))
                .transpose()?;
            StmtKind::If {
                test,
                consequent,
                alternate,
            }
        }
        Rule::while_stmt => {
            let mut parts = children(pair).into_iter();
            let test = build_expr(parts.next().ok_or_else(|| missing("condition", span))?)?;
            let body = into_body(build_stmt(
                parts.next().ok_or_else(|| missing("loop body", span))?,
            )?);
            StmtKind::While { test, body }
        }
        Rule::labeled_stmt => {
            let mut parts = children(pair).into_iter();
            let label = parts
                .next()
                .ok_or_else(|| missing("label", span))?
                .as_str()
                .to_string();
            let body = into_body(build_stmt(
                parts.next().ok_or_else(|| missing("statement", span))?,
            )?);
            StmtKind::Labeled { label, body }
        }
        Rule::break_stmt => StmtKind::Break {
            label: children(pair).first().map(|p| p.as_str().to_string()),
        },
        Rule::return_stmt => StmtKind::Return {
            value: children(pair).into_iter().next().map(build_expr).transpose()?,
        },
        Rule::expr_stmt => {
            let inner = children(pair)
                .into_iter()
                .next()
                .ok_or_else(|| missing("expression", span))?;
            StmtKind::Expr(build_expr(inner)?)
        }
        Rule::for_stmt => return Err(ParseError::unsupported("for statement", span)),
        Rule::do_stmt => return Err(ParseError::unsupported("do-while statement", span)),
        Rule::switch_stmt => return Err(ParseError::unsupported("switch statement", span)),
        Rule::try_stmt => return Err(ParseError::unsupported("try statement", span)),
        Rule::throw_stmt => return Err(ParseError::unsupported("throw statement", span)),
        Rule::continue_stmt => return Err(ParseError::unsupported("continue statement", span)),
        rule => return Err(ParseError::syntax(format!("unexpected {rule:?}"), span)),
    };
    Ok(Stmt::new(kind, span))
}

fn build_declaration(pair: Pair<'_, Rule>) -> BuildResult<StmtKind> {
    let span = span_of(&pair);
    let mut parts = pair.into_inner();
    let kind = match parts.next().map(|p| p.as_str().to_string()).as_deref() {
        Some("let") => DeclKind::Let,
        Some("const") => DeclKind::Const,
        Some("var") => DeclKind::Var,
        _ => return Err(missing("declaration keyword", span)),
    };
    let declarations = parts
        .map(|declarator| {
            let span = span_of(&declarator);
            let mut inner = declarator.into_inner();
            let target = build_binding(inner.next().ok_or_else(|| missing("binding", span))?)?;
            let init = inner.next().map(build_expr).transpose()?;
            Ok(Declarator { target, init })
        })
        .collect::<BuildResult<Vec<_>>>()?;
    Ok(StmtKind::Declare { kind, declarations })
}

fn build_binding(pair: Pair<'_, Rule>) -> BuildResult<Pattern> {
    let span = span_of(&pair);
    match pair.as_rule() {
        Rule::identifier => Ok(Pattern::Identifier(pair.as_str().to_string())),
        Rule::array_pattern => Ok(Pattern::Array(
            pair.into_inner().map(|p| p.as_str().to_string()).collect(),
        )),
        _ => Err(ParseError::unsupported("object destructuring", span)),
    }
}

fn build_function_tail<'a>(
    parts: &mut impl Iterator<Item = Pair<'a, Rule>>,
    span: Span,
) -> BuildResult<(Vec<String>, Vec<Stmt>)> {
    let params = parts
        .next()
        .ok_or_else(|| missing("parameter list", span))?
        .into_inner()
        .map(|param| -> BuildResult<String> {
            match build_binding(param)? {
                Pattern::Identifier(name) => Ok(name),
                Pattern::Array(_) => Err(ParseError::unsupported("destructuring parameter", span)),
            }
        })
        .collect::<BuildResult<Vec<_>>>()?;
    let body = build_stmts(
        parts
            .next()
            .ok_or_else(|| missing("function body", span))?
            .into_inner(),
    )?;
    Ok((params, body))
}

fn build_expr(pair: Pair<'_, Rule>) -> BuildResult<Expr> {
    match pair.as_rule() {
        Rule::assignment => build_assignment(pair),
        Rule::conditional => build_conditional(pair),
        Rule::binary => build_binary(pair),
        Rule::chain => build_chain(pair),
        _ => build_primary(pair),
    }
}

fn build_assignment(pair: Pair<'_, Rule>) -> BuildResult<Expr> {
    let span = span_of(&pair);
    let mut parts = pair.into_inner();
    let first = parts.next().ok_or_else(|| missing("expression", span))?;
    if first.as_rule() != Rule::chain {
        return build_expr(first);
    }

    let target = build_chain(first)?;
    if !matches!(
        target.kind,
        ExprKind::Identifier(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
    ) {
        return Err(ParseError::InvalidTarget { span });
    }
    let op = match parts.next().map(|p| p.as_str().to_string()).as_deref() {
        Some("=") => AssignOp::Assign,
        Some("+=") => AssignOp::AddAssign,
        Some("-=") => AssignOp::SubAssign,
        Some("*=") => AssignOp::MulAssign,
        Some("/=") => AssignOp::DivAssign,
        _ => return Err(missing("assignment operator", span)),
    };
    let value = build_expr(parts.next().ok_or_else(|| missing("assigned value", span))?)?;
    Ok(Expr::new(
        ExprKind::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        },
        span,
    ))
}

fn build_conditional(pair: Pair<'_, Rule>) -> BuildResult<Expr> {
    let span = span_of(&pair);
    let mut parts = pair.into_inner();
    let test = build_expr(parts.next().ok_or_else(|| missing("expression", span))?)?;
    if parts.next().is_some() {
        return Err(ParseError::unsupported("conditional expression", span));
    }
    Ok(test)
}

fn build_binary(pair: Pair<'_, Rule>) -> BuildResult<Expr> {
    pratt()
        .map_primary(build_chain)
        .map_prefix(|op, operand| {
            let operand = operand?;
            let span = span_of(&op);
            let kind = match op.as_rule() {
                Rule::pre_increment | Rule::pre_decrement => {
                    let op = if op.as_rule() == Rule::pre_increment {
                        UpdateOp::Increment
                    } else {
                        UpdateOp::Decrement
                    };
                    update(op, true, operand, span)?
                }
                rule => ExprKind::Unary {
                    op: match rule {
                        Rule::not => UnaryOp::Not,
                        Rule::neg => UnaryOp::Neg,
                        Rule::pos => UnaryOp::Plus,
                        Rule::typeof_op => UnaryOp::Typeof,
                        _ => UnaryOp::Void,
                    },
                    operand: Box::new(operand),
                },
            };
            Ok(Expr::new(kind, span))
        })
        .map_postfix(|target, op| {
            let target = target?;
            let span = target.span;
            let op = if op.as_rule() == Rule::increment {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            Ok(Expr::new(update(op, false, target, span)?, span))
        })
        .map_infix(|left, op, right| {
            let left = left?;
            let right = right?;
            let op = match op.as_rule() {
                Rule::or => BinaryOp::Or,
                Rule::and => BinaryOp::And,
                Rule::strict_eq => BinaryOp::StrictEq,
                Rule::strict_ne => BinaryOp::StrictNe,
                Rule::loose_eq => BinaryOp::LooseEq,
                Rule::loose_ne => BinaryOp::LooseNe,
                Rule::lt => BinaryOp::Lt,
                Rule::gt => BinaryOp::Gt,
                Rule::le => BinaryOp::Le,
                Rule::ge => BinaryOp::Ge,
                Rule::add => BinaryOp::Add,
                Rule::sub => BinaryOp::Sub,
                Rule::mul => BinaryOp::Mul,
                Rule::div => BinaryOp::Div,
                _ => BinaryOp::Mod,
            };
            let span = left.span;
            Ok(Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            ))
        })
        .parse(pair.into_inner())
}

fn update(op: UpdateOp, prefix: bool, target: Expr, span: Span) -> BuildResult<ExprKind> {
    match target.kind {
        ExprKind::Identifier(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => {
            Ok(ExprKind::Update {
                op,
                prefix,
                target: Box::new(target),
            })
        }
        _ => Err(ParseError::InvalidTarget { span }),
    }
}

fn build_chain(pair: Pair<'_, Rule>) -> BuildResult<Expr> {
    let span = span_of(&pair);
    let mut parts = pair.into_inner();
    let mut expr = build_primary(parts.next().ok_or_else(|| missing("expression", span))?)?;
    for suffix in parts {
        let kind = match suffix.as_rule() {
            Rule::call_args => ExprKind::Call {
                callee: Box::new(expr),
                args: suffix.into_inner().map(build_expr).collect::<BuildResult<_>>()?,
            },
            Rule::member_access => {
                let property = suffix
                    .into_inner()
                    .next()
                    .ok_or_else(|| missing("property name", span))?
                    .as_str()
                    .to_string();
                ExprKind::Member {
                    object: Box::new(expr),
                    property,
                }
            }
            _ => {
                let index = build_expr(
                    suffix
                        .into_inner()
                        .next()
                        .ok_or_else(|| missing("index", span))?,
                )?;
                ExprKind::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                }
            }
        };
        expr = Expr::new(kind, span);
    }
    Ok(expr)
}

fn build_primary(pair: Pair<'_, Rule>) -> BuildResult<Expr> {
    let span = span_of(&pair);
    let kind = match pair.as_rule() {
        Rule::number => {
            let text = pair.as_str();
            ExprKind::Number(
                text.parse::<f64>()
                    .map_err(|_| ParseError::InvalidNumber(text.to_string()))?,
            )
        }
        Rule::string => {
            let raw = pair
                .into_inner()
                .next()
                .map(|p| p.as_str())
                .unwrap_or_default();
            ExprKind::String(unescape(raw))
        }
        Rule::boolean => ExprKind::Boolean(pair.as_str() == "true"),
        Rule::null_lit => ExprKind::Null,
        Rule::identifier => ExprKind::Identifier(pair.as_str().to_string()),
        Rule::this_expr => return Err(ParseError::unsupported("this expression", span)),
        Rule::new_expr => return Err(ParseError::unsupported("new expression", span)),
        Rule::function_expr => {
            let mut parts = children(pair).into_iter().peekable();
            let name = match parts.peek() {
                Some(p) if p.as_rule() == Rule::identifier => {
                    parts.next().map(|p| p.as_str().to_string())
                }
                _ => None,
            };
            let (params, body) = build_function_tail(&mut parts, span)?;
            ExprKind::Function { name, params, body }
        }
        Rule::array_lit => {
            ExprKind::Array(pair.into_inner().map(build_expr).collect::<BuildResult<_>>()?)
        }
        Rule::object_lit => {
            let entries = pair
                .into_inner()
                .map(|property| {
                    let span = span_of(&property);
                    let mut inner = property.into_inner();
                    let key = inner.next().ok_or_else(|| missing("property key", span))?;
                    let key = match key.as_rule() {
                        Rule::string => {
                            unescape(key.into_inner().next().map(|p| p.as_str()).unwrap_or_default())
                        }
                        _ => key.as_str().to_string(),
                    };
                    let value =
                        build_expr(inner.next().ok_or_else(|| missing("property value", span))?)?;
                    Ok((key, value))
                })
                .collect::<BuildResult<Vec<_>>>()?;
            ExprKind::Object(entries)
        }
        Rule::paren => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| missing("expression", span))?;
            return build_expr(inner);
        }
        Rule::assignment | Rule::conditional | Rule::binary | Rule::chain => {
            return build_expr(pair)
        }
        rule => return Err(ParseError::syntax(format!("unexpected {rule:?}"), span)),
    };
    Ok(Expr::new(kind, span))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
