// Source code generation from AST
// The instrumentation pass builds its output as AST and prints it here, so
// the printer must emit text that parses back to the same tree.

use super::*;

/// Trait for types that can generate their source code representation
pub trait ToSource {
    fn to_source(&self) -> String;
}

const INDENT: &str = "  ";

// Precedence levels for expressions that are not binary operators
const PREC_ASSIGN: u8 = 0;
const PREC_UNARY: u8 = 7;
const PREC_POSTFIX: u8 = 8;
const PREC_MEMBER: u8 = 9;
const PREC_PRIMARY: u8 = 10;

fn precedence(expr: &Expr) -> u8 {
    match &expr.kind {
        ExprKind::Assign { .. } => PREC_ASSIGN,
        ExprKind::Binary { op, .. } => op.precedence(),
        ExprKind::Unary { .. } => PREC_UNARY,
        ExprKind::Update { prefix: true, .. } => PREC_UNARY,
        ExprKind::Update { prefix: false, .. } => PREC_POSTFIX,
        ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Call { .. } => PREC_MEMBER,
        // A function expression in callee position needs parentheses
        ExprKind::Function { .. } => PREC_ASSIGN,
        _ => PREC_PRIMARY,
    }
}

fn wrap(expr: &Expr, min: u8) -> String {
    let source = expr.to_source();
    if precedence(expr) < min {
        format!("({source})")
    } else {
        source
    }
}

/// Escape a string for a double-quoted literal
pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a number the way the script language prints numeric literals.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e18 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn format_key(key: &str) -> String {
    if is_identifier_name(key) {
        key.to_string()
    } else {
        escape_string(key)
    }
}

fn format_list(items: &[Expr]) -> String {
    items
        .iter()
        .map(|e| wrap(e, PREC_ASSIGN + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_block(body: &[Stmt], depth: usize) -> String {
    if body.is_empty() {
        return "{}".to_string();
    }
    let mut result = String::from("{\n");
    for stmt in body {
        result.push_str(&format_stmt(stmt, depth + 1));
        result.push('\n');
    }
    result.push_str(&INDENT.repeat(depth));
    result.push('}');
    result
}

fn format_function(name: Option<&str>, params: &[String], body: &[Stmt], depth: usize) -> String {
    let mut result = String::from("function");
    if let Some(name) = name {
        result.push(' ');
        result.push_str(name);
    }
    result.push('(');
    result.push_str(&params.join(", "));
    result.push_str(") ");
    result.push_str(&format_block(body, depth));
    result
}

fn format_expr(expr: &Expr, depth: usize) -> String {
    match &expr.kind {
        ExprKind::Number(n) => {
            // Negative literals only come from synthesized nodes
            if *n < 0.0 {
                format!("({})", format_number(*n))
            } else {
                format_number(*n)
            }
        }
        ExprKind::String(s) => escape_string(s),
        ExprKind::Boolean(b) => b.to_string(),
        ExprKind::Null => "null".to_string(),
        ExprKind::Identifier(name) => name.clone(),
        ExprKind::Array(items) => format!("[{}]", format_list(items)),
        ExprKind::Object(entries) => {
            if entries.is_empty() {
                return "{}".to_string();
            }
            let body = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", format_key(k), wrap(v, PREC_ASSIGN + 1)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{ {body} }}")
        }
        ExprKind::Function { name, params, body } => {
            format_function(name.as_deref(), params, body, depth)
        }
        ExprKind::Member { object, property } => {
            format!("{}.{}", wrap(object, PREC_MEMBER), property)
        }
        ExprKind::Index { object, index } => {
            format!("{}[{}]", wrap(object, PREC_MEMBER), index.to_source())
        }
        ExprKind::Call { callee, args } => {
            let callee = match &callee.kind {
                ExprKind::Function { .. } => format!("({})", format_expr(callee, depth)),
                _ => wrap(callee, PREC_MEMBER),
            };
            let args = args
                .iter()
                .map(|a| match &a.kind {
                    ExprKind::Function { .. } => format_expr(a, depth),
                    _ => wrap(a, PREC_ASSIGN + 1),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{callee}({args})")
        }
        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Typeof | UnaryOp::Void => {
                format!("{} {}", op.symbol(), wrap(operand, PREC_UNARY))
            }
            // Keep `- -x` and `+ +x` from fusing into `--x` / `++x`
            UnaryOp::Neg | UnaryOp::Plus => {
                let inner = wrap(operand, PREC_UNARY);
                if inner.starts_with(op.symbol()) {
                    format!("{}({})", op.symbol(), inner)
                } else {
                    format!("{}{}", op.symbol(), inner)
                }
            }
            UnaryOp::Not => format!("!{}", wrap(operand, PREC_UNARY)),
        },
        ExprKind::Binary { op, left, right } => {
            let prec = op.precedence();
            // Left-associative: the right operand needs a strictly tighter binding
            format!(
                "{} {} {}",
                wrap(left, prec),
                op.symbol(),
                wrap(right, prec + 1)
            )
        }
        ExprKind::Assign { op, target, value } => {
            format!(
                "{} {} {}",
                wrap(target, PREC_MEMBER),
                op.symbol(),
                wrap(value, PREC_ASSIGN)
            )
        }
        ExprKind::Update { op, prefix, target } => {
            if *prefix {
                format!("{}{}", op.symbol(), wrap(target, PREC_MEMBER))
            } else {
                format!("{}{}", wrap(target, PREC_MEMBER), op.symbol())
            }
        }
    }
}

fn format_stmt(stmt: &Stmt, depth: usize) -> String {
    let indent = INDENT.repeat(depth);
    let body = match &stmt.kind {
        StmtKind::Declare { kind, declarations } => {
            let decls = declarations
                .iter()
                .map(|d| {
                    let target = match &d.target {
                        Pattern::Identifier(name) => name.clone(),
                        Pattern::Array(names) => format!("[{}]", names.join(", ")),
                    };
                    match &d.init {
                        Some(init) => format!("{} = {}", target, format_expr(init, depth)),
                        None => target,
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} {};", kind.keyword(), decls)
        }
        StmtKind::Function { name, params, body } => {
            format_function(Some(name), params, body, depth)
        }
        StmtKind::If {
            test,
            consequent,
            alternate,
        } => {
            let mut result = format!(
                "if ({}) {}",
                test.to_source(),
                format_block(consequent, depth)
            );
            if let Some(alternate) = alternate {
                result.push_str(" else ");
                result.push_str(&format_block(alternate, depth));
            }
            result
        }
        StmtKind::While { test, body } => {
            format!("while ({}) {}", test.to_source(), format_block(body, depth))
        }
        StmtKind::Labeled { label, body } => format!("{}: {}", label, format_block(body, depth)),
        StmtKind::Break { label: Some(label) } => format!("break {label};"),
        StmtKind::Break { label: None } => "break;".to_string(),
        StmtKind::Return { value: Some(value) } => format!("return {};", format_expr(value, depth)),
        StmtKind::Return { value: None } => "return;".to_string(),
        StmtKind::Block(body) => format_block(body, depth),
        StmtKind::Expr(expr) => {
            let source = format_expr(expr, depth);
            // Statements may not start with `function` or `{`
            if matches!(expr.kind, ExprKind::Function { .. } | ExprKind::Object(_)) {
                format!("({source});")
            } else {
                format!("{source};")
            }
        }
    };
    format!("{indent}{body}")
}

impl ToSource for Expr {
    fn to_source(&self) -> String {
        format_expr(self, 0)
    }
}

impl ToSource for Stmt {
    fn to_source(&self) -> String {
        format_stmt(self, 0)
    }
}

impl ToSource for Program {
    fn to_source(&self) -> String {
        let mut result = String::new();
        for stmt in &self.body {
            result.push_str(&format_stmt(stmt, 0));
            result.push('\n');
        }
        result
    }
}
