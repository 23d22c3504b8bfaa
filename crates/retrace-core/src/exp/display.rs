// Human-readable rendering of trace trees; holes print as `?`

use std::fmt;

use super::{Exp, LVal};
use crate::ast::source_gen::{escape_string, format_number};

const INDENT: &str = "  ";

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        match self {
            // The root of a trace is a block; print its statements directly
            Exp::Block { body } => render_body(&mut out, body, 0),
            _ => render_stmt(&mut out, self, 0),
        }
        f.write_str(out.trim_end())
    }
}

impl fmt::Display for LVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_expr(&Exp::from(self.clone())))
    }
}

fn render_body(out: &mut String, body: &[Exp], depth: usize) {
    for exp in body {
        render_stmt(out, exp, depth);
    }
}

fn open_block(out: &mut String, header: &str, body: &[Exp], depth: usize) {
    out.push_str(header);
    out.push_str(" {\n");
    render_body(out, body, depth + 1);
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
}

fn render_stmt(out: &mut String, exp: &Exp, depth: usize) {
    out.push_str(&INDENT.repeat(depth));
    match exp {
        Exp::Unknown => out.push('?'),
        Exp::Let { name, named } => match named.as_ref() {
            Exp::Block { body } => {
                open_block(out, &format!("let {name} ="), body, depth);
                out.push(';');
            }
            other => out.push_str(&format!("let {} = {};", name, render_expr(other))),
        },
        Exp::Set { name, named } => {
            out.push_str(&format!("{} = {};", name, render_expr(named)));
        }
        Exp::Block { body } => open_block(out, "", body, depth),
        Exp::If {
            cond,
            true_part,
            false_part,
        } => {
            open_block(out, &format!("if ({})", render_expr(cond)), true_part, depth);
            open_block(out, " else", false_part, depth);
        }
        Exp::While { cond, body } => {
            open_block(out, &format!("while ({})", render_expr(cond)), body, depth);
        }
        Exp::Callback {
            event,
            event_arg,
            callback_args,
            clos,
            body,
        } => {
            let header = format!(
                "callback {}({}, {}) ({})",
                event,
                render_expr(event_arg),
                render_expr(clos),
                callback_args.join(", ")
            );
            open_block(out, &header, body, depth);
        }
        Exp::Label { name, body } => open_block(out, &format!("{name}:"), body, depth),
        Exp::Break { name, value } => {
            out.push_str(&format!("break {} {};", name, render_expr(value)));
        }
        other => {
            out.push_str(&render_expr(other));
            out.push(';');
        }
    }
    out.push('\n');
}

fn render_list(items: &[Exp]) -> String {
    items.iter().map(render_expr).collect::<Vec<_>>().join(", ")
}

fn render_fields<'a>(fields: impl Iterator<Item = (&'a String, &'a Exp)>) -> String {
    fields
        .map(|(k, v)| format!("{}: {}", k, render_expr(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_operand(exp: &Exp) -> String {
    match exp {
        Exp::BinOp { .. } => format!("({})", render_expr(exp)),
        _ => render_expr(exp),
    }
}

fn render_expr(exp: &Exp) -> String {
    match exp {
        Exp::Unknown => "?".to_string(),
        Exp::Number { value } => format_number(*value),
        Exp::Boolean { value } => value.to_string(),
        Exp::String { value } => escape_string(value),
        Exp::Undefined => "undefined".to_string(),
        Exp::Identifier { name } => name.clone(),
        Exp::From { exp, field } => format!("{}->{}", render_operand(exp), field),
        Exp::Get { exp, field } => format!("{}.{}", render_operand(exp), field),
        Exp::BinOp { op, e1, e2 } => format!(
            "{} {} {}",
            render_operand(e1),
            op.symbol(),
            render_operand(e2)
        ),
        Exp::Op1 { op, e } => {
            if op.symbol().len() > 1 {
                format!("{} {}", op.symbol(), render_operand(e))
            } else {
                format!("{}{}", op.symbol(), render_operand(e))
            }
        }
        Exp::Clos { tenv } => format!("clos {{ {} }}", render_fields(tenv.iter())),
        Exp::Object { properties } => format!("{{ {} }}", render_fields(properties.iter())),
        Exp::Array { exps } => format!("[{}]", render_list(exps)),
        Exp::Index { exp, index } => format!("{}[{}]", render_operand(exp), render_expr(index)),
        Exp::MethodCall {
            e,
            method,
            method_call_args,
        } => format!(
            "{}.{}({})",
            render_operand(e),
            method,
            render_list(method_call_args)
        ),
        Exp::PrimApp { event, event_args } => format!("{}({})", event, render_list(event_args)),
        Exp::Let { .. }
        | Exp::Set { .. }
        | Exp::Block { .. }
        | Exp::If { .. }
        | Exp::While { .. }
        | Exp::Callback { .. }
        | Exp::Label { .. }
        | Exp::Break { .. } => {
            let mut out = String::new();
            render_stmt(&mut out, exp, 0);
            out.trim_end().to_string()
        }
    }
}
