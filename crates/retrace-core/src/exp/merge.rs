// Structural merge of trace trees
// Merging is how a re-execution is checked against what earlier executions
// recorded: identical shapes merge, holes take whatever the other side saw,
// and anything else is a mismatch.

use indexmap::IndexMap;
use thiserror::Error;

use super::{Exp, LVal};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Mismatch {
    #[error("expected a {expected} node, found {found}")]
    Kind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("literal {expected} does not match {found}")]
    Literal { expected: String, found: String },

    #[error("identifier `{expected}` does not match `{found}`")]
    Identifier { expected: String, found: String },

    #[error("operator `{expected}` does not match `{found}`")]
    Operator {
        expected: &'static str,
        found: &'static str,
    },

    #[error("name `{expected}` does not match `{found}`")]
    Name { expected: String, found: String },

    #[error("{what} has {expected} elements but {found} were recorded")]
    Length {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("fields {expected:?} do not match {found:?}")]
    Keys {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

type MergeResult = Result<(), Mismatch>;

fn same_name(expected: &str, found: &str) -> MergeResult {
    if expected == found {
        Ok(())
    } else {
        Err(Mismatch::Name {
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

fn same_number(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn literal<T: ToString>(expected: T, found: T) -> Mismatch {
    Mismatch::Literal {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

impl Exp {
    /// Merge `other` with this tree, returning the combined tree.
    pub fn merge(&self, other: &Exp) -> Result<Exp, Mismatch> {
        let mut merged = self.clone();
        merged.merge_in(other.clone())?;
        Ok(merged)
    }

    /// Merge `incoming` into this tree in place.
    ///
    /// On error the tree may be partially updated.
    pub fn merge_in(&mut self, incoming: Exp) -> MergeResult {
        if incoming.is_unknown() {
            return Ok(());
        }
        if self.is_unknown() {
            *self = incoming;
            return Ok(());
        }

        match (self, incoming) {
            (Exp::Number { value: a }, Exp::Number { value: b }) => {
                if same_number(*a, b) {
                    Ok(())
                } else {
                    Err(literal(*a, b))
                }
            }
            (Exp::Boolean { value: a }, Exp::Boolean { value: b }) => {
                if *a == b {
                    Ok(())
                } else {
                    Err(literal(*a, b))
                }
            }
            (Exp::String { value: a }, Exp::String { value: b }) => {
                if *a == b {
                    Ok(())
                } else {
                    Err(literal(format!("{a:?}"), format!("{b:?}")))
                }
            }
            (Exp::Undefined, Exp::Undefined) => Ok(()),
            (Exp::Identifier { name: a }, Exp::Identifier { name: b }) => {
                if *a == b {
                    Ok(())
                } else {
                    Err(Mismatch::Identifier {
                        expected: a.clone(),
                        found: b,
                    })
                }
            }
            (Exp::From { exp, field }, Exp::From { exp: e2, field: f2 })
            | (Exp::Get { exp, field }, Exp::Get { exp: e2, field: f2 }) => {
                same_name(field, &f2)?;
                exp.merge_in(*e2)
            }
            (Exp::BinOp { op, e1, e2 }, Exp::BinOp { op: o2, e1: b1, e2: b2 }) => {
                if *op != o2 {
                    return Err(Mismatch::Operator {
                        expected: op.symbol(),
                        found: o2.symbol(),
                    });
                }
                e1.merge_in(*b1)?;
                e2.merge_in(*b2)
            }
            (Exp::Op1 { op, e }, Exp::Op1 { op: o2, e: e2 }) => {
                if *op != o2 {
                    return Err(Mismatch::Operator {
                        expected: op.symbol(),
                        found: o2.symbol(),
                    });
                }
                e.merge_in(*e2)
            }
            (Exp::Let { name, named }, Exp::Let { name: n2, named: v2 }) => {
                same_name(name, &n2)?;
                named.merge_in(*v2)
            }
            (Exp::Set { name, named }, Exp::Set { name: n2, named: v2 }) => {
                merge_lval(name, n2)?;
                named.merge_in(*v2)
            }
            (Exp::Block { body }, Exp::Block { body: b2 }) => merge_body(body, b2),
            (
                Exp::If {
                    cond,
                    true_part,
                    false_part,
                },
                Exp::If {
                    cond: c2,
                    true_part: t2,
                    false_part: f2,
                },
            ) => {
                cond.merge_in(*c2)?;
                merge_body(true_part, t2)?;
                merge_body(false_part, f2)
            }
            (Exp::While { cond, body }, Exp::While { cond: c2, body: b2 }) => {
                cond.merge_in(*c2)?;
                merge_body(body, b2)
            }
            (
                Exp::Callback {
                    event,
                    event_arg,
                    callback_args,
                    clos,
                    body,
                },
                Exp::Callback {
                    event: ev2,
                    event_arg: a2,
                    callback_args: args2,
                    clos: c2,
                    body: b2,
                },
            ) => {
                same_name(event, &ev2)?;
                same_name(&callback_args.join(", "), &args2.join(", "))?;
                event_arg.merge_in(*a2)?;
                clos.merge_in(*c2)?;
                merge_body(body, b2)
            }
            (Exp::Label { name, body }, Exp::Label { name: n2, body: b2 }) => {
                same_name(name, &n2)?;
                merge_body(body, b2)
            }
            (Exp::Break { name, value }, Exp::Break { name: n2, value: v2 }) => {
                same_name(name, &n2)?;
                value.merge_in(*v2)
            }
            (Exp::Clos { tenv }, Exp::Clos { tenv: t2 }) => merge_map(tenv, t2),
            (Exp::Object { properties }, Exp::Object { properties: p2 }) => {
                merge_map(properties, p2)
            }
            (Exp::Array { exps }, Exp::Array { exps: e2 }) => merge_list("array", exps, e2),
            (Exp::Index { exp, index }, Exp::Index { exp: e2, index: i2 }) => {
                exp.merge_in(*e2)?;
                index.merge_in(*i2)
            }
            (
                Exp::MethodCall {
                    e,
                    method,
                    method_call_args,
                },
                Exp::MethodCall {
                    e: e2,
                    method: m2,
                    method_call_args: a2,
                },
            ) => {
                same_name(method, &m2)?;
                e.merge_in(*e2)?;
                merge_list("method arguments", method_call_args, a2)
            }
            (Exp::PrimApp { event, event_args }, Exp::PrimApp { event: ev2, event_args: a2 }) => {
                same_name(event, &ev2)?;
                merge_list("primitive arguments", event_args, a2)
            }
            (existing, incoming) => Err(Mismatch::Kind {
                expected: existing.kind_name(),
                found: incoming.kind_name(),
            }),
        }
    }
}

fn merge_lval(existing: &mut LVal, incoming: LVal) -> MergeResult {
    match (existing, incoming) {
        (LVal::Identifier { name }, LVal::Identifier { name: n2 }) => {
            if *name == n2 {
                Ok(())
            } else {
                Err(Mismatch::Identifier {
                    expected: name.clone(),
                    found: n2,
                })
            }
        }
        (LVal::From { exp, field }, LVal::From { exp: e2, field: f2 }) => {
            same_name(field, &f2)?;
            exp.merge_in(*e2)
        }
        (LVal::Index { exp, index }, LVal::Index { exp: e2, index: i2 }) => {
            exp.merge_in(*e2)?;
            index.merge_in(*i2)
        }
        (existing, incoming) => Err(Mismatch::Kind {
            expected: Exp::from(existing.clone()).kind_name(),
            found: Exp::from(incoming).kind_name(),
        }),
    }
}

/// Merge two statement sequences. A trailing hole on either side accepts the
/// rest of the other side; otherwise the lengths must agree.
pub(crate) fn merge_body(existing: &mut Vec<Exp>, incoming: Vec<Exp>) -> MergeResult {
    let expected = existing.len();
    let found = incoming.len();
    let mut incoming = incoming.into_iter();
    let mut i = 0;
    loop {
        match (existing.get(i).map(Exp::is_unknown), incoming.next()) {
            (Some(true), Some(item)) => {
                existing.truncate(i);
                existing.push(item);
                existing.extend(incoming);
                return Ok(());
            }
            (Some(true), None) => {
                existing.truncate(i);
                return Ok(());
            }
            (Some(false), Some(Exp::Unknown)) | (None, Some(Exp::Unknown)) | (None, None) => {
                return Ok(())
            }
            (Some(false), Some(item)) => existing[i].merge_in(item)?,
            (Some(false), None) | (None, Some(_)) => {
                return Err(Mismatch::Length {
                    what: "block",
                    expected,
                    found,
                })
            }
        }
        i += 1;
    }
}

fn merge_list(what: &'static str, existing: &mut [Exp], incoming: Vec<Exp>) -> MergeResult {
    if existing.len() != incoming.len() {
        return Err(Mismatch::Length {
            what,
            expected: existing.len(),
            found: incoming.len(),
        });
    }
    for (slot, item) in existing.iter_mut().zip(incoming) {
        slot.merge_in(item)?;
    }
    Ok(())
}

fn merge_map(existing: &mut IndexMap<String, Exp>, incoming: IndexMap<String, Exp>) -> MergeResult {
    let same_keys =
        existing.len() == incoming.len() && incoming.keys().all(|k| existing.contains_key(k));
    if !same_keys {
        return Err(Mismatch::Keys {
            expected: existing.keys().cloned().collect(),
            found: incoming.keys().cloned().collect(),
        });
    }
    for (key, value) in incoming {
        if let Some(slot) = existing.get_mut(&key) {
            slot.merge_in(value)?;
        }
    }
    Ok(())
}
