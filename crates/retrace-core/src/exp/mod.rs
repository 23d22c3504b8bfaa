/*!
# Trace IR

The tree the recorder builds while an instrumented program runs. Nodes are
plain data; the JSON form (`{"kind": "binop", "op": "+", ...}`) is what
downstream tools consume.

An [`Exp::Unknown`] marks a hole: a branch or block tail that no execution
has reached yet. Holes only ever sit at the end of a block.
*/

mod display;
mod merge;

pub use merge::Mismatch;

#[cfg(test)]
mod tests;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Binary operators recorded in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "===")]
    StrictEq,
    #[serde(rename = "!==")]
    StrictNe,
    #[serde(rename = "==")]
    LooseEq,
    #[serde(rename = "!=")]
    LooseNe,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

impl BinOp {
    pub const ALL: [BinOp; 15] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Mod,
        BinOp::StrictEq,
        BinOp::StrictNe,
        BinOp::LooseEq,
        BinOp::LooseNe,
        BinOp::Gt,
        BinOp::Lt,
        BinOp::Ge,
        BinOp::Le,
        BinOp::And,
        BinOp::Or,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::StrictEq => "===",
            BinOp::StrictNe => "!==",
            BinOp::LooseEq => "==",
            BinOp::LooseNe => "!=",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::Ge => ">=",
            BinOp::Le => "<=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }
}

/// Unary operators recorded in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op1 {
    #[serde(rename = "typeof")]
    Typeof,
    #[serde(rename = "void")]
    Void,
    #[serde(rename = "-")]
    Neg,
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "!")]
    Not,
}

impl Op1 {
    pub fn symbol(self) -> &'static str {
        match self {
            Op1::Typeof => "typeof",
            Op1::Void => "void",
            Op1::Neg => "-",
            Op1::Plus => "+",
            Op1::Not => "!",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        [Op1::Typeof, Op1::Void, Op1::Neg, Op1::Plus, Op1::Not]
            .into_iter()
            .find(|op| op.symbol() == symbol)
    }
}

/// Assignable locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LVal {
    Identifier { name: String },
    From { exp: Box<Exp>, field: String },
    Index { exp: Box<Exp>, index: Box<Exp> },
}

impl TryFrom<Exp> for LVal {
    type Error = Exp;

    fn try_from(exp: Exp) -> Result<Self, Self::Error> {
        match exp {
            Exp::Identifier { name } => Ok(LVal::Identifier { name }),
            Exp::From { exp, field } => Ok(LVal::From { exp, field }),
            Exp::Index { exp, index } => Ok(LVal::Index { exp, index }),
            // `obj.f = v` reads as an index with a constant key
            Exp::Get { exp, field } => Ok(LVal::Index {
                exp,
                index: Box::new(Exp::String { value: field }),
            }),
            other => Err(other),
        }
    }
}

impl From<LVal> for Exp {
    fn from(lval: LVal) -> Self {
        match lval {
            LVal::Identifier { name } => Exp::Identifier { name },
            LVal::From { exp, field } => Exp::From { exp, field },
            LVal::Index { exp, index } => Exp::Index { exp, index },
        }
    }
}

/// A node of the trace tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Exp {
    /// Not yet observed
    Unknown,

    // Literals
    Number {
        value: f64,
    },
    Boolean {
        value: bool,
    },
    String {
        value: String,
    },
    Undefined,

    Identifier {
        name: String,
    },
    /// Field read from a closure record
    From {
        exp: Box<Exp>,
        field: String,
    },
    /// Property read from an object
    Get {
        exp: Box<Exp>,
        field: String,
    },
    #[serde(rename = "binop")]
    BinOp {
        op: BinOp,
        e1: Box<Exp>,
        e2: Box<Exp>,
    },
    Op1 {
        op: Op1,
        e: Box<Exp>,
    },

    Let {
        name: String,
        named: Box<Exp>,
    },
    Set {
        name: LVal,
        named: Box<Exp>,
    },
    Block {
        body: Vec<Exp>,
    },
    If {
        cond: Box<Exp>,
        #[serde(rename = "truePart")]
        true_part: Vec<Exp>,
        #[serde(rename = "falsePart")]
        false_part: Vec<Exp>,
    },
    While {
        cond: Box<Exp>,
        body: Vec<Exp>,
    },
    Callback {
        event: String,
        #[serde(rename = "eventArg")]
        event_arg: Box<Exp>,
        #[serde(rename = "callbackArgs")]
        callback_args: Vec<String>,
        clos: Box<Exp>,
        body: Vec<Exp>,
    },
    Label {
        name: String,
        body: Vec<Exp>,
    },
    Break {
        name: String,
        value: Box<Exp>,
    },

    /// Closure record: captured name to its source expression
    Clos {
        tenv: IndexMap<String, Exp>,
    },
    Object {
        properties: IndexMap<String, Exp>,
    },
    Array {
        exps: Vec<Exp>,
    },
    Index {
        exp: Box<Exp>,
        index: Box<Exp>,
    },
    MethodCall {
        e: Box<Exp>,
        method: String,
        #[serde(rename = "methodCallArgs")]
        method_call_args: Vec<Exp>,
    },
    PrimApp {
        event: String,
        #[serde(rename = "eventArgs")]
        event_args: Vec<Exp>,
    },
}

/// Which nested block of a node a path step descends into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    /// `truePart` of an if
    True,
    /// `falsePart` of an if
    False,
    /// `body` of a while, label or callback
    Body,
    /// the block bound by a call-site `let`
    Named,
}

impl Exp {
    /// Name of the node kind as it appears in the JSON `kind` tag.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Exp::Unknown => "unknown",
            Exp::Number { .. } => "number",
            Exp::Boolean { .. } => "boolean",
            Exp::String { .. } => "string",
            Exp::Undefined => "undefined",
            Exp::Identifier { .. } => "identifier",
            Exp::From { .. } => "from",
            Exp::Get { .. } => "get",
            Exp::BinOp { .. } => "binop",
            Exp::Op1 { .. } => "op1",
            Exp::Let { .. } => "let",
            Exp::Set { .. } => "set",
            Exp::Block { .. } => "block",
            Exp::If { .. } => "if",
            Exp::While { .. } => "while",
            Exp::Callback { .. } => "callback",
            Exp::Label { .. } => "label",
            Exp::Break { .. } => "break",
            Exp::Clos { .. } => "clos",
            Exp::Object { .. } => "object",
            Exp::Array { .. } => "array",
            Exp::Index { .. } => "index",
            Exp::MethodCall { .. } => "methodCall",
            Exp::PrimApp { .. } => "primApp",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Exp::Unknown)
    }

    /// The nested block selected by `part`, if this node has one.
    pub fn block_mut(&mut self, part: Part) -> Option<&mut Vec<Exp>> {
        match (self, part) {
            (Exp::If { true_part, .. }, Part::True) => Some(true_part),
            (Exp::If { false_part, .. }, Part::False) => Some(false_part),
            (Exp::While { body, .. }, Part::Body)
            | (Exp::Label { body, .. }, Part::Body)
            | (Exp::Callback { body, .. }, Part::Body) => Some(body),
            (Exp::Let { named, .. }, Part::Named) => match named.as_mut() {
                Exp::Block { body } => Some(body),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn block(&self, part: Part) -> Option<&Vec<Exp>> {
        match (self, part) {
            (Exp::If { true_part, .. }, Part::True) => Some(true_part),
            (Exp::If { false_part, .. }, Part::False) => Some(false_part),
            (Exp::While { body, .. }, Part::Body)
            | (Exp::Label { body, .. }, Part::Body)
            | (Exp::Callback { body, .. }, Part::Body) => Some(body),
            (Exp::Let { named, .. }, Part::Named) => match named.as_ref() {
                Exp::Block { body } => Some(body),
                _ => None,
            },
            _ => None,
        }
    }

    /// Serialize to the JSON interchange form.
    pub fn to_json(&self) -> serde_json::Value {
        // Serialization of this tree cannot fail: keys are strings and
        // numbers map to JSON numbers or null.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Constructors mirroring the builder functions exposed to instrumented code.
pub mod builders {
    use super::*;

    pub fn unknown() -> Exp {
        Exp::Unknown
    }

    pub fn number(value: f64) -> Exp {
        Exp::Number { value }
    }

    pub fn boolean(value: bool) -> Exp {
        Exp::Boolean { value }
    }

    pub fn string(value: impl Into<String>) -> Exp {
        Exp::String {
            value: value.into(),
        }
    }

    pub fn undefined() -> Exp {
        Exp::Undefined
    }

    pub fn identifier(name: impl Into<String>) -> Exp {
        Exp::Identifier { name: name.into() }
    }

    pub fn from(exp: Exp, field: impl Into<String>) -> Exp {
        Exp::From {
            exp: Box::new(exp),
            field: field.into(),
        }
    }

    pub fn get(exp: Exp, field: impl Into<String>) -> Exp {
        Exp::Get {
            exp: Box::new(exp),
            field: field.into(),
        }
    }

    pub fn binop(op: BinOp, e1: Exp, e2: Exp) -> Exp {
        Exp::BinOp {
            op,
            e1: Box::new(e1),
            e2: Box::new(e2),
        }
    }

    pub fn op1(op: Op1, e: Exp) -> Exp {
        Exp::Op1 { op, e: Box::new(e) }
    }

    pub fn let_(name: impl Into<String>, named: Exp) -> Exp {
        Exp::Let {
            name: name.into(),
            named: Box::new(named),
        }
    }

    pub fn set(name: LVal, named: Exp) -> Exp {
        Exp::Set {
            name,
            named: Box::new(named),
        }
    }

    pub fn block(body: Vec<Exp>) -> Exp {
        Exp::Block { body }
    }

    pub fn if_(cond: Exp, true_part: Vec<Exp>, false_part: Vec<Exp>) -> Exp {
        Exp::If {
            cond: Box::new(cond),
            true_part,
            false_part,
        }
    }

    pub fn while_(cond: Exp, body: Vec<Exp>) -> Exp {
        Exp::While {
            cond: Box::new(cond),
            body,
        }
    }

    pub fn callback(
        event: impl Into<String>,
        event_arg: Exp,
        callback_args: Vec<String>,
        clos: Exp,
        body: Vec<Exp>,
    ) -> Exp {
        Exp::Callback {
            event: event.into(),
            event_arg: Box::new(event_arg),
            callback_args,
            clos: Box::new(clos),
            body,
        }
    }

    pub fn label(name: impl Into<String>, body: Vec<Exp>) -> Exp {
        Exp::Label {
            name: name.into(),
            body,
        }
    }

    pub fn break_(name: impl Into<String>, value: Exp) -> Exp {
        Exp::Break {
            name: name.into(),
            value: Box::new(value),
        }
    }

    pub fn clos(tenv: IndexMap<String, Exp>) -> Exp {
        Exp::Clos { tenv }
    }

    pub fn object(properties: IndexMap<String, Exp>) -> Exp {
        Exp::Object { properties }
    }

    pub fn array(exps: Vec<Exp>) -> Exp {
        Exp::Array { exps }
    }

    pub fn index(exp: Exp, index: Exp) -> Exp {
        Exp::Index {
            exp: Box::new(exp),
            index: Box::new(index),
        }
    }

    pub fn method_call(e: Exp, method: impl Into<String>, args: Vec<Exp>) -> Exp {
        Exp::MethodCall {
            e: Box::new(e),
            method: method.into(),
            method_call_args: args,
        }
    }

    pub fn prim_app(event: impl Into<String>, event_args: Vec<Exp>) -> Exp {
        Exp::PrimApp {
            event: event.into(),
            event_args,
        }
    }
}
