// Unified AST for the traced script subset
// This AST is produced by the pest parser, rewritten by the normalizer and the
// instrumentation pass, and printed back to source by `ToSource`.

pub mod source_gen;
pub use source_gen::ToSource;

#[cfg(test)]
mod source_gen_tests;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source location of a statement or expression (1-based line and column).
/// Nodes synthesized by the rewriting passes carry `Span::default()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Binary and logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNe => "!==",
            BinaryOp::LooseEq => "==",
            BinaryOp::LooseNe => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength used by the printer; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::StrictEq | BinaryOp::StrictNe | BinaryOp::LooseEq | BinaryOp::LooseNe => 3,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 4,
            BinaryOp::Add | BinaryOp::Sub => 5,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    Typeof,
    Void,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Typeof => "typeof",
            UnaryOp::Void => "void",
        }
    }
}

/// `++` / `--`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

impl UpdateOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UpdateOp::Increment => "++",
            UpdateOp::Decrement => "--",
        }
    }

    /// The binary operator the update desugars to (`x++` is `x = x + 1`).
    pub fn binary(self) -> BinaryOp {
        match self {
            UpdateOp::Increment => BinaryOp::Add,
            UpdateOp::Decrement => BinaryOp::Sub,
        }
    }
}

/// Assignment operators; compound forms are removed by the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
        }
    }

    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
        }
    }
}

/// Binding type for declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclKind {
    /// let x = ... (mutable binding)
    Let,
    /// const x = ... (immutable binding)
    Const,
    /// var x = ... (treated as a block-scoped binding)
    Var,
}

impl DeclKind {
    pub fn keyword(self) -> &'static str {
        match self {
            DeclKind::Let => "let",
            DeclKind::Const => "const",
            DeclKind::Var => "var",
        }
    }
}

/// Left-hand side of a declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// Simple identifier: x
    Identifier(String),
    /// Array destructuring of identifiers: [a, b, c]
    Array(Vec<String>),
}

impl Pattern {
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Pattern::Identifier(name) => Some(name),
            Pattern::Array(_) => None,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            Pattern::Identifier(name) => vec![name.as_str()],
            Pattern::Array(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declarator {
    pub target: Pattern,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Null,

    Identifier(String),

    // Collections
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),

    // Anonymous or named function expression
    Function {
        name: Option<String>,
        params: Vec<String>,
        body: Vec<Stmt>,
    },

    // Property and index access
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },

    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Declare {
        kind: DeclKind,
        declarations: Vec<Declarator>,
    },
    Function {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    If {
        test: Expr,
        consequent: Vec<Stmt>,
        alternate: Option<Vec<Stmt>>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    Labeled {
        label: String,
        body: Vec<Stmt>,
    },
    Break {
        label: Option<String>,
    },
    Return {
        value: Option<Expr>,
    },
    Block(Vec<Stmt>),
    Expr(Expr),
}

/// Top-level program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self { body }
    }
}

// Helper constructors used by the rewriting passes
impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn synthetic(kind: ExprKind) -> Self {
        Self::new(kind, Span::default())
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::Identifier(name.into()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::String(value.into()))
    }

    pub fn number(value: f64) -> Self {
        Self::synthetic(ExprKind::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::synthetic(ExprKind::Boolean(value))
    }

    pub fn array(elements: Vec<Expr>) -> Self {
        Self::synthetic(ExprKind::Array(elements))
    }

    pub fn object(entries: Vec<(String, Expr)>) -> Self {
        Self::synthetic(ExprKind::Object(entries))
    }

    pub fn member(object: Expr, property: impl Into<String>) -> Self {
        Self::synthetic(ExprKind::Member {
            object: Box::new(object),
            property: property.into(),
        })
    }

    /// `object.method(args...)`
    pub fn method_call(object: Expr, method: &str, args: Vec<Expr>) -> Self {
        Self::synthetic(ExprKind::Call {
            callee: Box::new(Expr::member(object, method)),
            args,
        })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::synthetic(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, ExprKind::Call { .. })
    }

    /// Short human-readable name of the node kind, used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match &self.kind {
            ExprKind::Number(_) => "number literal",
            ExprKind::String(_) => "string literal",
            ExprKind::Boolean(_) => "boolean literal",
            ExprKind::Null => "null literal",
            ExprKind::Identifier(_) => "identifier",
            ExprKind::Array(_) => "array literal",
            ExprKind::Object(_) => "object literal",
            ExprKind::Function { .. } => "function expression",
            ExprKind::Member { .. } => "member expression",
            ExprKind::Index { .. } => "computed member expression",
            ExprKind::Call { .. } => "call expression",
            ExprKind::Unary { .. } => "unary expression",
            ExprKind::Binary { .. } => "binary expression",
            ExprKind::Assign { .. } => "assignment expression",
            ExprKind::Update { .. } => "update expression",
        }
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn synthetic(kind: StmtKind) -> Self {
        Self::new(kind, Span::default())
    }

    pub fn expr(expr: Expr) -> Self {
        let span = expr.span;
        Self::new(StmtKind::Expr(expr), span)
    }

    /// `let name = init;`
    pub fn let_(name: impl Into<String>, init: Expr) -> Self {
        Self::synthetic(StmtKind::Declare {
            kind: DeclKind::Let,
            declarations: vec![Declarator {
                target: Pattern::Identifier(name.into()),
                init: Some(init),
            }],
        })
    }

    pub fn describe(&self) -> &'static str {
        match &self.kind {
            StmtKind::Declare { .. } => "declaration",
            StmtKind::Function { .. } => "function declaration",
            StmtKind::If { .. } => "if statement",
            StmtKind::While { .. } => "while statement",
            StmtKind::Labeled { .. } => "labeled statement",
            StmtKind::Break { .. } => "break statement",
            StmtKind::Return { .. } => "return statement",
            StmtKind::Block(_) => "block statement",
            StmtKind::Expr(_) => "expression statement",
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}
