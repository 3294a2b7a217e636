use std::rc::Rc;

/// An expression with the byte range it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExprLoc {
    pub expr: Expr,
    pub start: usize,
    pub end: usize,
}

impl ExprLoc {
    pub fn new(expr: Expr, start: usize, end: usize) -> Self {
        Self { expr, start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Shovel,
}

impl BinOp {
    /// Name of the method the operator dispatches to.
    pub fn method_name(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Shovel => "<<",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StrPart {
    Lit(String),
    Interp(Vec<ExprLoc>),
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    Local(String),
    Global(String),
    Const(String),
    Index { receiver: Box<ExprLoc>, index: Box<ExprLoc> },
}

/// `do |params| ... end` or `{ |params| ... }` attached to a call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Block {
    pub params: Vec<String>,
    pub body: Vec<ExprLoc>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MethodDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<ExprLoc>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Rescue {
    /// Variable bound by `rescue => name`.
    pub binding: Option<String>,
    pub body: Vec<ExprLoc>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Nil,
    True,
    False,
    SelfRef,
    Int(i64),
    Float(f64),
    Str(Vec<StrPart>),
    Symbol(String),
    Array(Vec<ExprLoc>),
    LocalVar(String),
    GlobalVar(String),
    Const(String),
    Assign {
        target: Target,
        value: Box<ExprLoc>,
    },
    /// `target op= value`, and `target ||= value` when `op` is `None`.
    OpAssign {
        target: Target,
        op: Option<BinOp>,
        value: Box<ExprLoc>,
    },
    Binary {
        op: BinOp,
        left: Box<ExprLoc>,
        right: Box<ExprLoc>,
    },
    And(Box<ExprLoc>, Box<ExprLoc>),
    Or(Box<ExprLoc>, Box<ExprLoc>),
    Not(Box<ExprLoc>),
    Neg(Box<ExprLoc>),
    Call {
        receiver: Option<Box<ExprLoc>>,
        name: String,
        args: Vec<ExprLoc>,
        block: Option<Rc<Block>>,
    },
    Index {
        receiver: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    If {
        cond: Box<ExprLoc>,
        then_body: Vec<ExprLoc>,
        else_body: Vec<ExprLoc>,
    },
    While {
        cond: Box<ExprLoc>,
        body: Vec<ExprLoc>,
        /// `until` loops run while the condition is falsy.
        until: bool,
    },
    Def(Rc<MethodDef>),
    Return(Option<Box<ExprLoc>>),
    /// `begin ... end` or a parenthesized statement list.
    Begin {
        body: Vec<ExprLoc>,
        rescue: Option<Rescue>,
    },
}

/// Top-level statement list of a parsed document.
///
/// `None` marks an empty statement between two semicolons.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Program {
    pub statements: Vec<Option<ExprLoc>>,
}
