//! The typed AST the optimizer consumes and returns.
//!
//! Produced by an external front end (lexer, parser, type checker, macro
//! expander) that this workspace treats as a collaborator with a fixed
//! interface: a fully-typed [`Program`] in, a semantically-equivalent
//! [`Program`] out. Every node owns its children exclusively; passes clone
//! rather than share subtrees.

use crate::span::SourceLocation;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinOp {
    /// Operators reassociate can linearize: commutative and associative.
    pub fn is_reassociable(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::And | BinOp::Or
        )
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum InterpPart {
    Text(String),
    Expr(Box<Expr>),
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicOp {
    Load,
    Store,
    Add,
    CompareExchange,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelOp {
    Send,
    Recv,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_name: Option<String>,
    pub by_ref: bool,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub pattern: Expr,
    pub guard: Option<Expr>,
    pub body: Block,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    CharLiteral(char),
    StringLiteral(String),
    Identifier(String),

    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    MemberAccess {
        object: Box<Expr>,
        field: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    RangeInclusive {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<Expr>,
    },
    ListLiteral(Vec<Expr>),
    RecordLiteral {
        type_name: String,
        fields: Vec<(String, Expr)>,
    },
    ListComprehension {
        element: Box<Expr>,
        var: String,
        iterable: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
    AssignExpr {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    AddressOf(Box<Expr>),
    Deref(Box<Expr>),
    Borrow {
        mutable: bool,
        expr: Box<Expr>,
    },
    New {
        type_name: String,
        args: Vec<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        type_name: String,
    },
    Await(Box<Expr>),
    Spawn(Box<Expr>),
    Channel {
        op: ChannelOp,
        channel: Box<Expr>,
        value: Option<Box<Expr>>,
    },
    Atomic {
        op: AtomicOp,
        target: Box<Expr>,
        value: Option<Box<Expr>>,
    },
    InterpolatedString(Vec<InterpPart>),
    Walrus {
        name: String,
        value: Box<Expr>,
    },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SourceLocation,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: SourceLocation) -> Self {
        Self { kind, loc }
    }

    pub fn synthetic(kind: ExprKind) -> Self {
        Self { kind, loc: SourceLocation::synthetic() }
    }

    pub fn ident(name: impl Into<String>, loc: SourceLocation) -> Self {
        Self::new(ExprKind::Identifier(name.into()), loc)
    }

    pub fn int(value: i64, loc: SourceLocation) -> Self {
        Self::new(ExprKind::IntLiteral(value), loc)
    }

    /// Walks every direct call target reachable without descending into a
    /// nested call's own arguments. Used by the tail-call pass to tell
    /// `f(g(x))` (not tail-recursive on `g`'s argument position) from the
    /// top-level call `f`.
    pub fn is_call_to(&self, name: &str) -> bool {
        matches!(&self.kind, ExprKind::Call { callee, .. } if matches!(&callee.kind, ExprKind::Identifier(n) if n == name))
    }

    /// True if `name` is called anywhere inside this expression, including
    /// nested argument positions. Used to reject non-tail recursive calls
    /// hidden inside an argument (the Ackermann case).
    pub fn contains_call_to(&self, name: &str) -> bool {
        struct Finder<'a> {
            name: &'a str,
            found: bool,
        }
        impl<'a> Finder<'a> {
            fn visit(&mut self, e: &Expr) {
                if self.found {
                    return;
                }
                if e.is_call_to(self.name) {
                    self.found = true;
                    return;
                }
                walk_expr_children(e, &mut |child| self.visit(child));
            }
        }
        let mut f = Finder { name, found: false };
        f.visit(self);
        f.found
    }
}

/// Visits the immediate child expressions of `expr`, one level deep.
pub fn walk_expr_children(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    match &expr.kind {
        ExprKind::IntLiteral(_)
        | ExprKind::FloatLiteral(_)
        | ExprKind::BoolLiteral(_)
        | ExprKind::CharLiteral(_)
        | ExprKind::StringLiteral(_)
        | ExprKind::Identifier(_) => {}
        ExprKind::Binary { left, right, .. } => {
            f(left);
            f(right);
        }
        ExprKind::Unary { operand, .. } => f(operand),
        ExprKind::Ternary { cond, then_value, else_value } => {
            f(cond);
            f(then_value);
            f(else_value);
        }
        ExprKind::Call { callee, args } => {
            f(callee);
            for a in args {
                f(a);
            }
        }
        ExprKind::MemberAccess { object, .. } => f(object),
        ExprKind::Index { object, index } => {
            f(object);
            f(index);
        }
        ExprKind::Range { start, end } | ExprKind::RangeInclusive { start, end } => {
            f(start);
            f(end);
        }
        ExprKind::Lambda { body, .. } => f(body),
        ExprKind::ListLiteral(items) => items.iter().for_each(f),
        ExprKind::RecordLiteral { fields, .. } => fields.iter().for_each(|(_, v)| f(v)),
        ExprKind::ListComprehension { element, iterable, condition, .. } => {
            f(element);
            f(iterable);
            if let Some(c) = condition {
                f(c);
            }
        }
        ExprKind::AssignExpr { target, value } => {
            f(target);
            f(value);
        }
        ExprKind::AddressOf(e) | ExprKind::Deref(e) | ExprKind::Await(e) | ExprKind::Spawn(e) => f(e),
        ExprKind::Borrow { expr, .. } => f(expr),
        ExprKind::New { args, .. } => args.iter().for_each(f),
        ExprKind::Cast { expr, .. } => f(expr),
        ExprKind::Channel { channel, value, .. } => {
            f(channel);
            if let Some(v) = value {
                f(v);
            }
        }
        ExprKind::Atomic { target, value, .. } => {
            f(target);
            if let Some(v) = value {
                f(v);
            }
        }
        ExprKind::InterpolatedString(parts) => {
            for p in parts {
                if let InterpPart::Expr(e) = p {
                    f(e);
                }
            }
        }
        ExprKind::Walrus { value, .. } => f(value),
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    ExprStmt(Expr),
    Return(Option<Expr>),
    VarDecl {
        name: String,
        type_name: Option<String>,
        mutable: bool,
        is_const: bool,
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Block,
        elifs: Vec<(Expr, Block)>,
        else_branch: Option<Block>,
    },
    While {
        cond: Expr,
        body: Block,
        label: Option<String>,
    },
    ForIn {
        var: String,
        iterable: Expr,
        body: Block,
        label: Option<String>,
    },
    Block(Block),
    Break(Option<String>),
    Continue(Option<String>),
    Match {
        scrutinee: Expr,
        cases: Vec<MatchCase>,
        default: Option<Block>,
    },
    TryElse {
        try_block: Block,
        else_block: Block,
    },
    Unsafe(Block),
    Delete(Expr),
    DestructuringDecl {
        names: Vec<String>,
        init: Expr,
    },
    FnDecl(FnDecl),
    ModuleDecl {
        name: String,
        body: Vec<Stmt>,
    },
    RecordDecl {
        name: String,
        fields: Vec<(String, String)>,
    },
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub body: Block,
    pub is_extern: bool,
    pub is_async: bool,
    pub is_comptime: bool,
}

impl FnDecl {
    /// extern/async/comptime functions are never rewritten by the tail-call
    /// pass: extern has no body to loop inside, async's state machine
    /// doesn't compose with `while true`, comptime runs in the evaluator.
    pub fn eligible_for_tail_call_opt(&self) -> bool {
        !self.is_extern && !self.is_async && !self.is_comptime
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLocation,
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: SourceLocation) -> Self {
        Self { kind, loc }
    }

    pub fn synthetic(kind: StmtKind) -> Self {
        Self { kind, loc: SourceLocation::synthetic() }
    }
}

/// Visits the immediate child statements of `stmt`, one level deep (does not
/// recurse into nested blocks' own children).
pub fn walk_stmt_blocks(stmt: &Stmt, f: &mut impl FnMut(&Block)) {
    match &stmt.kind {
        StmtKind::If { then_branch, elifs, else_branch, .. } => {
            f(then_branch);
            for (_, b) in elifs {
                f(b);
            }
            if let Some(b) = else_branch {
                f(b);
            }
        }
        StmtKind::While { body, .. } | StmtKind::ForIn { body, .. } => f(body),
        StmtKind::Block(b) | StmtKind::Unsafe(b) => f(b),
        StmtKind::Match { cases, default, .. } => {
            for c in cases {
                f(&c.body);
            }
            if let Some(b) = default {
                f(b);
            }
        }
        StmtKind::TryElse { try_block, else_block } => {
            f(try_block);
            f(else_block);
        }
        StmtKind::FnDecl(decl) => f(&decl.body),
        _ => {}
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub items: Vec<Stmt>,
}

impl Program {
    pub fn new(items: Vec<Stmt>) -> Self {
        Self { items }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FnDecl> {
        self.items.iter().filter_map(|s| match &s.kind {
            StmtKind::FnDecl(f) => Some(f),
            _ => None,
        })
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut FnDecl> {
        self.items.iter_mut().filter_map(|s| match &mut s.kind {
            StmtKind::FnDecl(f) => Some(f),
            _ => None,
        })
    }
}
