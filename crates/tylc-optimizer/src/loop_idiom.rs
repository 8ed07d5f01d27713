//! Recognizes `for i in 0..n { a[i] = v }` (`v` loop-invariant) as a memset
//! and `for i in 0..n { a[i] = b[i] }` (`a` and `b` distinct) as a memcpy,
//! rewriting each into a call to the matching compiler intrinsic.
//!
//! Both forms require the range to start at the literal `0` with a step of
//! one — anything else (a non-zero start, a reversed range, a `while`
//! loop) is outside what this recognizer attempts.

use tylc_core::ast::*;
use tylc_core::SourceLocation;

use crate::util::contains_identifier;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopIdiomStats {
    pub memset_patterns: usize,
    pub memcpy_patterns: usize,
}

fn zero_based_count(iterable: &Expr, loc: SourceLocation) -> Option<Expr> {
    match &iterable.kind {
        ExprKind::Range { start, end } if matches!(&start.kind, ExprKind::IntLiteral(0)) => Some((**end).clone()),
        ExprKind::RangeInclusive { start, end } if matches!(&start.kind, ExprKind::IntLiteral(0)) => {
            Some(Expr::new(ExprKind::Binary { op: BinOp::Add, left: Box::new((**end).clone()), right: Box::new(Expr::int(1, loc)) }, loc))
        }
        _ => None,
    }
}

fn index_target<'a>(expr: &'a Expr, var: &str) -> Option<&'a str> {
    if let ExprKind::Index { object, index } = &expr.kind {
        if matches!(&index.kind, ExprKind::Identifier(n) if n == var) {
            if let ExprKind::Identifier(array) = &object.kind {
                return Some(array);
            }
        }
    }
    None
}

fn recognize(var: &str, iterable: &Expr, body: &Block, loc: SourceLocation) -> Option<(Expr, bool)> {
    if body.stmts.len() != 1 {
        return None;
    }
    let StmtKind::Assign { target, value } = &body.stmts[0].kind else { return None };
    let dest = index_target(target, var)?;
    let count = zero_based_count(iterable, loc)?;

    if let Some(src) = index_target(value, var) {
        if src != dest {
            let call = ExprKind::Call {
                callee: Box::new(Expr::ident("__builtin_memcpy", loc)),
                args: vec![Expr::ident(dest, loc), Expr::ident(src, loc), count],
            };
            return Some((Expr::new(call, loc), true));
        }
        return None;
    }

    if !contains_identifier(value, var) {
        let call = ExprKind::Call { callee: Box::new(Expr::ident("__builtin_memset", loc)), args: vec![Expr::ident(dest, loc), value.clone(), count] };
        return Some((Expr::new(call, loc), false));
    }
    None
}

fn process_block(block: &mut Block, stats: &mut LoopIdiomStats) {
    for stmt in block.stmts.iter_mut() {
        walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, stats));

        let replacement = if let StmtKind::ForIn { var, iterable, body, .. } = &stmt.kind {
            recognize(var, iterable, body, stmt.loc)
        } else {
            None
        };
        if let Some((call_expr, is_memcpy)) = replacement {
            *stmt = Stmt::new(StmtKind::ExprStmt(call_expr), stmt.loc);
            if is_memcpy {
                stats.memcpy_patterns += 1;
            } else {
                stats.memset_patterns += 1;
            }
        }
    }
}

fn walk_stmt_blocks_mut(stmt: &mut Stmt, f: &mut impl FnMut(&mut Block)) {
    match &mut stmt.kind {
        StmtKind::While { body, .. } | StmtKind::ForIn { body, .. } => f(body),
        StmtKind::Block(b) | StmtKind::Unsafe(b) => f(b),
        StmtKind::If { then_branch, elifs, else_branch, .. } => {
            f(then_branch);
            for (_, b) in elifs.iter_mut() {
                f(b);
            }
            if let Some(b) = else_branch {
                f(b);
            }
        }
        StmtKind::Match { cases, default, .. } => {
            for c in cases.iter_mut() {
                f(&mut c.body);
            }
            if let Some(b) = default {
                f(b);
            }
        }
        StmtKind::TryElse { try_block, else_block } => {
            f(try_block);
            f(else_block);
        }
        _ => {}
    }
}

pub fn run(program: &mut Program) -> LoopIdiomStats {
    let mut stats = LoopIdiomStats::default();
    for decl in program.functions_mut() {
        process_block(&mut decl.body, &mut stats);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::synthetic()
    }

    fn index(array: &str, var: &str) -> Expr {
        Expr::new(ExprKind::Index { object: Box::new(Expr::ident(array, loc())), index: Box::new(Expr::ident(var, loc())) }, loc())
    }

    #[test]
    fn recognizes_a_memset_pattern() {
        let range = Expr::new(ExprKind::Range { start: Box::new(Expr::int(0, loc())), end: Box::new(Expr::ident("n", loc())) }, loc());
        let body = Block::new(vec![Stmt::new(StmtKind::Assign { target: index("a", "i"), value: Expr::int(0, loc()) }, loc())]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::ForIn { var: "i".into(), iterable: range, body, label: None }, loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.memset_patterns, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::ExprStmt(call) = &decl.body.stmts[0].kind else { panic!() };
        let ExprKind::Call { callee, .. } = &call.kind else { panic!() };
        assert_eq!(callee.kind, ExprKind::Identifier("__builtin_memset".into()));
    }

    #[test]
    fn recognizes_a_memcpy_pattern() {
        let range = Expr::new(ExprKind::Range { start: Box::new(Expr::int(0, loc())), end: Box::new(Expr::ident("n", loc())) }, loc());
        let body = Block::new(vec![Stmt::new(StmtKind::Assign { target: index("a", "i"), value: index("b", "i") }, loc())]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::ForIn { var: "i".into(), iterable: range, body, label: None }, loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.memcpy_patterns, 1);
    }

    #[test]
    fn a_value_depending_on_the_induction_variable_is_not_a_memset() {
        let range = Expr::new(ExprKind::Range { start: Box::new(Expr::int(0, loc())), end: Box::new(Expr::ident("n", loc())) }, loc());
        let value = Expr::new(ExprKind::Binary { op: BinOp::Mul, left: Box::new(Expr::ident("i", loc())), right: Box::new(Expr::int(2, loc())) }, loc());
        let body = Block::new(vec![Stmt::new(StmtKind::Assign { target: index("a", "i"), value }, loc())]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::ForIn { var: "i".into(), iterable: range, body, label: None }, loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.memset_patterns, 0);
        assert_eq!(stats.memcpy_patterns, 0);
    }
}
