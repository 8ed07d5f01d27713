//! Deletes a `for` loop whose body has no observable side effects and
//! whose every loop-modified variable is dead by the end of the enclosing
//! block.
//!
//! Scoped to `for` loops over a `Range`/`RangeInclusive` — those are the
//! only loops this pass can prove terminate without a general trip-count
//! analysis. Liveness is checked against the remaining statements of the
//! same block only, not the full control-flow graph past it; a variable
//! that escapes through an enclosing loop's next iteration or a sibling
//! function is out of reach of this analysis and the loop is kept.

use std::collections::HashSet;

use tylc_core::ast::*;

use crate::util::assigned_names;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopDeletionStats {
    pub for_loops_deleted: usize,
}

fn expr_has_side_effect(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { .. } | ExprKind::Channel { .. } | ExprKind::Atomic { .. } | ExprKind::Spawn(_) | ExprKind::Await(_) | ExprKind::New { .. } => true,
        ExprKind::AssignExpr { target, value } => !matches!(&target.kind, ExprKind::Identifier(_)) || expr_has_side_effect(value),
        _ => {
            let mut found = false;
            walk_expr_children(expr, &mut |c| found |= expr_has_side_effect(c));
            found
        }
    }
}

fn body_has_side_effects(block: &Block) -> bool {
    block.stmts.iter().any(|stmt| {
        let here = match &stmt.kind {
            StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => expr_has_side_effect(e),
            StmtKind::VarDecl { init: Some(e), .. } => expr_has_side_effect(e),
            StmtKind::Assign { target, value } => !matches!(&target.kind, ExprKind::Identifier(_)) || expr_has_side_effect(value),
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => expr_has_side_effect(cond),
            StmtKind::Return(None) | StmtKind::Break(_) | StmtKind::Continue(_) => false,
            _ => false,
        };
        if here {
            return true;
        }
        let mut found = false;
        walk_stmt_blocks(stmt, &mut |b| found |= body_has_side_effects(b));
        found
    })
}

fn reads_any(expr: &Expr, names: &HashSet<String>) -> bool {
    if let ExprKind::Identifier(n) = &expr.kind {
        if names.contains(n) {
            return true;
        }
    }
    let mut found = false;
    walk_expr_children(expr, &mut |c| found |= reads_any(c, names));
    found
}

fn stmt_reads_any(stmt: &Stmt, names: &HashSet<String>) -> bool {
    let here = match &stmt.kind {
        StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => reads_any(e, names),
        StmtKind::VarDecl { init: Some(e), .. } => reads_any(e, names),
        StmtKind::Assign { target, value } => reads_any(target, names) || reads_any(value, names),
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => reads_any(cond, names),
        StmtKind::ForIn { iterable, .. } => reads_any(iterable, names),
        _ => false,
    };
    if here {
        return true;
    }
    let mut found = false;
    walk_stmt_blocks(stmt, &mut |b| found |= b.stmts.iter().any(|s| stmt_reads_any(s, names)));
    found
}

fn is_deletable(var: &str, iterable: &Expr, body: &Block, following: &[Stmt]) -> bool {
    if !matches!(&iterable.kind, ExprKind::Range { .. } | ExprKind::RangeInclusive { .. }) {
        return false;
    }
    if body_has_side_effects(body) {
        return false;
    }
    let mut modified = assigned_names(body);
    modified.insert(var.to_string());
    !following.iter().any(|s| stmt_reads_any(s, &modified))
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

fn process_block(block: &mut Block, stats: &mut LoopDeletionStats) {
    for stmt in block.stmts.iter_mut() {
        walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, stats));
    }

    let mut keep = vec![true; block.stmts.len()];
    for i in 0..block.stmts.len() {
        if let StmtKind::ForIn { var, iterable, body, .. } = &block.stmts[i].kind {
            if is_deletable(var, iterable, body, &block.stmts[i + 1..]) {
                keep[i] = false;
                stats.for_loops_deleted += 1;
            }
        }
    }

    let mut kept = keep.into_iter();
    block.stmts.retain(|_| kept.next().unwrap());
}

pub fn run(program: &mut Program) -> LoopDeletionStats {
    let mut stats = LoopDeletionStats::default();
    for decl in program.functions_mut() {
        process_block(&mut decl.body, &mut stats);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use tylc_core::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::synthetic()
    }

    #[test]
    fn deletes_a_loop_whose_result_is_never_used() {
        let range = Expr::new(ExprKind::Range { start: Box::new(Expr::int(0, loc())), end: Box::new(Expr::ident("n", loc())) }, loc());
        let body = Block::new(vec![Stmt::new(
            StmtKind::VarDecl {
                name: "x".into(),
                type_name: None,
                mutable: true,
                is_const: false,
                init: Some(Expr::new(ExprKind::Binary { op: BinOp::Mul, left: Box::new(Expr::ident("i", loc())), right: Box::new(Expr::int(2, loc())) }, loc())),
            },
            loc(),
        )]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![
                Stmt::new(StmtKind::ForIn { var: "i".into(), iterable: range, body, label: None }, loc()),
                Stmt::new(StmtKind::Return(Some(Expr::int(0, loc()))), loc()),
            ]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.for_loops_deleted, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        assert_eq!(decl.body.stmts.len(), 1);
    }

    #[test]
    fn keeps_a_loop_with_a_call_in_its_body() {
        let range = Expr::new(ExprKind::Range { start: Box::new(Expr::int(0, loc())), end: Box::new(Expr::ident("n", loc())) }, loc());
        let call = Expr::new(ExprKind::Call { callee: Box::new(Expr::ident("print", loc())), args: vec![Expr::ident("i", loc())] }, loc());
        let body = Block::new(vec![Stmt::new(StmtKind::ExprStmt(call), loc())]);
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
        assert_eq!(stats.for_loops_deleted, 0);
    }
}
