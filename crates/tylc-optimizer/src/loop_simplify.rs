//! Canonicalizes loop bodies ahead of the rest of the loop-pass family.
//!
//! The AST is already structured (no gotos, no critical edges), so there is
//! no CFG-level preheader to synthesize; the one concrete, safe
//! normalization left at this level is collapsing a redundant `continue`
//! that is the last statement of a loop body — falling off the end of the
//! body already continues, so the explicit statement is dead weight for
//! every pass downstream that pattern-matches on "the loop body's last
//! statement". Loops with any labelled break/continue are left untouched:
//! a label can be a cross-loop escape and this pass never looks past the
//! loop it is currently inside.

use tylc_core::ast::*;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSimplifyStats {
    pub loops_canonicalized: usize,
    pub trailing_continues_removed: usize,
}

fn has_labelled_escape(block: &Block) -> bool {
    block.stmts.iter().any(|stmt| {
        let here = matches!(&stmt.kind, StmtKind::Break(Some(_)) | StmtKind::Continue(Some(_)));
        if here {
            return true;
        }
        match &stmt.kind {
            // a nested loop owns its own breaks/continues unless labelled,
            // which is already covered by the `here` check recursing below
            StmtKind::While { .. } | StmtKind::ForIn { .. } => false,
            _ => {
                let mut found = false;
                walk_stmt_blocks(stmt, &mut |b| found |= has_labelled_escape(b));
                found
            }
        }
    })
}

fn canonicalize_body(body: &mut Block, stats: &mut LoopSimplifyStats) {
    if matches!(body.stmts.last().map(|s| &s.kind), Some(StmtKind::Continue(None))) {
        body.stmts.pop();
        stats.trailing_continues_removed += 1;
    }
}

fn process_block(block: &mut Block, stats: &mut LoopSimplifyStats) {
    for stmt in block.stmts.iter_mut() {
        match &mut stmt.kind {
            StmtKind::While { body, label, .. } if label.is_none() && !has_labelled_escape(body) => {
                canonicalize_body(body, stats);
                stats.loops_canonicalized += 1;
                process_block(body, stats);
            }
            StmtKind::ForIn { body, label, .. } if label.is_none() && !has_labelled_escape(body) => {
                canonicalize_body(body, stats);
                stats.loops_canonicalized += 1;
                process_block(body, stats);
            }
            _ => walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, stats)),
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

pub fn run(program: &mut Program) -> LoopSimplifyStats {
    let mut stats = LoopSimplifyStats::default();
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
    fn removes_a_redundant_trailing_continue() {
        let body = Block::new(vec![
            Stmt::new(StmtKind::ExprStmt(Expr::ident("x", loc())), loc()),
            Stmt::new(StmtKind::Continue(None), loc()),
        ]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::While { cond: Expr::new(ExprKind::BoolLiteral(true), loc()), body, label: None }, loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.trailing_continues_removed, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::While { body, .. } = &decl.body.stmts[0].kind else { panic!() };
        assert_eq!(body.stmts.len(), 1);
    }

    #[test]
    fn a_labelled_loop_is_left_alone() {
        let body = Block::new(vec![Stmt::new(StmtKind::Continue(None), loc())]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![Stmt::new(
                StmtKind::While { cond: Expr::new(ExprKind::BoolLiteral(true), loc()), body, label: Some("outer".into()) },
                loc(),
            )]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.loops_canonicalized, 0);
        assert_eq!(stats.trailing_continues_removed, 0);
    }
}
