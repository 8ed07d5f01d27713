//! `while(c) { B }` -> `if(c) { while(true) { B; if(!c) break; } }`
//!
//! Puts the exit test at the bottom so the common case (loop runs at least
//! once) pays for one branch instead of two. The AST has no do-while node,
//! so the rotated form is exactly this `if` + `while(true)` + trailing
//! guarded `break` shape — later passes are expected to recognize it.

use tylc_core::ast::*;
use tylc_core::SourceLocation;

use crate::util::{is_side_effect_free, node_count_expr};

const MAX_HEADER_SIZE: usize = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopRotationStats {
    pub while_loops_rotated: usize,
    pub loops_skipped: usize,
}

fn has_labelled_escape(block: &Block) -> bool {
    block.stmts.iter().any(|stmt| {
        let here = matches!(&stmt.kind, StmtKind::Break(Some(_)) | StmtKind::Continue(Some(_)));
        if here {
            return true;
        }
        match &stmt.kind {
            StmtKind::While { .. } | StmtKind::ForIn { .. } => false,
            _ => {
                let mut found = false;
                walk_stmt_blocks(stmt, &mut |b| found |= has_labelled_escape(b));
                found
            }
        }
    })
}

fn should_rotate(cond: &Expr, body: &Block, label: &Option<String>) -> bool {
    if label.is_some() {
        return false;
    }
    if matches!(&cond.kind, ExprKind::BoolLiteral(true)) {
        return false; // already an infinite loop, rotating it is pointless
    }
    if !is_side_effect_free(cond) {
        return false;
    }
    if node_count_expr(cond) > MAX_HEADER_SIZE {
        return false;
    }
    !has_labelled_escape(body)
}

fn rotate(cond: Expr, body: Block, loc: SourceLocation) -> Stmt {
    let mut new_body = body;
    new_body.stmts.push(Stmt::new(
        StmtKind::If {
            cond: Expr::new(ExprKind::Unary { op: UnOp::Not, operand: Box::new(cond.clone()) }, loc),
            then_branch: Block::new(vec![Stmt::new(StmtKind::Break(None), loc)]),
            elifs: vec![],
            else_branch: None,
        },
        loc,
    ));
    let inner_loop = Stmt::new(StmtKind::While { cond: Expr::new(ExprKind::BoolLiteral(true), loc), body: new_body, label: None }, loc);
    Stmt::new(StmtKind::If { cond, then_branch: Block::new(vec![inner_loop]), elifs: vec![], else_branch: None }, loc)
}

fn process_block(block: &mut Block, stats: &mut LoopRotationStats) {
    for stmt in block.stmts.iter_mut() {
        walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, stats));

        let replace = if let StmtKind::While { cond, body, label } = &stmt.kind {
            if should_rotate(cond, body, label) {
                Some(rotate(cond.clone(), body.clone(), stmt.loc))
            } else {
                stats.loops_skipped += 1;
                None
            }
        } else {
            None
        };
        if let Some(new_stmt) = replace {
            *stmt = new_stmt;
            stats.while_loops_rotated += 1;
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

pub fn run(program: &mut Program) -> LoopRotationStats {
    let mut stats = LoopRotationStats::default();
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

    #[test]
    fn rotates_a_simple_while_loop() {
        let cond = Expr::new(ExprKind::Binary { op: BinOp::Lt, left: Box::new(Expr::ident("i", loc())), right: Box::new(Expr::int(10, loc())) }, loc());
        let body = Block::new(vec![Stmt::new(
            StmtKind::Assign { target: Expr::ident("i", loc()), value: Expr::new(ExprKind::Binary { op: BinOp::Add, left: Box::new(Expr::ident("i", loc())), right: Box::new(Expr::int(1, loc())) }, loc()) },
            loc(),
        )]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::While { cond, body, label: None }, loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.while_loops_rotated, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        assert!(matches!(&decl.body.stmts[0].kind, StmtKind::If { .. }));
        let StmtKind::If { then_branch, .. } = &decl.body.stmts[0].kind else { panic!() };
        assert!(matches!(&then_branch.stmts[0].kind, StmtKind::While { .. }));
    }

    #[test]
    fn a_labelled_loop_is_skipped() {
        let cond = Expr::new(ExprKind::BoolLiteral(false), loc());
        let body = Block::new(vec![]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::While { cond, body, label: Some("outer".into()) }, loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.while_loops_rotated, 0);
        assert_eq!(stats.loops_skipped, 1);
    }
}
