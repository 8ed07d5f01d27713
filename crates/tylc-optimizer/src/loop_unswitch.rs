//! Hoists a loop-invariant `if` out of a loop whose entire body is that
//! `if`: the loop is cloned once per branch instead of branching on every
//! iteration.
//!
//! Restricted to the case LLVM calls "trivial unswitching" — the loop body
//! is a single `if`/`else` and nothing else. A loop body that does other
//! work alongside the conditional is left alone; peeling the conditional
//! out from among sibling statements would require proving those siblings
//! commute with it, which this pass does not attempt.

use tylc_core::ast::*;
use tylc_core::SourceLocation;

use crate::util::{assigned_names, contains_identifier, node_count_block};

const MAX_LOOP_SIZE: usize = 50;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopUnswitchStats {
    pub loops_unswitched: usize,
}

fn is_invariant(cond: &Expr, body: &Block) -> bool {
    let modified = assigned_names(body);
    !modified.iter().any(|name| contains_identifier(cond, name))
}

enum LoopShape {
    While { cond: Expr },
    ForIn { var: String, iterable: Expr },
}

fn try_unswitch(shape: LoopShape, body: Block, loc: SourceLocation) -> Option<Stmt> {
    if node_count_block(&body) > MAX_LOOP_SIZE || body.stmts.len() != 1 {
        return None;
    }
    let StmtKind::If { cond, then_branch, elifs, else_branch: Some(else_branch) } = &body.stmts[0].kind else { return None };
    if !elifs.is_empty() || !is_invariant(cond, &body) {
        return None;
    }

    let make_loop = |loop_body: Block| -> Stmt {
        match &shape {
            LoopShape::While { cond } => Stmt::new(StmtKind::While { cond: cond.clone(), body: loop_body, label: None }, loc),
            LoopShape::ForIn { var, iterable } => {
                Stmt::new(StmtKind::ForIn { var: var.clone(), iterable: iterable.clone(), body: loop_body, label: None }, loc)
            }
        }
    };

    Some(Stmt::new(
        StmtKind::If {
            cond: cond.clone(),
            then_branch: Block::new(vec![make_loop(then_branch.clone())]),
            elifs: vec![],
            else_branch: Some(Block::new(vec![make_loop(else_branch.clone())])),
        },
        loc,
    ))
}

fn process_block(block: &mut Block, stats: &mut LoopUnswitchStats) {
    for stmt in block.stmts.iter_mut() {
        walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, stats));

        let replacement = match &stmt.kind {
            StmtKind::While { cond, body, label: None } => try_unswitch(LoopShape::While { cond: cond.clone() }, body.clone(), stmt.loc),
            StmtKind::ForIn { var, iterable, body, label: None } => {
                try_unswitch(LoopShape::ForIn { var: var.clone(), iterable: iterable.clone() }, body.clone(), stmt.loc)
            }
            _ => None,
        };
        if let Some(new_stmt) = replacement {
            *stmt = new_stmt;
            process_block_in_place(stmt, stats);
            stats.loops_unswitched += 1;
        }
    }
}

/// After cloning a loop body into two fresh loops, recurse into them too —
/// a nested invariant `if` inside either clone is fair game for the same
/// transform.
fn process_block_in_place(stmt: &mut Stmt, stats: &mut LoopUnswitchStats) {
    walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, stats));
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

pub fn run(program: &mut Program) -> LoopUnswitchStats {
    let mut stats = LoopUnswitchStats::default();
    for decl in program.functions_mut() {
        process_block(&mut decl.body, &mut stats);
    }
    stats
}
