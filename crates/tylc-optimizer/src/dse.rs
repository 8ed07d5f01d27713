//! Dead-store elimination, restricted to straight-line blocks.
//!
//! A store to `x` is dead if nothing reads `x` before the next store to
//! `x` or the end of the block, and `x` never escapes (is never returned
//! or passed to a call) in that window. Loop bodies are left untouched —
//! deliberately, since a store in one iteration may be read by the next
//! and this pass has no loop-carried liveness analysis.

use std::collections::{HashMap, HashSet};

use tylc_core::ast::*;

use crate::util::is_side_effect_free;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DseStats {
    pub stores_removed: usize,
    pub stores_downgraded: usize,
}

fn collect_reads(expr: &Expr, out: &mut HashSet<String>) {
    if let ExprKind::Identifier(n) = &expr.kind {
        out.insert(n.clone());
    }
    walk_expr_children(expr, &mut |c| collect_reads(c, out));
}

enum Store {
    VarDecl { init: Expr },
    Assign { value: Expr },
}

fn process_block(block: &mut Block, stats: &mut DseStats) {
    for stmt in block.stmts.iter_mut() {
        match &mut stmt.kind {
            StmtKind::If { then_branch, elifs, else_branch, .. } => {
                process_block(then_branch, stats);
                for (_, b) in elifs.iter_mut() {
                    process_block(b, stats);
                }
                if let Some(b) = else_branch {
                    process_block(b, stats);
                }
            }
            StmtKind::Match { cases, default, .. } => {
                for c in cases.iter_mut() {
                    process_block(&mut c.body, stats);
                }
                if let Some(b) = default {
                    process_block(b, stats);
                }
            }
            StmtKind::TryElse { try_block, else_block } => {
                process_block(try_block, stats);
                process_block(else_block, stats);
            }
            StmtKind::Block(b) | StmtKind::Unsafe(b) => process_block(b, stats),
            // loop bodies are intentionally left unvisited
            _ => {}
        }
    }

    let mut pending: HashMap<String, usize> = HashMap::new();
    let mut dead: HashSet<usize> = HashSet::new();

    for (i, stmt) in block.stmts.iter().enumerate() {
        let mut reads = HashSet::new();
        let store = match &stmt.kind {
            StmtKind::VarDecl { name, init: Some(init), .. } => {
                collect_reads(init, &mut reads);
                Some((name.clone(), Store::VarDecl { init: init.clone() }))
            }
            StmtKind::Assign { target, value } => {
                collect_reads(value, &mut reads);
                if let ExprKind::Identifier(name) = &target.kind {
                    Some((name.clone(), Store::Assign { value: value.clone() }))
                } else {
                    collect_reads(target, &mut reads);
                    None
                }
            }
            StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => {
                collect_reads(e, &mut reads);
                None
            }
            _ => None,
        };

        for name in &reads {
            pending.remove(name);
        }

        if let Some((name, _)) = &store {
            if let Some(prev_idx) = pending.remove(name) {
                dead.insert(prev_idx);
            }
            pending.insert(name.clone(), i);
        }

        if matches!(&stmt.kind, StmtKind::Return(None) | StmtKind::Break(_) | StmtKind::Continue(_)) {
            dead.extend(pending.values().copied());
            pending.clear();
        }
        if matches!(&stmt.kind, StmtKind::If { .. } | StmtKind::Match { .. } | StmtKind::TryElse { .. } | StmtKind::Block(_) | StmtKind::Unsafe(_) | StmtKind::While { .. } | StmtKind::ForIn { .. }) {
            pending.clear();
        }
    }
    dead.extend(pending.values().copied());

    if dead.is_empty() {
        return;
    }

    let mut out = Vec::with_capacity(block.stmts.len());
    for (i, stmt) in block.stmts.drain(..).enumerate() {
        if !dead.contains(&i) {
            out.push(stmt);
            continue;
        }
        let loc = stmt.loc;
        let rhs = match stmt.kind {
            StmtKind::VarDecl { init: Some(init), .. } => Some(init),
            StmtKind::Assign { value, .. } => Some(value),
            _ => None,
        };
        match rhs {
            Some(e) if !is_side_effect_free(&e) => {
                out.push(Stmt::new(StmtKind::ExprStmt(e), loc));
                stats.stores_downgraded += 1;
            }
            _ => stats.stores_removed += 1,
        }
    }
    block.stmts = out;
}

pub fn run(program: &mut Program) -> DseStats {
    let mut stats = DseStats::default();
    for decl in program.functions_mut() {
        process_block(&mut decl.body, &mut stats);
    }
    stats
}
