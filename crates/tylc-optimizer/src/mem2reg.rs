//! Promotes simple-typed locals whose address is never taken to tracked
//! values, substituting reads with the value currently live at that point.
//!
//! No phi nodes are synthesized: at any control-flow join the tracked value
//! for every variable touched inside the branch is simply invalidated, and
//! later CSE/GVN is left to rediscover any equivalence. This is
//! conservative by construction — it never substitutes a stale value.

use std::collections::{HashMap, HashSet};

use tylc_core::ast::*;

use crate::util::direct_children_mut;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Mem2RegStats {
    pub variables_promoted: usize,
    pub reads_substituted: usize,
}

fn is_simple_type(type_name: &Option<String>) -> bool {
    match type_name {
        None => true, // inferred scalars are the common case for locals
        Some(t) => matches!(t.as_str(), "int" | "i8" | "i16" | "i32" | "i64" | "float" | "f32" | "f64" | "bool" | "char"),
    }
}

/// Address ever taken: `&x`, `&mut x`, or `x` passed as a by-ref parameter.
fn address_taken(block: &Block, name: &str) -> bool {
    fn expr_takes_address(e: &Expr, name: &str) -> bool {
        let direct = matches!(&e.kind, ExprKind::AddressOf(inner) | ExprKind::Borrow { expr: inner, .. } if matches!(&inner.kind, ExprKind::Identifier(n) if n == name));
        if direct {
            return true;
        }
        let mut found = false;
        walk_expr_children(e, &mut |c| found |= expr_takes_address(c, name));
        found
    }
    fn stmt_has(stmt: &Stmt, name: &str) -> bool {
        let mut found = match &stmt.kind {
            StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => expr_takes_address(e, name),
            StmtKind::VarDecl { init: Some(e), .. } => expr_takes_address(e, name),
            StmtKind::Assign { target, value } => expr_takes_address(target, name) || expr_takes_address(value, name),
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => expr_takes_address(cond, name),
            _ => false,
        };
        walk_stmt_blocks(stmt, &mut |b| found |= address_taken(b, name));
        found
    }
    block.stmts.iter().any(|s| stmt_has(s, name))
}

fn substitute_reads(expr: &mut Expr, values: &HashMap<String, ExprKind>, count: &mut usize) {
    if let ExprKind::Identifier(name) = &expr.kind {
        if let Some(v) = values.get(name) {
            expr.kind = v.clone();
            *count += 1;
            return;
        }
    }
    for child in direct_children_mut(expr) {
        substitute_reads(child, values, count);
    }
}

fn process_block(block: &mut Block, promotable: &HashSet<String>, stats: &mut Mem2RegStats) {
    let mut values: HashMap<String, ExprKind> = HashMap::new();

    for stmt in block.stmts.iter_mut() {
        match &mut stmt.kind {
            StmtKind::VarDecl { name, init: Some(init), .. } => {
                substitute_reads(init, &values, &mut stats.reads_substituted);
                if promotable.contains(name) && is_trackable_value(&init.kind) {
                    values.insert(name.clone(), init.kind.clone());
                } else {
                    values.remove(name);
                }
            }
            StmtKind::Assign { target, value } => {
                substitute_reads(value, &values, &mut stats.reads_substituted);
                if let ExprKind::Identifier(name) = &target.kind {
                    if promotable.contains(name) && is_trackable_value(&value.kind) {
                        values.insert(name.clone(), value.kind.clone());
                        continue;
                    } else {
                        values.remove(name);
                    }
                }
            }
            StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => {
                substitute_reads(e, &values, &mut stats.reads_substituted);
            }
            StmtKind::If { cond, then_branch, elifs, else_branch } => {
                substitute_reads(cond, &values, &mut stats.reads_substituted);
                process_block(then_branch, promotable, stats);
                for (c, b) in elifs.iter_mut() {
                    substitute_reads(c, &values, &mut stats.reads_substituted);
                    process_block(b, promotable, stats);
                }
                if let Some(b) = else_branch {
                    process_block(b, promotable, stats);
                }
                values.clear(); // join point: drop every tracked value
            }
            _ => {
                walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, promotable, stats));
                values.clear();
            }
        }
    }
}

fn is_trackable_value(kind: &ExprKind) -> bool {
    matches!(
        kind,
        ExprKind::IntLiteral(_) | ExprKind::FloatLiteral(_) | ExprKind::BoolLiteral(_) | ExprKind::CharLiteral(_) | ExprKind::Identifier(_)
    )
}

/// Mutable counterpart of `tylc_core::ast::walk_stmt_blocks`.
fn walk_stmt_blocks_mut(stmt: &mut Stmt, f: &mut impl FnMut(&mut Block)) {
    match &mut stmt.kind {
        StmtKind::While { body, .. } | StmtKind::ForIn { body, .. } => f(body),
        StmtKind::Block(b) | StmtKind::Unsafe(b) => f(b),
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
        StmtKind::FnDecl(decl) => f(&mut decl.body),
        _ => {}
    }
}

pub fn run(program: &mut Program) -> Mem2RegStats {
    let mut stats = Mem2RegStats::default();
    for decl in program.functions_mut() {
        let promotable: HashSet<String> = decl
            .body
            .stmts
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::VarDecl { name, type_name, .. } if is_simple_type(type_name) && !address_taken(&decl.body, name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        stats.variables_promoted += promotable.len();
        process_block(&mut decl.body, &promotable, &mut stats);
    }
    stats
}
