//! Shared AST plumbing used by more than one pass: structural equality that
//! ignores source locations, identifier substitution, side-effect and
//! escape analysis, and a couple of size metrics the loop passes gate on.

use std::collections::HashSet;

use tylc_core::ast::*;

pub fn expr_eq(a: &Expr, b: &Expr) -> bool {
    kind_eq(&a.kind, &b.kind)
}

fn kind_eq(a: &ExprKind, b: &ExprKind) -> bool {
    use ExprKind::*;
    match (a, b) {
        (IntLiteral(x), IntLiteral(y)) => x == y,
        (FloatLiteral(x), FloatLiteral(y)) => x == y,
        (BoolLiteral(x), BoolLiteral(y)) => x == y,
        (CharLiteral(x), CharLiteral(y)) => x == y,
        (StringLiteral(x), StringLiteral(y)) => x == y,
        (Identifier(x), Identifier(y)) => x == y,
        (Binary { op: o1, left: l1, right: r1 }, Binary { op: o2, left: l2, right: r2 }) => {
            o1 == o2 && expr_eq(l1, l2) && expr_eq(r1, r2)
        }
        (Unary { op: o1, operand: a1 }, Unary { op: o2, operand: a2 }) => o1 == o2 && expr_eq(a1, a2),
        (Index { object: o1, index: i1 }, Index { object: o2, index: i2 }) => expr_eq(o1, o2) && expr_eq(i1, i2),
        (MemberAccess { object: o1, field: f1 }, MemberAccess { object: o2, field: f2 }) => f1 == f2 && expr_eq(o1, o2),
        (Call { callee: c1, args: a1 }, Call { callee: c2, args: a2 }) => {
            expr_eq(c1, c2) && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| expr_eq(x, y))
        }
        _ => false,
    }
}

/// Recursively substitutes every `Identifier(name)` leaf with a clone of
/// `replacement`'s kind, keeping the original node's own location.
pub fn substitute_identifier(expr: &mut Expr, name: &str, replacement: &ExprKind) {
    if let ExprKind::Identifier(n) = &expr.kind {
        if n == name {
            expr.kind = replacement.clone();
            return;
        }
    }
    for child in direct_children_mut(expr) {
        substitute_identifier(child, name, replacement);
    }
}

pub fn contains_identifier(expr: &Expr, name: &str) -> bool {
    if let ExprKind::Identifier(n) = &expr.kind {
        if n == name {
            return true;
        }
    }
    let mut found = false;
    walk_expr_children(expr, &mut |c| found |= contains_identifier(c, name));
    found
}

/// True if no sub-expression can perform an observable side effect: no
/// calls, no assignments, no heap allocation, no concurrency primitives.
pub fn is_side_effect_free(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Call { .. }
        | ExprKind::AssignExpr { .. }
        | ExprKind::New { .. }
        | ExprKind::Await(_)
        | ExprKind::Spawn(_)
        | ExprKind::Channel { .. }
        | ExprKind::Atomic { .. }
        | ExprKind::Walrus { .. } => false,
        _ => {
            let mut ok = true;
            walk_expr_children(expr, &mut |c| ok &= is_side_effect_free(c));
            ok
        }
    }
}

pub fn node_count_expr(expr: &Expr) -> usize {
    let mut n = 1;
    walk_expr_children(expr, &mut |c| n += node_count_expr(c));
    n
}

pub fn node_count_block(block: &Block) -> usize {
    block.stmts.iter().map(node_count_stmt).sum::<usize>() + 1
}

fn node_count_stmt(stmt: &Stmt) -> usize {
    let mut n = 1;
    match &stmt.kind {
        StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => n += node_count_expr(e),
        StmtKind::VarDecl { init: Some(e), .. } => n += node_count_expr(e),
        StmtKind::Assign { target, value } => n += node_count_expr(target) + node_count_expr(value),
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => n += node_count_expr(cond),
        _ => {}
    }
    walk_stmt_blocks(stmt, &mut |b| n += node_count_block(b));
    n
}

/// Every identifier assigned anywhere within `block`: `VarDecl` names and
/// `Assign`/`DestructuringDecl` targets, recursing into nested blocks.
pub fn assigned_names(block: &Block) -> HashSet<String> {
    let mut names = HashSet::new();
    collect_assigned(block, &mut names);
    names
}

fn collect_assigned(block: &Block, names: &mut HashSet<String>) {
    for stmt in &block.stmts {
        match &stmt.kind {
            StmtKind::VarDecl { name, .. } => {
                names.insert(name.clone());
            }
            StmtKind::DestructuringDecl { names: ns, .. } => names.extend(ns.iter().cloned()),
            StmtKind::Assign { target, .. } => {
                if let ExprKind::Identifier(n) = &target.kind {
                    names.insert(n.clone());
                }
            }
            _ => {}
        }
        walk_stmt_blocks(stmt, &mut |b| collect_assigned(b, names));
    }
}

/// One level of mutable access to an expression's direct children, mirroring
/// `tylc_core::ast::walk_expr_children` but `&mut`.
pub fn direct_children_mut(expr: &mut Expr) -> Vec<&mut Expr> {
    match &mut expr.kind {
        ExprKind::IntLiteral(_)
        | ExprKind::FloatLiteral(_)
        | ExprKind::BoolLiteral(_)
        | ExprKind::CharLiteral(_)
        | ExprKind::StringLiteral(_)
        | ExprKind::Identifier(_) => vec![],
        ExprKind::Binary { left, right, .. } => vec![left, right],
        ExprKind::Unary { operand, .. } => vec![operand],
        ExprKind::Ternary { cond, then_value, else_value } => vec![cond, then_value, else_value],
        ExprKind::Call { callee, args } => {
            let mut v = vec![callee.as_mut()];
            v.extend(args.iter_mut());
            v
        }
        ExprKind::MemberAccess { object, .. } => vec![object],
        ExprKind::Index { object, index } => vec![object, index],
        ExprKind::Range { start, end } | ExprKind::RangeInclusive { start, end } => vec![start, end],
        ExprKind::Lambda { body, .. } => vec![body],
        ExprKind::ListLiteral(items) => items.iter_mut().collect(),
        ExprKind::RecordLiteral { fields, .. } => fields.iter_mut().map(|(_, v)| v).collect(),
        ExprKind::ListComprehension { element, iterable, condition, .. } => {
            let mut v = vec![element.as_mut(), iterable.as_mut()];
            if let Some(c) = condition {
                v.push(c.as_mut());
            }
            v
        }
        ExprKind::AssignExpr { target, value } => vec![target, value],
        ExprKind::AddressOf(e) | ExprKind::Deref(e) | ExprKind::Await(e) | ExprKind::Spawn(e) => vec![e],
        ExprKind::Borrow { expr, .. } => vec![expr],
        ExprKind::New { args, .. } => args.iter_mut().collect(),
        ExprKind::Cast { expr, .. } => vec![expr],
        ExprKind::Channel { channel, value, .. } => {
            let mut v = vec![channel.as_mut()];
            if let Some(x) = value {
                v.push(x.as_mut());
            }
            v
        }
        ExprKind::Atomic { target, value, .. } => {
            let mut v = vec![target.as_mut()];
            if let Some(x) = value {
                v.push(x.as_mut());
            }
            v
        }
        ExprKind::InterpolatedString(parts) => parts
            .iter_mut()
            .filter_map(|p| match p {
                InterpPart::Expr(e) => Some(e.as_mut()),
                InterpPart::Text(_) => None,
            })
            .collect(),
        ExprKind::Walrus { value, .. } => vec![value],
    }
}
