//! Bit-tracking dead code elimination, narrowed to the one sub-problem an
//! AST-level pass can decide without a bit-width oracle: bitwise and
//! logical identities where the full set of bits (or the whole boolean
//! value) a node could produce is already known from its shape, not its
//! operands' runtime values.
//!
//! `x & 0`, `x | -1`, `x ^ x`, `x && false`, `x || true` and friends are
//! demanded-bits facts that hold for *every* possible input, so there is
//! never a real masked-off-bits computation left behind to simplify
//! further — these are the cases `DemandedBits::isAllOnes` /
//! `DemandedBits::isZero` resolve trivially, without propagating masks
//! through the rest of the expression tree.

use tylc_core::ast::*;

use crate::util::expr_eq;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BdceStats {
    pub identities_simplified: usize,
}

fn int_identity(op: BinOp, left: &Expr, right: &Expr) -> Option<ExprKind> {
    let as_int = |e: &Expr| if let ExprKind::IntLiteral(v) = e.kind { Some(v) } else { None };
    match (op, as_int(left), as_int(right)) {
        (BinOp::BitAnd, Some(0), _) | (BinOp::BitAnd, _, Some(0)) => Some(ExprKind::IntLiteral(0)),
        (BinOp::BitAnd, Some(-1), _) => Some(right.kind.clone()),
        (BinOp::BitAnd, _, Some(-1)) => Some(left.kind.clone()),
        (BinOp::BitOr, Some(-1), _) | (BinOp::BitOr, _, Some(-1)) => Some(ExprKind::IntLiteral(-1)),
        (BinOp::BitOr, Some(0), _) => Some(right.kind.clone()),
        (BinOp::BitOr, _, Some(0)) => Some(left.kind.clone()),
        (BinOp::BitXor, Some(0), _) => Some(right.kind.clone()),
        (BinOp::BitXor, _, Some(0)) => Some(left.kind.clone()),
        _ if matches!(op, BinOp::BitAnd | BinOp::BitOr) && expr_eq(left, right) => Some(left.kind.clone()),
        (BinOp::BitXor, _, _) if expr_eq(left, right) => Some(ExprKind::IntLiteral(0)),
        _ => None,
    }
}

fn bool_identity(op: BinOp, left: &Expr, right: &Expr) -> Option<ExprKind> {
    let as_bool = |e: &Expr| if let ExprKind::BoolLiteral(v) = e.kind { Some(v) } else { None };
    match (op, as_bool(left), as_bool(right)) {
        (BinOp::And, Some(false), _) | (BinOp::And, _, Some(false)) => Some(ExprKind::BoolLiteral(false)),
        (BinOp::And, Some(true), _) => Some(right.kind.clone()),
        (BinOp::And, _, Some(true)) => Some(left.kind.clone()),
        (BinOp::Or, Some(true), _) | (BinOp::Or, _, Some(true)) => Some(ExprKind::BoolLiteral(true)),
        (BinOp::Or, Some(false), _) => Some(right.kind.clone()),
        (BinOp::Or, _, Some(false)) => Some(left.kind.clone()),
        _ if matches!(op, BinOp::And | BinOp::Or) && expr_eq(left, right) => Some(left.kind.clone()),
        _ => None,
    }
}

fn simplify(expr: &mut Expr, stats: &mut BdceStats) {
    for child in crate::util::direct_children_mut(expr) {
        simplify(child, stats);
    }
    let replacement = match &expr.kind {
        ExprKind::Binary { op, left, right } => int_identity(*op, left, right).or_else(|| bool_identity(*op, left, right)),
        _ => None,
    };
    if let Some(kind) = replacement {
        expr.kind = kind;
        stats.identities_simplified += 1;
    }
}

fn process_block(block: &mut Block, stats: &mut BdceStats) {
    for stmt in block.stmts.iter_mut() {
        match &mut stmt.kind {
            StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => simplify(e, stats),
            StmtKind::VarDecl { init: Some(e), .. } => simplify(e, stats),
            StmtKind::Assign { target, value } => {
                simplify(target, stats);
                simplify(value, stats);
            }
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => simplify(cond, stats),
            _ => {}
        }
        walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, stats));
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

pub fn run(program: &mut Program) -> BdceStats {
    let mut stats = BdceStats::default();
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

    fn bin(op: BinOp, l: Expr, r: Expr) -> Expr {
        Expr::new(ExprKind::Binary { op, left: Box::new(l), right: Box::new(r) }, loc())
    }

    #[test]
    fn and_with_zero_mask_collapses_to_zero() {
        let mut e = bin(BinOp::BitAnd, Expr::ident("x", loc()), Expr::int(0, loc()));
        let mut stats = BdceStats::default();
        simplify(&mut e, &mut stats);
        assert_eq!(e.kind, ExprKind::IntLiteral(0));
        assert_eq!(stats.identities_simplified, 1);
    }

    #[test]
    fn or_with_all_ones_mask_collapses_to_all_ones() {
        let mut e = bin(BinOp::BitOr, Expr::ident("x", loc()), Expr::int(-1, loc()));
        let mut stats = BdceStats::default();
        simplify(&mut e, &mut stats);
        assert_eq!(e.kind, ExprKind::IntLiteral(-1));
    }

    #[test]
    fn xor_of_identical_operands_collapses_to_zero() {
        let mut e = bin(BinOp::BitXor, Expr::ident("x", loc()), Expr::ident("x", loc()));
        let mut stats = BdceStats::default();
        simplify(&mut e, &mut stats);
        assert_eq!(e.kind, ExprKind::IntLiteral(0));
    }

    #[test]
    fn logical_and_with_false_short_circuits_to_false() {
        let mut e = bin(BinOp::And, Expr::ident("p", loc()), Expr::new(ExprKind::BoolLiteral(false), loc()));
        let mut stats = BdceStats::default();
        simplify(&mut e, &mut stats);
        assert_eq!(e.kind, ExprKind::BoolLiteral(false));
    }

    #[test]
    fn an_unrelated_operator_is_left_untouched() {
        let mut e = bin(BinOp::Add, Expr::ident("x", loc()), Expr::int(0, loc()));
        let mut stats = BdceStats::default();
        simplify(&mut e, &mut stats);
        assert!(matches!(e.kind, ExprKind::Binary { .. }));
        assert_eq!(stats.identities_simplified, 0);
    }
}
