//! Linearizes commutative-associative operator chains (`+ * & | ^ && ||`),
//! ranks operands, and rebuilds a left-leaning tree with every compile-time
//! constant folded into a single operand at the tail.
//!
//! Rank order (lowest first): function parameters, then locals in
//! declaration order, then any other computed sub-expression, then
//! constants. Ties within a tier keep their original relative order.

use std::collections::HashMap;

use tylc_core::ast::*;
use tylc_core::SourceLocation;

use crate::util::{direct_children_mut, expr_eq};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReassociateStats {
    pub chains_rebuilt: usize,
    pub constants_folded: usize,
}

struct Ranks {
    params: HashMap<String, usize>,
    locals: HashMap<String, usize>,
}

fn collect_locals_in_order(block: &Block, out: &mut Vec<String>) {
    for stmt in &block.stmts {
        if let StmtKind::VarDecl { name, .. } = &stmt.kind {
            out.push(name.clone());
        }
        walk_stmt_blocks(stmt, &mut |b| collect_locals_in_order(b, out));
    }
}

fn is_constant(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::IntLiteral(_) | ExprKind::FloatLiteral(_) | ExprKind::BoolLiteral(_))
}

/// (tier, secondary key for stable ordering within a tier)
fn rank(expr: &Expr, ranks: &Ranks) -> (u8, usize) {
    if let ExprKind::Identifier(name) = &expr.kind {
        if let Some(&i) = ranks.params.get(name) {
            return (0, i);
        }
        if let Some(&i) = ranks.locals.get(name) {
            return (1, i);
        }
    }
    if is_constant(expr) {
        return (3, 0);
    }
    (2, 0)
}

fn linearize(expr: Expr, op: BinOp, out: &mut Vec<Expr>) {
    if let ExprKind::Binary { op: o, left, right } = expr.kind {
        if o == op {
            linearize(*left, op, out);
            linearize(*right, op, out);
            return;
        }
        out.push(Expr::new(ExprKind::Binary { op: o, left, right }, expr.loc));
        return;
    }
    out.push(expr);
}

fn fold_int(op: BinOp, values: &[i64]) -> Option<i64> {
    match op {
        BinOp::Add => Some(values.iter().sum()),
        BinOp::Mul => Some(values.iter().product()),
        BinOp::BitAnd => Some(values.iter().fold(-1i64, |a, b| a & b)),
        BinOp::BitOr => Some(values.iter().fold(0i64, |a, b| a | b)),
        BinOp::BitXor => Some(values.iter().fold(0i64, |a, b| a ^ b)),
        _ => None,
    }
}

fn fold_float(op: BinOp, values: &[f64]) -> Option<f64> {
    match op {
        BinOp::Add => Some(values.iter().sum()),
        BinOp::Mul => Some(values.iter().product()),
        _ => None,
    }
}

fn fold_bool(op: BinOp, values: &[bool]) -> Option<bool> {
    match op {
        BinOp::And => Some(values.iter().all(|&b| b)),
        BinOp::Or => Some(values.iter().any(|&b| b)),
        _ => None,
    }
}

/// Folds every trailing constant operand into one, returning the (possibly
/// shortened) operand list and whether a fold actually happened.
fn fold_constants(op: BinOp, mut operands: Vec<Expr>, loc: SourceLocation) -> (Vec<Expr>, bool) {
    let first_const = operands.iter().position(is_constant);
    let Some(first_const) = first_const else { return (operands, false) };
    let constants: Vec<Expr> = operands.split_off(first_const);
    if constants.len() < 2 {
        operands.extend(constants);
        return (operands, false);
    }

    let folded = if let Some(ints) = constants
        .iter()
        .map(|c| if let ExprKind::IntLiteral(v) = c.kind { Some(v) } else { None })
        .collect::<Option<Vec<_>>>()
    {
        fold_int(op, &ints).map(ExprKind::IntLiteral)
    } else if let Some(floats) = constants
        .iter()
        .map(|c| if let ExprKind::FloatLiteral(v) = c.kind { Some(v) } else { None })
        .collect::<Option<Vec<_>>>()
    {
        fold_float(op, &floats).map(ExprKind::FloatLiteral)
    } else if let Some(bools) = constants
        .iter()
        .map(|c| if let ExprKind::BoolLiteral(v) = c.kind { Some(v) } else { None })
        .collect::<Option<Vec<_>>>()
    {
        fold_bool(op, &bools).map(ExprKind::BoolLiteral)
    } else {
        None
    };

    match folded {
        Some(kind) => {
            operands.push(Expr::new(kind, loc));
            (operands, true)
        }
        None => {
            operands.extend(constants);
            (operands, false)
        }
    }
}

fn rebuild_left_leaning(op: BinOp, mut operands: Vec<Expr>, loc: SourceLocation) -> Expr {
    let mut acc = operands.remove(0);
    for rhs in operands {
        acc = Expr::new(ExprKind::Binary { op, left: Box::new(acc), right: Box::new(rhs) }, loc);
    }
    acc
}

fn transform(expr: &mut Expr, ranks: &Ranks, stats: &mut ReassociateStats) {
    if let ExprKind::Binary { op, .. } = &expr.kind {
        if op.is_reassociable() {
            let op = *op;
            let loc = expr.loc;
            let taken = std::mem::replace(expr, Expr::new(ExprKind::BoolLiteral(false), loc));
            let mut operands = Vec::new();
            linearize(taken, op, &mut operands);

            for operand in operands.iter_mut() {
                transform(operand, ranks, stats);
            }

            let before: Vec<Expr> = operands.clone();
            operands.sort_by_key(|o| rank(o, ranks));
            let (operands, folded) = fold_constants(op, operands, loc);
            if folded {
                stats.constants_folded += 1;
            }

            let changed = operands.len() != before.len() || operands.iter().zip(&before).any(|(a, b)| !expr_eq(a, b));
            if changed {
                stats.chains_rebuilt += 1;
            }
            *expr = rebuild_left_leaning(op, operands, loc);
            return;
        }
    }
    for child in direct_children_mut(expr) {
        transform(child, ranks, stats);
    }
}

fn process_block(block: &mut Block, ranks: &Ranks, stats: &mut ReassociateStats) {
    for stmt in block.stmts.iter_mut() {
        match &mut stmt.kind {
            StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => transform(e, ranks, stats),
            StmtKind::VarDecl { init: Some(e), .. } => transform(e, ranks, stats),
            StmtKind::Assign { target, value } => {
                transform(target, ranks, stats);
                transform(value, ranks, stats);
            }
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => transform(cond, ranks, stats),
            _ => {}
        }
        walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, ranks, stats));
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

pub fn run(program: &mut Program) -> ReassociateStats {
    let mut stats = ReassociateStats::default();
    for decl in program.functions_mut() {
        let mut locals = Vec::new();
        collect_locals_in_order(&decl.body, &mut locals);
        let ranks = Ranks {
            params: decl.params.iter().enumerate().map(|(i, p)| (p.name.clone(), i)).collect(),
            locals: locals.into_iter().enumerate().map(|(i, n)| (n, i)).collect(),
        };
        process_block(&mut decl.body, &ranks, &mut stats);
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
    fn folds_trailing_constants_and_moves_params_first() {
        // (2 + a) + 3  ->  a + 5
        let expr = bin(BinOp::Add, bin(BinOp::Add, Expr::int(2, loc()), Expr::ident("a", loc())), Expr::int(3, loc()));
        let decl = FnDecl {
            name: "f".into(),
            params: vec![Param { name: "a".into(), type_name: None, by_ref: false }],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::Return(Some(expr)), loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.constants_folded, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::Return(Some(ret)) = &decl.body.stmts[0].kind else { panic!() };
        let ExprKind::Binary { op, left, right } = &ret.kind else { panic!() };
        assert_eq!(*op, BinOp::Add);
        assert_eq!(left.kind, ExprKind::Identifier("a".into()));
        assert_eq!(right.kind, ExprKind::IntLiteral(5));
    }

    #[test]
    fn a_two_operand_chain_with_no_constants_is_left_in_rank_order() {
        let decl = FnDecl {
            name: "f".into(),
            params: vec![Param { name: "a".into(), type_name: None, by_ref: false }, Param { name: "b".into(), type_name: None, by_ref: false }],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::Return(Some(bin(BinOp::Mul, Expr::ident("b", loc()), Expr::ident("a", loc())))), loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        run(&mut program);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::Return(Some(ret)) = &decl.body.stmts[0].kind else { panic!() };
        let ExprKind::Binary { left, right, .. } = &ret.kind else { panic!() };
        assert_eq!(left.kind, ExprKind::Identifier("a".into()));
        assert_eq!(right.kind, ExprKind::Identifier("b".into()));
    }
}
