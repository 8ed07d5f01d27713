//! Correlated value propagation, narrowed to integer variables bounded by
//! literal comparisons in dominating `if` conditions.
//!
//! The original pass tracks a [`ValueRange`]-like lattice through the
//! whole CFG, folding in arithmetic results as well as comparison facts.
//! Without a real dataflow solver this pass only tracks ranges established
//! directly by dominating `if` conditions of the shape `ident <op> literal`
//! (and their negation on the `else` side), intersecting them down through
//! nested branches; it uses that range to decide later comparisons of the
//! same shape for the same variable. Arithmetic propagation
//! (`ValueRange::add`/`sub`/`mul`) and signed-to-unsigned conversion are
//! out of scope here — both need a type system this AST stage doesn't carry.

use std::collections::HashMap;

use tylc_core::ast::*;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CorrelatedPropagationStats {
    pub comparisons_simplified: usize,
}

#[derive(Debug, Clone, Copy)]
struct ValueRange {
    min: i64,
    max: i64,
}

impl ValueRange {
    const UNKNOWN: ValueRange = ValueRange { min: i64::MIN, max: i64::MAX };

    fn intersect(self, other: ValueRange) -> ValueRange {
        ValueRange { min: self.min.max(other.min), max: self.max.min(other.max) }
    }

    fn from_constraint(op: BinOp, literal: i64, is_lhs_var: bool) -> Option<ValueRange> {
        let (lo, hi) = (i64::MIN, i64::MAX);
        Some(match (op, is_lhs_var) {
            (BinOp::Gt, true) | (BinOp::Lt, false) => ValueRange { min: literal.saturating_add(1), max: hi },
            (BinOp::GtEq, true) | (BinOp::LtEq, false) => ValueRange { min: literal, max: hi },
            (BinOp::Lt, true) | (BinOp::Gt, false) => ValueRange { min: lo, max: literal.saturating_sub(1) },
            (BinOp::LtEq, true) | (BinOp::GtEq, false) => ValueRange { min: lo, max: literal },
            (BinOp::Eq, _) => ValueRange { min: literal, max: literal },
            _ => return None,
        })
    }

    fn negated(op: BinOp) -> Option<BinOp> {
        Some(match op {
            BinOp::Gt => BinOp::LtEq,
            BinOp::GtEq => BinOp::Lt,
            BinOp::Lt => BinOp::GtEq,
            BinOp::LtEq => BinOp::Gt,
            BinOp::Eq => BinOp::NotEq,
            BinOp::NotEq => BinOp::Eq,
            _ => return None,
        })
    }

    fn implies(self, op: BinOp, literal: i64) -> Option<bool> {
        match op {
            BinOp::Gt => {
                if self.min > literal {
                    Some(true)
                } else if self.max <= literal {
                    Some(false)
                } else {
                    None
                }
            }
            BinOp::GtEq => {
                if self.min >= literal {
                    Some(true)
                } else if self.max < literal {
                    Some(false)
                } else {
                    None
                }
            }
            BinOp::Lt => {
                if self.max < literal {
                    Some(true)
                } else if self.min >= literal {
                    Some(false)
                } else {
                    None
                }
            }
            BinOp::LtEq => {
                if self.max <= literal {
                    Some(true)
                } else if self.min > literal {
                    Some(false)
                } else {
                    None
                }
            }
            BinOp::Eq => {
                if self.min == self.max && self.min == literal {
                    Some(true)
                } else if literal < self.min || literal > self.max {
                    Some(false)
                } else {
                    None
                }
            }
            BinOp::NotEq => {
                if literal < self.min || literal > self.max {
                    Some(true)
                } else if self.min == self.max && self.min == literal {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

fn var_literal_cmp(expr: &Expr) -> Option<(BinOp, &str, i64)> {
    let ExprKind::Binary { op, left, right } = &expr.kind else { return None };
    if !matches!(op, BinOp::Gt | BinOp::GtEq | BinOp::Lt | BinOp::LtEq | BinOp::Eq | BinOp::NotEq) {
        return None;
    }
    match (&left.kind, &right.kind) {
        (ExprKind::Identifier(v), ExprKind::IntLiteral(n)) => Some((*op, v.as_str(), *n)),
        (ExprKind::IntLiteral(n), ExprKind::Identifier(v)) => {
            let flipped = match op {
                BinOp::Gt => BinOp::Lt,
                BinOp::GtEq => BinOp::LtEq,
                BinOp::Lt => BinOp::Gt,
                BinOp::LtEq => BinOp::GtEq,
                other => *other,
            };
            Some((flipped, v.as_str(), *n))
        }
        _ => None,
    }
}

fn range_for(cond: &Expr) -> Option<(String, ValueRange)> {
    let (op, var, lit) = var_literal_cmp(cond)?;
    Some((var.to_string(), ValueRange::from_constraint(op, lit, true)?))
}

fn simplify_cond(expr: &mut Expr, ranges: &HashMap<String, ValueRange>, stats: &mut CorrelatedPropagationStats) {
    for child in crate::util::direct_children_mut(expr) {
        simplify_cond(child, ranges, stats);
    }
    let Some((op, var, lit)) = var_literal_cmp(expr) else { return };
    let Some(range) = ranges.get(var) else { return };
    if let Some(truth) = range.implies(op, lit) {
        expr.kind = ExprKind::BoolLiteral(truth);
        stats.comparisons_simplified += 1;
    }
}

fn process_block(block: &mut Block, ranges: &HashMap<String, ValueRange>, stats: &mut CorrelatedPropagationStats) {
    for stmt in block.stmts.iter_mut() {
        match &mut stmt.kind {
            StmtKind::If { cond, then_branch, elifs, else_branch } => {
                simplify_cond(cond, ranges, stats);

                let mut then_ranges = ranges.clone();
                if let Some((var, r)) = range_for(cond) {
                    then_ranges.insert(var.clone(), ranges.get(&var).copied().unwrap_or(ValueRange::UNKNOWN).intersect(r));
                }
                process_block(then_branch, &then_ranges, stats);

                for (elif_cond, elif_body) in elifs.iter_mut() {
                    simplify_cond(elif_cond, ranges, stats);
                    process_block(elif_body, ranges, stats);
                }

                if let Some(eb) = else_branch {
                    let mut else_ranges = ranges.clone();
                    if let Some((op, var, lit)) = var_literal_cmp(cond) {
                        if let Some(neg_r) = ValueRange::negated(op).and_then(|neg_op| ValueRange::from_constraint(neg_op, lit, true)) {
                            else_ranges.insert(var.to_string(), ranges.get(var).copied().unwrap_or(ValueRange::UNKNOWN).intersect(neg_r));
                        }
                    }
                    process_block(eb, &else_ranges, stats);
                }
            }
            StmtKind::While { cond, body, .. } => {
                simplify_cond(cond, ranges, stats);
                process_block(body, &HashMap::new(), stats);
            }
            StmtKind::ForIn { body, .. } => process_block(body, &HashMap::new(), stats),
            StmtKind::Block(b) | StmtKind::Unsafe(b) => process_block(b, ranges, stats),
            StmtKind::Match { cases, default, .. } => {
                for c in cases.iter_mut() {
                    process_block(&mut c.body, ranges, stats);
                }
                if let Some(b) = default {
                    process_block(b, ranges, stats);
                }
            }
            StmtKind::TryElse { try_block, else_block } => {
                process_block(try_block, ranges, stats);
                process_block(else_block, ranges, stats);
            }
            StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => simplify_cond(e, ranges, stats),
            StmtKind::VarDecl { init: Some(e), .. } => simplify_cond(e, ranges, stats),
            StmtKind::Assign { target, value } => {
                simplify_cond(target, ranges, stats);
                simplify_cond(value, ranges, stats);
            }
            _ => {}
        }
    }
}

pub fn run(program: &mut Program) -> CorrelatedPropagationStats {
    let mut stats = CorrelatedPropagationStats::default();
    for decl in program.functions_mut() {
        process_block(&mut decl.body, &HashMap::new(), &mut stats);
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

    fn cmp(op: BinOp, var: &str, lit: i64) -> Expr {
        Expr::new(ExprKind::Binary { op, left: Box::new(Expr::ident(var, loc())), right: Box::new(Expr::int(lit, loc())) }, loc())
    }

    #[test]
    fn a_weaker_comparison_implied_by_a_dominating_one_folds_to_true() {
        let inner = Stmt::new(
            StmtKind::If { cond: cmp(BinOp::Gt, "x", 0), then_branch: Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::int(1, loc()))), loc())]), elifs: vec![], else_branch: None },
            loc(),
        );
        let outer = Stmt::new(StmtKind::If { cond: cmp(BinOp::Gt, "x", 10), then_branch: Block::new(vec![inner]), elifs: vec![], else_branch: None }, loc());
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body: Block::new(vec![outer]), is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.comparisons_simplified, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::If { then_branch, .. } = &decl.body.stmts[0].kind else { panic!() };
        let StmtKind::If { cond, .. } = &then_branch.stmts[0].kind else { panic!() };
        assert_eq!(cond.kind, ExprKind::BoolLiteral(true));
    }

    #[test]
    fn a_contradicted_comparison_folds_to_false() {
        let inner = Stmt::new(
            StmtKind::If { cond: cmp(BinOp::Lt, "x", 0), then_branch: Block::new(vec![]), elifs: vec![], else_branch: None },
            loc(),
        );
        let outer = Stmt::new(StmtKind::If { cond: cmp(BinOp::Gt, "x", 10), then_branch: Block::new(vec![inner]), elifs: vec![], else_branch: None }, loc());
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body: Block::new(vec![outer]), is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.comparisons_simplified, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::If { then_branch, .. } = &decl.body.stmts[0].kind else { panic!() };
        let StmtKind::If { cond, .. } = &then_branch.stmts[0].kind else { panic!() };
        assert_eq!(cond.kind, ExprKind::BoolLiteral(false));
    }

    #[test]
    fn an_unrelated_variable_is_left_alone() {
        let inner = Stmt::new(StmtKind::If { cond: cmp(BinOp::Gt, "y", 0), then_branch: Block::new(vec![]), elifs: vec![], else_branch: None }, loc());
        let outer = Stmt::new(StmtKind::If { cond: cmp(BinOp::Gt, "x", 10), then_branch: Block::new(vec![inner]), elifs: vec![], else_branch: None }, loc());
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body: Block::new(vec![outer]), is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.comparisons_simplified, 0);
    }
}
