//! Constraint elimination, narrowed from full linear-constraint solving to
//! syntactic implication: an `if` nested inside a branch that already
//! established the identical condition (or its exact negation) is
//! redundant, and is folded away in favour of the branch it statically
//! takes.
//!
//! The original pass builds a `ConstraintSystem` of linear facts and asks
//! whether a check is implied by transitivity. Doing that for real needs a
//! decomposition of arbitrary expressions into `coefficients`/`constant`
//! terms, which this AST has no type or width information to ground
//! soundly. What is sound without it: a condition that is *exactly* the
//! same expression as one a dominating `if` already tested is exactly as
//! true (in its `then` branch) or exactly as false (in its `else` branch)
//! as it was there.

use tylc_core::ast::*;

use crate::util::expr_eq;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintEliminationStats {
    pub redundant_checks_eliminated: usize,
}

fn implied(cond: &Expr, known_true: &[&Expr], known_false: &[&Expr]) -> Option<bool> {
    if known_true.iter().any(|f| expr_eq(cond, f)) {
        return Some(true);
    }
    if known_false.iter().any(|f| expr_eq(cond, f)) {
        return Some(false);
    }
    None
}

fn process_block(block: &mut Block, known_true: &[&Expr], known_false: &[&Expr], stats: &mut ConstraintEliminationStats) {
    let mut out = Vec::with_capacity(block.stmts.len());
    for mut stmt in block.stmts.drain(..) {
        if let StmtKind::If { cond, then_branch, elifs, else_branch } = &mut stmt.kind {
            if elifs.is_empty() {
                if let Some(truth) = implied(cond, known_true, known_false) {
                    stats.redundant_checks_eliminated += 1;
                    let mut taken = if truth { std::mem::take(then_branch) } else { else_branch.take().unwrap_or_default() };
                    process_block(&mut taken, known_true, known_false, stats);
                    out.extend(taken.stmts);
                    continue;
                }
            }

            let mut true_facts: Vec<&Expr> = known_true.to_vec();
            true_facts.push(cond);
            process_block(then_branch, &true_facts, known_false, stats);

            for (elif_cond, elif_body) in elifs.iter_mut() {
                let mut facts: Vec<&Expr> = known_true.to_vec();
                facts.push(elif_cond);
                process_block(elif_body, &facts, known_false, stats);
            }

            if let Some(eb) = else_branch {
                let mut false_facts: Vec<&Expr> = known_false.to_vec();
                false_facts.push(cond);
                process_block(eb, known_true, &false_facts, stats);
            }
        } else {
            walk_stmt_blocks_mut(&mut stmt, &mut |b| process_block(b, known_true, known_false, stats));
        }
        out.push(stmt);
    }
    block.stmts = out;
}

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
        _ => {}
    }
}

pub fn run(program: &mut Program) -> ConstraintEliminationStats {
    let mut stats = ConstraintEliminationStats::default();
    for decl in program.functions_mut() {
        process_block(&mut decl.body, &[], &[], &mut stats);
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

    fn gt_zero(name: &str) -> Expr {
        Expr::new(ExprKind::Binary { op: BinOp::Gt, left: Box::new(Expr::ident(name, loc())), right: Box::new(Expr::int(0, loc())) }, loc())
    }

    #[test]
    fn a_repeated_identical_check_inside_the_true_branch_is_eliminated() {
        let inner = Stmt::new(
            StmtKind::If { cond: gt_zero("x"), then_branch: Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::int(1, loc()))), loc())]), elifs: vec![], else_branch: None },
            loc(),
        );
        let outer = Stmt::new(StmtKind::If { cond: gt_zero("x"), then_branch: Block::new(vec![inner]), elifs: vec![], else_branch: None }, loc());
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body: Block::new(vec![outer]), is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.redundant_checks_eliminated, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::If { then_branch, .. } = &decl.body.stmts[0].kind else { panic!() };
        assert_eq!(then_branch.stmts.len(), 1);
        assert!(matches!(&then_branch.stmts[0].kind, StmtKind::Return(_)));
    }

    #[test]
    fn the_same_check_repeated_inside_the_else_branch_is_eliminated_to_the_else_arm() {
        let inner_else = Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::int(0, loc()))), loc())]);
        let inner = Stmt::new(
            StmtKind::If {
                cond: gt_zero("x"),
                then_branch: Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::int(1, loc()))), loc())]),
                elifs: vec![],
                else_branch: Some(inner_else),
            },
            loc(),
        );
        let outer = Stmt::new(
            StmtKind::If { cond: gt_zero("x"), then_branch: Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::int(2, loc()))), loc())]), elifs: vec![], else_branch: Some(Block::new(vec![inner])) },
            loc(),
        );
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body: Block::new(vec![outer]), is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.redundant_checks_eliminated, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::If { else_branch, .. } = &decl.body.stmts[0].kind else { panic!() };
        let else_branch = else_branch.as_ref().unwrap();
        assert_eq!(else_branch.stmts.len(), 1);
        let StmtKind::Return(Some(v)) = &else_branch.stmts[0].kind else { panic!() };
        assert_eq!(v.kind, ExprKind::IntLiteral(0));
    }

    #[test]
    fn an_unrelated_check_is_left_alone() {
        let inner = Stmt::new(StmtKind::If { cond: gt_zero("y"), then_branch: Block::new(vec![]), elifs: vec![], else_branch: None }, loc());
        let outer = Stmt::new(StmtKind::If { cond: gt_zero("x"), then_branch: Block::new(vec![inner]), elifs: vec![], else_branch: None }, loc());
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body: Block::new(vec![outer]), is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.redundant_checks_eliminated, 0);
    }
}
