//! Peels the first iteration off a `for` loop with a statically known,
//! constant-bounded trip count of at least two, substituting the induction
//! variable with its starting literal in the peeled copy.
//!
//! Only first-iteration peeling is implemented. Last-iteration peeling is
//! a distinct transform (it needs the final value of the induction
//! variable, which for a non-unit step is not simply `end - 1`) and is out
//! of scope here.

use tylc_core::ast::*;
use tylc_core::SourceLocation;

use crate::util::substitute_identifier;

const MAX_PEEL_COUNT: i64 = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopPeelingStats {
    pub loops_peeled: usize,
    pub iterations_peeled: usize,
}

struct TripCount {
    start: i64,
    end: i64,
    inclusive: bool,
}

fn known_trip_count(iterable: &Expr) -> Option<TripCount> {
    match &iterable.kind {
        ExprKind::Range { start, end } => match (&start.kind, &end.kind) {
            (ExprKind::IntLiteral(s), ExprKind::IntLiteral(e)) => Some(TripCount { start: *s, end: *e, inclusive: false }),
            _ => None,
        },
        ExprKind::RangeInclusive { start, end } => match (&start.kind, &end.kind) {
            (ExprKind::IntLiteral(s), ExprKind::IntLiteral(e)) => Some(TripCount { start: *s, end: *e, inclusive: true }),
            _ => None,
        },
        _ => None,
    }
}

impl TripCount {
    fn len(&self) -> i64 {
        if self.inclusive {
            self.end - self.start + 1
        } else {
            self.end - self.start
        }
    }
}

fn try_peel(var: &str, iterable: &Expr, body: &Block, label: &Option<String>, loc: SourceLocation, stats: &mut LoopPeelingStats) -> Option<Vec<Stmt>> {
    let trip = known_trip_count(iterable)?;
    if trip.len() < 2 || MAX_PEEL_COUNT < 1 {
        return None;
    }

    let mut peeled = body.clone();
    for stmt in peeled.stmts.iter_mut() {
        substitute_in_stmt(stmt, var, trip.start);
    }

    let new_start = Expr::new(ExprKind::IntLiteral(trip.start + 1), loc);
    let new_end = Expr::new(ExprKind::IntLiteral(trip.end), loc);
    let new_iterable = if trip.inclusive {
        ExprKind::RangeInclusive { start: Box::new(new_start), end: Box::new(new_end) }
    } else {
        ExprKind::Range { start: Box::new(new_start), end: Box::new(new_end) }
    };
    let remaining_loop = Stmt::new(
        StmtKind::ForIn { var: var.to_string(), iterable: Expr::new(new_iterable, loc), body: body.clone(), label: label.clone() },
        loc,
    );

    stats.loops_peeled += 1;
    stats.iterations_peeled += 1;

    let mut out = peeled.stmts;
    out.push(remaining_loop);
    Some(out)
}

fn substitute_in_stmt(stmt: &mut Stmt, var: &str, value: i64) {
    match &mut stmt.kind {
        StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => substitute_identifier(e, var, &ExprKind::IntLiteral(value)),
        StmtKind::VarDecl { init: Some(e), .. } => substitute_identifier(e, var, &ExprKind::IntLiteral(value)),
        StmtKind::Assign { target, value: v } => {
            substitute_identifier(target, var, &ExprKind::IntLiteral(value));
            substitute_identifier(v, var, &ExprKind::IntLiteral(value));
        }
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => substitute_identifier(cond, var, &ExprKind::IntLiteral(value)),
        _ => {}
    }
    walk_stmt_blocks_mut(stmt, &mut |b| {
        for s in b.stmts.iter_mut() {
            substitute_in_stmt(s, var, value);
        }
    });
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

fn process_block(block: &mut Block, stats: &mut LoopPeelingStats) {
    for stmt in block.stmts.iter_mut() {
        walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, stats));
    }

    let mut out = Vec::with_capacity(block.stmts.len());
    for stmt in block.stmts.drain(..) {
        let loc = stmt.loc;
        if let StmtKind::ForIn { var, iterable, body, label } = &stmt.kind {
            if let Some(replacement) = try_peel(var, iterable, body, label, loc, stats) {
                out.extend(replacement);
                continue;
            }
        }
        out.push(stmt);
    }
    block.stmts = out;
}

pub fn run(program: &mut Program) -> LoopPeelingStats {
    let mut stats = LoopPeelingStats::default();
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
    fn peels_the_first_iteration_of_a_constant_bounded_range() {
        let range = Expr::new(ExprKind::Range { start: Box::new(Expr::int(0, loc())), end: Box::new(Expr::int(4, loc())) }, loc());
        let body = Block::new(vec![Stmt::new(
            StmtKind::ExprStmt(Expr::new(
                ExprKind::Index { object: Box::new(Expr::ident("a", loc())), index: Box::new(Expr::ident("i", loc())) },
                loc(),
            )),
            loc(),
        )]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::ForIn { var: "i".into(), iterable: range, body, label: None }, loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.loops_peeled, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        assert_eq!(decl.body.stmts.len(), 2); // peeled stmt + remaining loop
        let StmtKind::ForIn { iterable, .. } = &decl.body.stmts[1].kind else { panic!() };
        let ExprKind::Range { start, .. } = &iterable.kind else { panic!() };
        assert_eq!(start.kind, ExprKind::IntLiteral(1));
    }

    #[test]
    fn a_trip_count_of_one_is_not_peeled() {
        let range = Expr::new(ExprKind::Range { start: Box::new(Expr::int(0, loc())), end: Box::new(Expr::int(1, loc())) }, loc());
        let body = Block::new(vec![Stmt::new(StmtKind::ExprStmt(Expr::ident("x", loc())), loc())]);
        let decl = FnDecl {
            name: "f".into(),
            params: vec![],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::ForIn { var: "i".into(), iterable: range, body, label: None }, loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.loops_peeled, 0);
    }
}
