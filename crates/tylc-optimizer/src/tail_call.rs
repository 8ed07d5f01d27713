//! Rewrites direct tail self-recursion into a `while true` loop.
//!
//! Restricted to tail positions reachable through `if`/`match`/`try-else`/
//! `unsafe` — a tail return nested inside an inner `while`/`for` is left
//! alone, since rewriting it to `continue` would restart the wrong loop.

use tylc_core::ast::*;
use tylc_core::SourceLocation;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TailCallStats {
    pub functions_rewritten: usize,
    pub tail_returns_rewritten: usize,
}

struct Ctx {
    fn_name: String,
    params: Vec<Param>,
    counter: u32,
    uses_result: bool,
    rewritten: usize,
}

fn is_tail_self_call(expr: &Expr, fn_name: &str) -> bool {
    match &expr.kind {
        ExprKind::Call { args, .. } if expr.is_call_to(fn_name) => !args.iter().any(|a| a.contains_call_to(fn_name)),
        _ => false,
    }
}

fn has_tail_call(stmts: &[Stmt], fn_name: &str) -> bool {
    stmts.iter().any(|stmt| match &stmt.kind {
        StmtKind::Return(Some(e)) => is_tail_self_call(e, fn_name),
        StmtKind::If { then_branch, elifs, else_branch, .. } => {
            has_tail_call(&then_branch.stmts, fn_name)
                || elifs.iter().any(|(_, b)| has_tail_call(&b.stmts, fn_name))
                || else_branch.as_ref().is_some_and(|b| has_tail_call(&b.stmts, fn_name))
        }
        StmtKind::Match { cases, default, .. } => {
            cases.iter().any(|c| has_tail_call(&c.body.stmts, fn_name)) || default.as_ref().is_some_and(|b| has_tail_call(&b.stmts, fn_name))
        }
        StmtKind::TryElse { try_block, else_block } => has_tail_call(&try_block.stmts, fn_name) || has_tail_call(&else_block.stmts, fn_name),
        StmtKind::Unsafe(b) | StmtKind::Block(b) => has_tail_call(&b.stmts, fn_name),
        _ => false,
    })
}

fn fresh_temp(ctx: &mut Ctx) -> String {
    let name = format!("$tco_temp_{}", ctx.counter);
    ctx.counter += 1;
    name
}

fn tail_call_replacement(call_expr: Expr, ctx: &mut Ctx) -> Vec<Stmt> {
    let ExprKind::Call { args, .. } = call_expr.kind else { unreachable!() };
    let loc = call_expr.loc;
    let mut out = Vec::new();
    let mut temp_names = Vec::with_capacity(args.len());
    for arg in args {
        let temp = fresh_temp(ctx);
        out.push(Stmt::new(
            StmtKind::VarDecl { name: temp.clone(), type_name: None, mutable: false, is_const: false, init: Some(arg) },
            loc,
        ));
        temp_names.push(temp);
    }
    for (param, temp) in ctx.params.clone().iter().zip(&temp_names) {
        out.push(Stmt::new(
            StmtKind::Assign { target: Expr::ident(param.name.clone(), loc), value: Expr::ident(temp.clone(), loc) },
            loc,
        ));
    }
    out.push(Stmt::new(StmtKind::Continue(None), loc));
    ctx.rewritten += 1;
    out
}

fn non_tail_replacement(value: Option<Expr>, ctx: &mut Ctx, loc: SourceLocation) -> Vec<Stmt> {
    match value {
        Some(v) => {
            ctx.uses_result = true;
            vec![
                Stmt::new(StmtKind::Assign { target: Expr::ident("$tco_result", loc), value: v }, loc),
                Stmt::new(StmtKind::Break(None), loc),
            ]
        }
        None => vec![Stmt::new(StmtKind::Break(None), loc)],
    }
}

fn rewrite_block(stmts: &mut Vec<Stmt>, ctx: &mut Ctx) {
    for stmt in stmts.iter_mut() {
        match &mut stmt.kind {
            StmtKind::If { then_branch, elifs, else_branch, .. } => {
                rewrite_block(&mut then_branch.stmts, ctx);
                for (_, b) in elifs.iter_mut() {
                    rewrite_block(&mut b.stmts, ctx);
                }
                if let Some(b) = else_branch {
                    rewrite_block(&mut b.stmts, ctx);
                }
            }
            StmtKind::Match { cases, default, .. } => {
                for c in cases.iter_mut() {
                    rewrite_block(&mut c.body.stmts, ctx);
                }
                if let Some(b) = default {
                    rewrite_block(&mut b.stmts, ctx);
                }
            }
            StmtKind::TryElse { try_block, else_block } => {
                rewrite_block(&mut try_block.stmts, ctx);
                rewrite_block(&mut else_block.stmts, ctx);
            }
            StmtKind::Unsafe(b) | StmtKind::Block(b) => rewrite_block(&mut b.stmts, ctx),
            _ => {}
        }
    }

    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts.drain(..) {
        let loc = stmt.loc;
        match stmt.kind {
            StmtKind::Return(Some(e)) if is_tail_self_call(&e, &ctx.fn_name) => out.extend(tail_call_replacement(e, ctx)),
            StmtKind::Return(v) => out.extend(non_tail_replacement(v, ctx, loc)),
            other => out.push(Stmt::new(other, loc)),
        }
    }
    *stmts = out;
}

pub fn run(program: &mut Program) -> TailCallStats {
    let mut stats = TailCallStats::default();
    for item in program.items.iter_mut() {
        if let StmtKind::FnDecl(decl) = &mut item.kind {
            if !decl.eligible_for_tail_call_opt() || !has_tail_call(&decl.body.stmts, &decl.name) {
                continue;
            }
            // a tail call to itself found inside its own argument list would
            // have tripped `contains_call_to` already; guard against a
            // parameterless accidental match on an unrelated identifier.
            if decl.params.iter().any(|p| p.name == decl.name) {
                continue;
            }

            let mut ctx = Ctx { fn_name: decl.name.clone(), params: decl.params.clone(), counter: 0, uses_result: false, rewritten: 0 };
            let mut body_stmts = std::mem::take(&mut decl.body.stmts);
            rewrite_block(&mut body_stmts, &mut ctx);

            let loc = SourceLocation::synthetic();
            let mut new_stmts = Vec::new();
            if ctx.uses_result {
                new_stmts.push(Stmt::new(
                    StmtKind::VarDecl { name: "$tco_result".into(), type_name: decl.return_type.clone(), mutable: true, is_const: false, init: None },
                    loc,
                ));
            }
            new_stmts.push(Stmt::new(
                StmtKind::While { cond: Expr::new(ExprKind::BoolLiteral(true), loc), body: Block::new(body_stmts), label: None },
                loc,
            ));
            if ctx.uses_result {
                new_stmts.push(Stmt::new(StmtKind::Return(Some(Expr::ident("$tco_result", loc))), loc));
            }
            decl.body = Block::new(new_stmts);

            stats.functions_rewritten += 1;
            stats.tail_returns_rewritten += ctx.rewritten;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::synthetic()
    }

    fn fact_fn() -> FnDecl {
        // fn fact(n, acc) { if n <= 1 { return acc; } else { return fact(n - 1, n * acc); } }
        let cond = Expr::new(ExprKind::Binary { op: BinOp::LtEq, left: Box::new(Expr::ident("n", loc())), right: Box::new(Expr::int(1, loc())) }, loc());
        let then_branch = Block::new(vec![Stmt::new(StmtKind::Return(Some(Expr::ident("acc", loc()))), loc())]);
        let call = Expr::new(
            ExprKind::Call {
                callee: Box::new(Expr::ident("fact", loc())),
                args: vec![
                    Expr::new(ExprKind::Binary { op: BinOp::Sub, left: Box::new(Expr::ident("n", loc())), right: Box::new(Expr::int(1, loc())) }, loc()),
                    Expr::new(ExprKind::Binary { op: BinOp::Mul, left: Box::new(Expr::ident("n", loc())), right: Box::new(Expr::ident("acc", loc())) }, loc()),
                ],
            },
            loc(),
        );
        let else_branch = Block::new(vec![Stmt::new(StmtKind::Return(Some(call)), loc())]);
        FnDecl {
            name: "fact".into(),
            params: vec![Param { name: "n".into(), type_name: None, by_ref: false }, Param { name: "acc".into(), type_name: None, by_ref: false }],
            return_type: None,
            body: Block::new(vec![Stmt::new(StmtKind::If { cond, then_branch, elifs: vec![], else_branch: Some(else_branch) }, loc())]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        }
    }

    #[test]
    fn rewrites_direct_tail_recursion_into_a_loop() {
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(fact_fn()))]);
        let stats = run(&mut program);
        assert_eq!(stats.functions_rewritten, 1);
        assert_eq!(stats.tail_returns_rewritten, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        assert!(matches!(decl.body.stmts[0].kind, StmtKind::While { .. }));
    }

    #[test]
    fn ackermann_style_nested_call_is_not_a_tail_call() {
        // return fact(fact(n)); — outer call's argument itself calls fact.
        let inner = Expr::new(ExprKind::Call { callee: Box::new(Expr::ident("fact", loc())), args: vec![Expr::ident("n", loc())] }, loc());
        let outer = Expr::new(ExprKind::Call { callee: Box::new(Expr::ident("fact", loc())), args: vec![inner] }, loc());
        let mut decl = fact_fn();
        decl.body = Block::new(vec![Stmt::new(StmtKind::Return(Some(outer)), loc())]);
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.functions_rewritten, 0);
    }

    #[test]
    fn extern_functions_are_skipped() {
        let mut decl = fact_fn();
        decl.is_extern = true;
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.functions_rewritten, 0);
    }
}
