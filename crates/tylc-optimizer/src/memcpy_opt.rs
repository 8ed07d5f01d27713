//! Collapses a contiguous run of constant-index stores into a single
//! memset/memcpy intrinsic call: `a[k]=v; a[k+1]=v; a[k+2]=v;` (same value,
//! run length at least [`MIN_RUN_LEN`]) becomes one `__builtin_memset`
//! call; the parallel-index form `a[k]=b[k]; a[k+1]=b[k+1]; …` becomes
//! `__builtin_memcpy`.

use tylc_core::ast::*;
use tylc_core::SourceLocation;

use crate::util::expr_eq;

const MIN_RUN_LEN: usize = 3;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemcpyOptStats {
    pub memsets_created: usize,
    pub memcpys_created: usize,
}

struct ConstIndexStore<'a> {
    dest: &'a str,
    index: i64,
    value: &'a Expr,
}

fn as_const_index_store(stmt: &Stmt) -> Option<ConstIndexStore<'_>> {
    let StmtKind::Assign { target, value } = &stmt.kind else { return None };
    let ExprKind::Index { object, index } = &target.kind else { return None };
    let ExprKind::Identifier(dest) = &object.kind else { return None };
    let ExprKind::IntLiteral(index) = &index.kind else { return None };
    Some(ConstIndexStore { dest, index: *index, value })
}

fn as_parallel_read(expr: &Expr, expected_index: i64) -> Option<&str> {
    let ExprKind::Index { object, index } = &expr.kind else { return None };
    let ExprKind::Identifier(src) = &object.kind else { return None };
    let ExprKind::IntLiteral(i) = &index.kind else { return None };
    (*i == expected_index).then_some(src.as_str())
}

enum RunKind {
    Memset,
    Memcpy { src: String },
}

fn classify_run(stores: &[ConstIndexStore]) -> Option<RunKind> {
    let first = &stores[0];
    if let Some(src0) = as_parallel_read(first.value, first.index) {
        if src0 != first.dest && stores.iter().all(|s| as_parallel_read(s.value, s.index) == Some(src0)) {
            return Some(RunKind::Memcpy { src: src0.to_string() });
        }
    }
    if stores.iter().all(|s| expr_eq(s.value, first.value)) {
        return Some(RunKind::Memset);
    }
    None
}

fn build_call(dest: &str, start: i64, len: usize, kind: RunKind, value: &Expr, loc: SourceLocation) -> Expr {
    let dest_ptr = Expr::new(ExprKind::Index { object: Box::new(Expr::ident(dest, loc)), index: Box::new(Expr::int(start, loc)) }, loc);
    let count = Expr::int(len as i64, loc);
    let (callee, args) = match kind {
        RunKind::Memset => ("__builtin_memset", vec![dest_ptr, value.clone(), count]),
        RunKind::Memcpy { src } => {
            let src_ptr = Expr::new(ExprKind::Index { object: Box::new(Expr::ident(src, loc)), index: Box::new(Expr::int(start, loc)) }, loc);
            ("__builtin_memcpy", vec![dest_ptr, src_ptr, count])
        }
    };
    Expr::new(ExprKind::Call { callee: Box::new(Expr::ident(callee, loc)), args }, loc)
}

fn process_block(block: &mut Block, stats: &mut MemcpyOptStats) {
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
            StmtKind::While { body, .. } | StmtKind::ForIn { body, .. } | StmtKind::Block(body) | StmtKind::Unsafe(body) => process_block(body, stats),
            _ => {}
        }
    }

    let mut out: Vec<Stmt> = Vec::with_capacity(block.stmts.len());
    let mut i = 0;
    while i < block.stmts.len() {
        let mut run_end = i + 1;
        if let Some(first) = as_const_index_store(&block.stmts[i]) {
            let mut stores = vec![first];
            while run_end < block.stmts.len() {
                let Some(next) = as_const_index_store(&block.stmts[run_end]) else { break };
                let last = stores.last().unwrap();
                if next.dest != last.dest || next.index != last.index + 1 {
                    break;
                }
                stores.push(next);
                run_end += 1;
            }
            if stores.len() >= MIN_RUN_LEN {
                if let Some(kind) = classify_run(&stores) {
                    let dest = stores[0].dest.to_string();
                    let start = stores[0].index;
                    let len = stores.len();
                    let value = stores[0].value;
                    let loc = block.stmts[i].loc;
                    let is_memcpy = matches!(&kind, RunKind::Memcpy { .. });
                    let call = build_call(&dest, start, len, kind, value, loc);
                    out.push(Stmt::new(StmtKind::ExprStmt(call), loc));
                    if is_memcpy {
                        stats.memcpys_created += 1;
                    } else {
                        stats.memsets_created += 1;
                    }
                    i = run_end;
                    continue;
                }
            }
        }
        out.push(block.stmts[i].clone());
        i += 1;
    }
    block.stmts = out;
}

pub fn run(program: &mut Program) -> MemcpyOptStats {
    let mut stats = MemcpyOptStats::default();
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

    fn store(dest: &str, index: i64, value: Expr) -> Stmt {
        Stmt::new(
            StmtKind::Assign { target: Expr::new(ExprKind::Index { object: Box::new(Expr::ident(dest, loc())), index: Box::new(Expr::int(index, loc())) }, loc()), value },
            loc(),
        )
    }

    #[test]
    fn collapses_a_run_of_identical_stores_into_a_memset() {
        let body = Block::new(vec![store("a", 0, Expr::int(0, loc())), store("a", 1, Expr::int(0, loc())), store("a", 2, Expr::int(0, loc()))]);
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body, is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.memsets_created, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        assert_eq!(decl.body.stmts.len(), 1);
    }

    #[test]
    fn collapses_a_parallel_index_run_into_a_memcpy() {
        let idx = |arr: &str, i: i64| Expr::new(ExprKind::Index { object: Box::new(Expr::ident(arr, loc())), index: Box::new(Expr::int(i, loc())) }, loc());
        let body = Block::new(vec![store("a", 0, idx("b", 0)), store("a", 1, idx("b", 1)), store("a", 2, idx("b", 2))]);
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body, is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.memcpys_created, 1);
    }

    #[test]
    fn a_run_shorter_than_the_minimum_is_left_alone() {
        let body = Block::new(vec![store("a", 0, Expr::int(0, loc())), store("a", 1, Expr::int(0, loc()))]);
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body, is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.memsets_created, 0);
    }
}
