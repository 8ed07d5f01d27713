//! Global value numbering with copy propagation, scoped to straight-line
//! runs the same way `mem2reg` is: a join point wipes every known value and
//! copy chain rather than attempting to merge them.
//!
//! Value numbering here is purely syntactic — two expressions are "the same
//! value" if they are structurally equal once every known copy has been
//! resolved to its root. There is no alias analysis, so reads through a
//! pointer or a field are never numbered with each other. `GVN-PRE`
//! (hoisting a value above the block where it first appears) is out of
//! scope; only existing computations already available in the dominating
//! straight line are reused.

use std::collections::HashMap;

use tylc_core::ast::*;

use crate::util::{direct_children_mut, expr_eq, is_side_effect_free};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GvnStats {
    pub copies_propagated: usize,
    pub expressions_reused: usize,
}

#[derive(Default)]
struct Scope {
    /// `x = y` copy chains, resolved transitively to copy's root identifier.
    copies: HashMap<String, String>,
    /// Available expressions in this straight-line run, keyed by their
    /// canonical (copy-resolved) form, mapped to the identifier already
    /// holding that value.
    available: Vec<(Expr, String)>,
}

impl Scope {
    fn resolve_copy<'a>(&'a self, mut name: &'a str) -> &'a str {
        let mut seen = 0;
        while let Some(next) = self.copies.get(name) {
            name = next;
            seen += 1;
            if seen > 64 {
                break; // defensive bound against an accidental cycle
            }
        }
        name
    }

    fn canonicalize(&self, expr: &mut Expr) {
        if let ExprKind::Identifier(name) = &expr.kind {
            let resolved = self.resolve_copy(name);
            if resolved != name {
                expr.kind = ExprKind::Identifier(resolved.to_string());
            }
            return;
        }
        for child in direct_children_mut(expr) {
            self.canonicalize(child);
        }
    }

    fn find_available(&self, expr: &Expr) -> Option<String> {
        self.available.iter().find(|(e, _)| expr_eq(e, expr)).map(|(_, name)| name.clone())
    }
}

fn is_numberable(expr: &Expr) -> bool {
    !matches!(&expr.kind, ExprKind::Identifier(_) | ExprKind::IntLiteral(_) | ExprKind::FloatLiteral(_) | ExprKind::BoolLiteral(_) | ExprKind::CharLiteral(_))
        && is_side_effect_free(expr)
}

fn process_expr(expr: &mut Expr, scope: &mut Scope, stats: &mut GvnStats) {
    scope.canonicalize(expr);
    if is_numberable(expr) {
        if let Some(existing) = scope.find_available(expr) {
            expr.kind = ExprKind::Identifier(existing);
            stats.expressions_reused += 1;
        }
    }
}

fn process_block(block: &mut Block, stats: &mut GvnStats) {
    let mut scope = Scope::default();

    for stmt in block.stmts.iter_mut() {
        match &mut stmt.kind {
            StmtKind::VarDecl { name, init: Some(init), .. } => {
                process_expr(init, &mut scope, stats);
                if let ExprKind::Identifier(src) = &init.kind {
                    scope.copies.insert(name.clone(), src.clone());
                    stats.copies_propagated += 1;
                } else if is_numberable(init) {
                    scope.available.push((init.clone(), name.clone()));
                }
            }
            StmtKind::Assign { target, value } => {
                process_expr(value, &mut scope, stats);
                if let ExprKind::Identifier(name) = &target.kind {
                    scope.available.retain(|(_, holder)| holder != name);
                    scope.copies.retain(|k, v| k != name && v != name);
                    if let ExprKind::Identifier(src) = &value.kind {
                        scope.copies.insert(name.clone(), src.clone());
                        stats.copies_propagated += 1;
                    } else if is_numberable(value) {
                        scope.available.push((value.clone(), name.clone()));
                    }
                } else {
                    process_expr(target, &mut scope, stats);
                }
            }
            StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => process_expr(e, &mut scope, stats),
            StmtKind::If { cond, then_branch, elifs, else_branch } => {
                process_expr(cond, &mut scope, stats);
                process_block(then_branch, stats);
                for (c, b) in elifs.iter_mut() {
                    process_expr(c, &mut scope, stats);
                    process_block(b, stats);
                }
                if let Some(b) = else_branch {
                    process_block(b, stats);
                }
                scope = Scope::default();
            }
            _ => {
                walk_stmt_blocks_mut(stmt, &mut |b| process_block(b, stats));
                scope = Scope::default();
            }
        }
    }
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
        StmtKind::FnDecl(decl) => f(&mut decl.body),
        _ => {}
    }
}

pub fn run(program: &mut Program) -> GvnStats {
    let mut stats = GvnStats::default();
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

    fn add(a: &str, b: &str) -> Expr {
        Expr::new(ExprKind::Binary { op: BinOp::Add, left: Box::new(Expr::ident(a, loc())), right: Box::new(Expr::ident(b, loc())) }, loc())
    }

    #[test]
    fn reuses_an_identical_already_computed_expression() {
        let decl = FnDecl {
            name: "f".into(),
            params: vec![Param { name: "a".into(), type_name: None, by_ref: false }, Param { name: "b".into(), type_name: None, by_ref: false }],
            return_type: None,
            body: Block::new(vec![
                Stmt::new(StmtKind::VarDecl { name: "x".into(), type_name: None, mutable: false, is_const: false, init: Some(add("a", "b")) }, loc()),
                Stmt::new(StmtKind::VarDecl { name: "y".into(), type_name: None, mutable: false, is_const: false, init: Some(add("a", "b")) }, loc()),
                Stmt::new(StmtKind::Return(Some(Expr::ident("y", loc()))), loc()),
            ]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        let stats = run(&mut program);
        assert_eq!(stats.expressions_reused, 1);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::VarDecl { init: Some(init), .. } = &decl.body.stmts[1].kind else { panic!() };
        assert_eq!(init.kind, ExprKind::Identifier("x".into()));
    }

    #[test]
    fn follows_a_copy_chain_to_its_root() {
        let decl = FnDecl {
            name: "f".into(),
            params: vec![Param { name: "a".into(), type_name: None, by_ref: false }],
            return_type: None,
            body: Block::new(vec![
                Stmt::new(StmtKind::VarDecl { name: "x".into(), type_name: None, mutable: false, is_const: false, init: Some(Expr::ident("a", loc())) }, loc()),
                Stmt::new(StmtKind::VarDecl { name: "y".into(), type_name: None, mutable: false, is_const: false, init: Some(Expr::ident("x", loc())) }, loc()),
                Stmt::new(StmtKind::Return(Some(Expr::ident("y", loc()))), loc()),
            ]),
            is_extern: false,
            is_async: false,
            is_comptime: false,
        };
        let mut program = Program::new(vec![Stmt::synthetic(StmtKind::FnDecl(decl))]);
        run(&mut program);

        let StmtKind::FnDecl(decl) = &program.items[0].kind else { panic!() };
        let StmtKind::Return(Some(ret)) = &decl.body.stmts[2].kind else { panic!() };
        assert_eq!(ret.kind, ExprKind::Identifier("a".into()));
    }
}
