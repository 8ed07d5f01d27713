//! Scalar Replacement of Aggregates: a record-typed local whose address is
//! never taken and which is never used as a whole value — only through
//! `r.field` — is replaced by one fresh scalar per field.

use std::collections::{HashMap, HashSet};

use tylc_core::ast::*;

use crate::util::direct_children_mut;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SroaStats {
    pub records_replaced: usize,
    pub field_accesses_rewritten: usize,
}

fn sroa_field_name(record: &str, field: &str) -> String {
    format!("{record}_{field}_sroa")
}

/// True if `name` ever appears as a bare identifier (used "whole") or has
/// its address taken, anywhere in `block`.
fn used_as_whole(block: &Block, name: &str) -> bool {
    fn in_expr(e: &Expr, name: &str) -> bool {
        if let ExprKind::MemberAccess { object, .. } = &e.kind {
            if matches!(&object.kind, ExprKind::Identifier(n) if n == name) {
                // accessed through a field, not "whole" by itself — but its
                // children still need scanning in case `name` shows up
                // elsewhere (e.g. as an argument alongside the field access).
                let mut found = false;
                walk_expr_children(e, &mut |c| {
                    if !matches!(&c.kind, ExprKind::Identifier(n2) if n2 == name) {
                        found |= in_expr(c, name);
                    }
                });
                return found;
            }
        }
        if matches!(&e.kind, ExprKind::Identifier(n) if n == name) {
            return true;
        }
        let mut found = false;
        walk_expr_children(e, &mut |c| found |= in_expr(c, name));
        found
    }
    fn in_stmt(stmt: &Stmt, name: &str) -> bool {
        let mut found = match &stmt.kind {
            StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => in_expr(e, name),
            StmtKind::VarDecl { init: Some(e), .. } => in_expr(e, name),
            StmtKind::Assign { target, value } => {
                // `r.field = v` is fine; `r = v` assigns the whole record.
                let target_whole = matches!(&target.kind, ExprKind::Identifier(n) if n == name);
                target_whole || in_expr(target, name) && !matches!(&target.kind, ExprKind::MemberAccess { .. }) || in_expr(value, name)
            }
            StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => in_expr(cond, name),
            _ => false,
        };
        walk_stmt_blocks(stmt, &mut |b| found |= used_as_whole(b, name));
        found
    }
    block.stmts.iter().any(|s| in_stmt(s, name))
}

fn field_names(record_name: &str, program_records: &HashMap<String, Vec<String>>, declared_type: &str) -> Option<Vec<String>> {
    let _ = record_name;
    program_records.get(declared_type).cloned()
}

fn rewrite_expr(expr: &mut Expr, record: &str, count: &mut usize) {
    if let ExprKind::MemberAccess { object, field } = &expr.kind {
        if matches!(&object.kind, ExprKind::Identifier(n) if n == record) {
            expr.kind = ExprKind::Identifier(sroa_field_name(record, field));
            *count += 1;
            return;
        }
    }
    for child in direct_children_mut(expr) {
        rewrite_expr(child, record, count);
    }
}

fn rewrite_stmt_tree(stmt: &mut Stmt, record: &str, count: &mut usize) {
    match &mut stmt.kind {
        StmtKind::ExprStmt(e) | StmtKind::Return(Some(e)) | StmtKind::Delete(e) => rewrite_expr(e, record, count),
        StmtKind::VarDecl { init: Some(e), .. } => rewrite_expr(e, record, count),
        StmtKind::Assign { target, value } => {
            rewrite_expr(target, record, count);
            rewrite_expr(value, record, count);
        }
        StmtKind::If { cond, .. } | StmtKind::While { cond, .. } => rewrite_expr(cond, record, count),
        _ => {}
    }
    walk_stmt_blocks_mut(stmt, &mut |b| {
        for s in b.stmts.iter_mut() {
            rewrite_stmt_tree(s, record, count);
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

pub fn run(program: &mut Program) -> SroaStats {
    let mut stats = SroaStats::default();

    let mut record_fields: HashMap<String, Vec<String>> = HashMap::new();
    for item in &program.items {
        if let StmtKind::RecordDecl { name, fields } = &item.kind {
            record_fields.insert(name.clone(), fields.iter().map(|(n, _)| n.clone()).collect());
        }
    }
    if record_fields.is_empty() {
        return stats;
    }

    for decl in program.functions_mut() {
        let mut candidates: Vec<(String, Vec<(String, Expr)>)> = Vec::new();
        let address_free: HashSet<String> = decl
            .body
            .stmts
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::VarDecl { name, type_name: Some(t), init: Some(init), .. } => {
                    let fields = field_names(name, &record_fields, t)?;
                    let ExprKind::RecordLiteral { type_name, fields: lit_fields } = &init.kind else { return None };
                    if type_name != t {
                        return None;
                    }
                    let lit_names: HashSet<&str> = lit_fields.iter().map(|(n, _)| n.as_str()).collect();
                    if fields.iter().any(|f| !lit_names.contains(f.as_str())) {
                        return None;
                    }
                    if used_as_whole(&decl.body, name) {
                        return None;
                    }
                    candidates.push((name.clone(), lit_fields.clone()));
                    Some(name.clone())
                }
                _ => None,
            })
            .collect();
        let _ = address_free;

        for (record_name, fields) in candidates {
            stats.records_replaced += 1;
            for s in decl.body.stmts.iter_mut() {
                rewrite_stmt_tree(s, &record_name, &mut stats.field_accesses_rewritten);
            }
            // replace the original record declaration with one VarDecl per field
            if let Some(pos) = decl.body.stmts.iter().position(|s| matches!(&s.kind, StmtKind::VarDecl { name, .. } if *name == record_name)) {
                let loc = decl.body.stmts[pos].loc;
                let replacement: Vec<Stmt> = fields
                    .into_iter()
                    .map(|(field, value)| {
                        Stmt::new(
                            StmtKind::VarDecl { name: sroa_field_name(&record_name, &field), type_name: None, mutable: true, is_const: false, init: Some(value) },
                            loc,
                        )
                    })
                    .collect();
                decl.body.stmts.splice(pos..pos + 1, replacement);
            }
        }
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

    #[test]
    fn splits_a_record_local_into_its_fields() {
        let record_decl = Stmt::synthetic(StmtKind::RecordDecl { name: "Point".into(), fields: vec![("x".into(), "int".into()), ("y".into(), "int".into())] });
        let body = Block::new(vec![
            Stmt::new(
                StmtKind::VarDecl {
                    name: "p".into(),
                    type_name: Some("Point".into()),
                    mutable: false,
                    is_const: false,
                    init: Some(Expr::new(
                        ExprKind::RecordLiteral { type_name: "Point".into(), fields: vec![("x".into(), Expr::int(1, loc())), ("y".into(), Expr::int(2, loc()))] },
                        loc(),
                    )),
                },
                loc(),
            ),
            Stmt::new(
                StmtKind::Return(Some(Expr::new(
                    ExprKind::Binary {
                        op: BinOp::Add,
                        left: Box::new(Expr::new(ExprKind::MemberAccess { object: Box::new(Expr::ident("p", loc())), field: "x".into() }, loc())),
                        right: Box::new(Expr::new(ExprKind::MemberAccess { object: Box::new(Expr::ident("p", loc())), field: "y".into() }, loc())),
                    },
                    loc(),
                ))),
                loc(),
            ),
        ]);
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body, is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![record_decl, Stmt::synthetic(StmtKind::FnDecl(decl))]);

        let stats = run(&mut program);
        assert_eq!(stats.records_replaced, 1);
        assert_eq!(stats.field_accesses_rewritten, 2);

        let StmtKind::FnDecl(decl) = &program.items[1].kind else { panic!() };
        assert_eq!(decl.body.stmts.len(), 3); // two scalar decls + return
        assert!(matches!(&decl.body.stmts[0].kind, StmtKind::VarDecl { name, .. } if name == "p_x_sroa"));
        assert!(matches!(&decl.body.stmts[1].kind, StmtKind::VarDecl { name, .. } if name == "p_y_sroa"));
    }

    #[test]
    fn a_record_used_whole_is_not_split() {
        let record_decl = Stmt::synthetic(StmtKind::RecordDecl { name: "Point".into(), fields: vec![("x".into(), "int".into())] });
        let body = Block::new(vec![
            Stmt::new(
                StmtKind::VarDecl {
                    name: "p".into(),
                    type_name: Some("Point".into()),
                    mutable: false,
                    is_const: false,
                    init: Some(Expr::new(ExprKind::RecordLiteral { type_name: "Point".into(), fields: vec![("x".into(), Expr::int(1, loc()))] }, loc())),
                },
                loc(),
            ),
            Stmt::new(StmtKind::Return(Some(Expr::ident("p", loc()))), loc()),
        ]);
        let decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body, is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![record_decl, Stmt::synthetic(StmtKind::FnDecl(decl))]);

        let stats = run(&mut program);
        assert_eq!(stats.records_replaced, 0);
    }
}
