//! AST-to-AST optimization pipeline for the tylc backend.
//!
//! Each pass takes a fully type-checked [`tylc_core::ast::Program`] and
//! transforms it in place, returning a small stats struct describing what
//! it changed. No pass ever errors — a pass that cannot prove a
//! transformation safe simply leaves the node alone.

pub mod bdce;
pub mod constraint_elimination;
pub mod correlated_propagation;
pub mod dse;
pub mod gvn;
pub mod loop_delete;
pub mod loop_idiom;
pub mod loop_peel;
pub mod loop_rotate;
pub mod loop_simplify;
pub mod loop_unswitch;
pub mod memcpy_opt;
pub mod reassociate;
pub mod sroa;
pub mod tail_call;
pub mod mem2reg;
mod util;

use tylc_core::ast::Program;

pub use bdce::BdceStats;
pub use constraint_elimination::ConstraintEliminationStats;
pub use correlated_propagation::CorrelatedPropagationStats;
pub use dse::DseStats;
pub use gvn::GvnStats;
pub use loop_delete::LoopDeletionStats;
pub use loop_idiom::LoopIdiomStats;
pub use loop_peel::LoopPeelingStats;
pub use loop_rotate::LoopRotationStats;
pub use loop_simplify::LoopSimplifyStats;
pub use loop_unswitch::LoopUnswitchStats;
pub use mem2reg::Mem2RegStats;
pub use memcpy_opt::MemcpyOptStats;
pub use reassociate::ReassociateStats;
pub use sroa::SroaStats;
pub use tail_call::TailCallStats;

/// Aggregated stats from one run of [`run_default_pipeline`], in pipeline order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub mem2reg: Mem2RegStats,
    pub sroa: SroaStats,
    pub gvn: GvnStats,
    pub reassociate: ReassociateStats,
    pub bdce: BdceStats,
    pub constraint_elimination: ConstraintEliminationStats,
    pub correlated_propagation: CorrelatedPropagationStats,
    pub dse: DseStats,
    pub loop_simplify: LoopSimplifyStats,
    pub loop_rotate: LoopRotationStats,
    pub loop_unswitch: LoopUnswitchStats,
    pub loop_peel: LoopPeelingStats,
    pub loop_idiom: LoopIdiomStats,
    pub loop_delete: LoopDeletionStats,
    pub tail_call: TailCallStats,
    pub memcpy_opt: MemcpyOptStats,
}

/// Runs every pass once, in the fixed order the passes depend on each
/// other for: `mem2reg` and `SROA` need to run before anything that
/// reasons about scalar values can see through a record or a stack slot;
/// `GVN`'s copy propagation needs to run before `reassociate` ranks
/// operands; the loop passes run after the scalar passes so they see
/// simplified conditions; `tail-call` and `memcpy-opt` run last since
/// both recognize shapes the earlier passes tend to produce rather than
/// destroy.
///
/// This is a single pass over the pipeline, not a fixed-point iteration —
/// a caller that wants convergence (e.g. a loop peeled by `loop_peel`
/// exposing a new GVN opportunity) can call this repeatedly until the
/// returned stats are all-zero.
pub fn run_default_pipeline(program: &mut Program) -> PipelineStats {
    PipelineStats {
        mem2reg: mem2reg::run(program),
        sroa: sroa::run(program),
        gvn: gvn::run(program),
        reassociate: reassociate::run(program),
        bdce: bdce::run(program),
        constraint_elimination: constraint_elimination::run(program),
        correlated_propagation: correlated_propagation::run(program),
        dse: dse::run(program),
        loop_simplify: loop_simplify::run(program),
        loop_rotate: loop_rotate::run(program),
        loop_unswitch: loop_unswitch::run(program),
        loop_peel: loop_peel::run(program),
        loop_idiom: loop_idiom::run(program),
        loop_delete: loop_delete::run(program),
        tail_call: tail_call::run(program),
        memcpy_opt: memcpy_opt::run(program),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tylc_core::ast::*;
    use tylc_core::SourceLocation;

    #[test]
    fn the_default_pipeline_runs_cleanly_over_an_empty_program() {
        let mut program = Program::new(vec![]);
        let stats = run_default_pipeline(&mut program);
        assert_eq!(stats, PipelineStats::default());
    }

    #[test]
    fn sroa_then_mem2reg_then_reassociate_collapses_a_point_sum_to_a_constant() {
        let loc = SourceLocation::synthetic();
        let point = Stmt::synthetic(StmtKind::RecordDecl {
            name: "Point".into(),
            fields: vec![("x".into(), "int".into()), ("y".into(), "int".into())],
        });
        let p_decl = Stmt::new(
            StmtKind::VarDecl {
                name: "p".into(),
                type_name: Some("Point".into()),
                mutable: false,
                is_const: false,
                init: Some(Expr::new(
                    ExprKind::RecordLiteral { type_name: "Point".into(), fields: vec![("x".into(), Expr::int(3, loc)), ("y".into(), Expr::int(4, loc))] },
                    loc,
                )),
            },
            loc,
        );
        let sum = Expr::new(
            ExprKind::Binary {
                op: BinOp::Add,
                left: Box::new(Expr::new(ExprKind::MemberAccess { object: Box::new(Expr::ident("p", loc)), field: "x".into() }, loc)),
                right: Box::new(Expr::new(ExprKind::MemberAccess { object: Box::new(Expr::ident("p", loc)), field: "y".into() }, loc)),
            },
            loc,
        );
        let ret = Stmt::new(StmtKind::Return(Some(sum)), loc);
        let fn_decl = FnDecl { name: "f".into(), params: vec![], return_type: None, body: Block::new(vec![p_decl, ret]), is_extern: false, is_async: false, is_comptime: false };
        let mut program = Program::new(vec![point, Stmt::synthetic(StmtKind::FnDecl(fn_decl))]);

        // SROA splits `p` into scalars, mem2reg then substitutes each
        // scalar's single known initializer into the read, and reassociate
        // folds the resulting literal `+` chain — the same three-stage
        // collapse `run_default_pipeline` would only reach on a second
        // pass, since mem2reg's promotable set is computed before SROA
        // runs within any one pass over the pipeline.
        sroa::run(&mut program);
        mem2reg::run(&mut program);
        reassociate::run(&mut program);

        let StmtKind::FnDecl(fn_decl) = &program.items[1].kind else { panic!() };
        let last = fn_decl.body.stmts.last().unwrap();
        let StmtKind::Return(Some(ret)) = &last.kind else { panic!("expected a return statement, got {:?}", last.kind) };
        assert_eq!(ret.kind, ExprKind::IntLiteral(7));
    }
}
