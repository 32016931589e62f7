//! Benchmarks for path exploration.
//!
//! Measures the cost of the main loop on small branching programs:
//! - Exhaustive exploration of a bit-testing ladder (2^n paths)
//! - Finding one input byte behind a comparison
//! - Satisfiability checks with and without the result cache

extern crate symscope;

use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use symscope::{
    assembly::{AluOp, CmpOp, ProgramAssembler, Register},
    explore::{BreadthFirst, DepthFirst, ExplorationConfig, Explorer, StatePredicate},
    hook::HookTable,
    image::{BinaryImage, Program},
    solver::{Solver, SolverConfig},
    state::ConstraintSet,
    symbolic::{SymExpr, SymbolicOp},
};

/// Program testing bits `0..depth` of `r0` one after another.
fn ladder(depth: u32) -> Program {
    let mut asm = ProgramAssembler::new(0x1000);
    for bit in 0..depth {
        let skip = format!("skip_{bit}");
        asm.alu(AluOp::And, Register::R1, Register::R0, 1_u64 << bit)
            .branch(CmpOp::Ne, Register::R1, 0_u64, &skip)
            .nop();
        asm.label(&skip).unwrap();
    }
    asm.halt();
    asm.finish().unwrap()
}

/// Explores every path of the ladder.
fn bench_exhaustive_ladder(c: &mut Criterion) {
    let mut group = c.benchmark_group("exhaustive_ladder");
    for depth in [2_u32, 4, 6] {
        let program = Arc::new(ladder(depth));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                let config = ExplorationConfig::quick().with_max_found(usize::MAX);
                let mut explorer =
                    Explorer::new(program.clone(), HookTable::new(), config).unwrap();
                let mut state = explorer.entry_state();
                state.make_symbolic_register(Register::R0, "x").unwrap();
                explorer.add_state(state).unwrap();
                let result = explorer
                    .explore(&StatePredicate::Never, &StatePredicate::Never, &mut BreadthFirst)
                    .unwrap();
                black_box(result.deadended.len())
            });
        });
    }
    group.finish();
}

/// Finds the single input byte that reaches `success`.
fn bench_find_byte(c: &mut Criterion) {
    let mut asm = ProgramAssembler::new(0x1000);
    asm.load(Register::R1, 0x2000_u64, 0, 1)
        .branch(CmpOp::Eq, Register::R1, 0x41_u64, "success")
        .halt();
    asm.label("success").unwrap().halt();
    let program = asm.finish().unwrap();
    let success = program.symbol("success").unwrap();
    let program = Arc::new(program);

    c.bench_function("find_byte", |b| {
        b.iter(|| {
            let mut explorer =
                Explorer::new(program.clone(), HookTable::new(), ExplorationConfig::quick())
                    .unwrap();
            let mut state = explorer.entry_state();
            state.make_symbolic_memory(0x2000, 1, "input").unwrap();
            explorer.add_state(state).unwrap();
            let result = explorer
                .explore(
                    &StatePredicate::from(success),
                    &StatePredicate::Never,
                    &mut DepthFirst,
                )
                .unwrap();
            black_box(result.found.len())
        });
    });
}

/// Repeated satisfiability checks on one constraint set.
fn bench_solver_cache(c: &mut Criterion) {
    let x = SymExpr::variable("x", 32).unwrap();
    let mut constraints = ConstraintSet::new();
    constraints
        .push(SymExpr::binary(SymbolicOp::GtU, x.clone(), SymExpr::constant(10, 32).unwrap()).unwrap())
        .unwrap();
    constraints
        .push(SymExpr::binary(SymbolicOp::LtU, x, SymExpr::constant(20, 32).unwrap()).unwrap())
        .unwrap();

    let cached = Solver::new(SolverConfig::default());
    c.bench_function("sat_cached", |b| {
        b.iter(|| black_box(cached.is_satisfiable(black_box(&constraints)).unwrap()));
    });

    let uncached = Solver::new(SolverConfig::default().with_cache(false));
    c.bench_function("sat_uncached", |b| {
        b.iter(|| black_box(uncached.is_satisfiable(black_box(&constraints)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_exhaustive_ladder,
    bench_find_byte,
    bench_solver_cache
);
criterion_main!(benches);
