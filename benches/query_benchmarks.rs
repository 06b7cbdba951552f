//! Query performance benchmarks: scan, seeded projection, and recursive
//! transitive closure at a few sizes, sequential vs. parallel.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ramalog::{
    solve, Boxed, Boxing, DenotationKind, IndexDescriptor, InitialFact, InitialFacts, PredicateMeta, Program,
    ProgramBuilder, RelSym,
};
use std::sync::Arc;

fn key(n: usize) -> Arc<[usize]> {
    Arc::from((0..n).collect::<Vec<usize>>())
}

fn chain_facts(size: u32) -> InitialFacts {
    let mut facts = InitialFacts::new();
    facts.insert(
        RelSym::new(0),
        (0..size)
            .map(|i| InitialFact::relational(vec![Boxed::int(i64::from(i)), Boxed::int(i64::from(i + 1))]))
            .collect(),
    );
    facts
}

/// `Path(x,z) :- Edge(x,z). Path(x,z) :- Path(x,y), Edge(y,z).` assembled by
/// hand via `ProgramBuilder`, matching the `spec.md` §8 transitive-closure
/// scenario at scale.
fn transitive_closure_program() -> Program {
    let mut b = ProgramBuilder::new();
    let edge_slot = b.alloc_slot();
    let path_full = b.alloc_slot();
    let path_delta = b.alloc_slot();
    let path_new = b.alloc_slot();

    let edge_sym = RelSym::new(0);
    let path_sym = RelSym::new(1);
    let pos_edge = |c: usize| ramalog::Position::new(edge_sym.0, c as u16);
    let pos_path = |c: usize| ramalog::Position::new(path_sym.0, c as u16);

    let edge_row = b.alloc_row(2);
    let seed_path = ProgramBuilder::search(
        edge_row,
        edge_slot,
        vec![],
        ProgramBuilder::project(
            vec![ProgramBuilder::load(edge_row, 0, pos_edge(0)), ProgramBuilder::load(edge_row, 1, pos_edge(1))],
            path_full,
        ),
    );

    let delta_row = b.alloc_row(2);
    let edge_row2 = b.alloc_row(2);
    let join_body = ProgramBuilder::search(
        delta_row,
        path_delta,
        vec![ProgramBuilder::write(1, edge_row2, 0)],
        ProgramBuilder::query(
            edge_row2,
            edge_slot,
            vec![],
            ProgramBuilder::project(
                vec![ProgramBuilder::load(delta_row, 0, pos_path(0)), ProgramBuilder::load(edge_row2, 1, pos_edge(1))],
                path_new,
            ),
        ),
    );

    let until_body = ProgramBuilder::seq(vec![
        ProgramBuilder::insert(join_body),
        ProgramBuilder::merge_into(path_new, path_full),
        ProgramBuilder::swap(path_delta, path_new),
        ProgramBuilder::purge(path_new),
    ]);

    let statement = ProgramBuilder::seq(vec![
        ProgramBuilder::insert(seed_path),
        ProgramBuilder::merge_into(path_full, path_delta),
        ProgramBuilder::until(vec![ProgramBuilder::is_empty(path_delta)], until_body, 0),
    ]);

    // Every Path column is a pure passthrough of an Edge column, so Path's
    // indexes rebox through Edge's boxing positions rather than their own.
    let path_columns = vec![pos_edge(0), pos_edge(1)];
    let path_descriptor = || IndexDescriptor {
        sym: path_sym,
        denotation: DenotationKind::Relational,
        arity: 2,
        search_key: key(2),
        lattice: None,
        column_positions: path_columns.clone(),
    };

    Program {
        statement,
        index_descriptors: vec![
            IndexDescriptor::own_columns(edge_sym, DenotationKind::Relational, 2, key(2), None),
            path_descriptor(),
            path_descriptor(),
            path_descriptor(),
        ],
        seed_slots: vec![(edge_sym, edge_slot)],
        result_slots: vec![(path_sym, path_full)],
        row_arities: b.row_arities().to_vec(),
    }
}

fn metas() -> Vec<PredicateMeta> {
    vec![
        PredicateMeta::new(RelSym::new(0), "edge", 2, DenotationKind::Relational, 0),
        PredicateMeta::new(RelSym::new(1), "path", 2, DenotationKind::Relational, 1),
    ]
}

fn bench_transitive_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive_closure");
    for size in [50u32, 200, 800] {
        for par_level in [0usize, 4] {
            let facts = chain_facts(size);
            let metas = metas();
            group.bench_with_input(BenchmarkId::new(format!("par{par_level}"), size), &size, |b, _| {
                b.iter(|| {
                    let boxing = Boxing::new();
                    let program = transitive_closure_program();
                    let result = solve(&program, &facts, &boxing, &metas, par_level, false).unwrap();
                    black_box(result);
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_transitive_closure);
criterion_main!(benches);
