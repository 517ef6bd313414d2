//! Performance benchmarks for projection and range loading
//!
//! Measures, on trees of about 500k rows:
//! - Initializing an engine from inline nodes (index plus projection build)
//! - Random row access through the snapshot
//! - Expand/collapse of one parent (projection rebuild)
//! - Viewport changes over a paged parent with 500k placeholder slots
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use sylva_core::{
    config::TreeConfig,
    engine::TreeEngine,
    event::{RootInit, TreeEvent},
    node::{NodeId, NodeInput},
};

const FOLDERS: usize = 500;
const FILES: usize = 1_000;

fn wide_tree() -> Vec<NodeInput> {
    (0..FOLDERS)
        .map(|i| {
            let files = (0..FILES)
                .map(|j| NodeInput::leaf(format!("f{i}/{j}"), format!("File {i}.{j}")))
                .collect();
            NodeInput::new(format!("f{i}"), format!("Folder {i}"))
                .with_children(files)
                .expanded()
        })
        .collect()
}

fn loaded_engine() -> TreeEngine {
    let mut engine = TreeEngine::new(TreeConfig::default()).unwrap();
    engine.dispatch(TreeEvent::Init {
        roots: RootInit::Static(wide_tree()),
    });
    engine
}

// Benchmark: full INIT of a 500k-row static tree
fn bench_init_static(c: &mut Criterion) {
    let mut group = c.benchmark_group("init");
    group.sample_size(10);
    group.bench_function("init_static_500k", |b| {
        b.iter_batched(
            wide_tree,
            |roots| {
                let mut engine = TreeEngine::new(TreeConfig::default()).unwrap();
                engine.dispatch(TreeEvent::Init {
                    roots: RootInit::Static(roots),
                });
                engine.snapshot().total_count()
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

// Benchmark: 1000 scattered row lookups
fn bench_row_access(c: &mut Criterion) {
    let engine = loaded_engine();
    let snapshot = engine.snapshot();
    let total = snapshot.total_count();
    c.bench_function("row_at_scattered_1000", |b| {
        b.iter(|| {
            let mut depth = 0;
            for k in 0..1_000usize {
                let index = k.wrapping_mul(7_919) % total;
                if let Some(row) = snapshot.row_at(black_box(index)) {
                    depth += row.depth;
                }
            }
            depth
        });
    });
    c.bench_function("index_of_last_row", |b| {
        let target = NodeId::new(format!("f{}/{}", FOLDERS - 1, FILES - 1));
        b.iter(|| snapshot.index_of(black_box(&target)));
    });
}

// Benchmark: toggling one parent in a 500k-row tree
fn bench_toggle(c: &mut Criterion) {
    let mut engine = loaded_engine();
    let mut group = c.benchmark_group("toggle");
    group.sample_size(20);
    group.bench_function("toggle_expand_500k", |b| {
        b.iter(|| {
            engine.dispatch(TreeEvent::ToggleExpand {
                node_id: "f250".into(),
            })
        });
    });
    group.finish();
}

// Benchmark: viewport sweep over one paged parent with 500k slots
fn bench_viewport_paged(c: &mut Criterion) {
    c.bench_function("viewport_sweep_paged_500k", |b| {
        b.iter_batched(
            || {
                let mut engine = TreeEngine::new(TreeConfig::default().page_aware(50)).unwrap();
                engine.dispatch(TreeEvent::Init {
                    roots: RootInit::Static(vec![NodeInput::new("big", "Big")
                        .with_total_children(500_000)
                        .expanded()]),
                });
                engine
            },
            |mut engine| {
                let mut requested = 0;
                for step in 0..100usize {
                    let start = step * 4_999;
                    requested += engine
                        .dispatch(TreeEvent::ViewportRangeChanged {
                            start,
                            end: start + 60,
                            overscan: 20,
                        })
                        .len();
                }
                requested
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_init_static,
    bench_row_access,
    bench_toggle,
    bench_viewport_paged
);
criterion_main!(benches);
