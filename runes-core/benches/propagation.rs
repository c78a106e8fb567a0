//! Propagation benchmarks
//!
//! Measures one write followed by a flush across a few graph shapes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use runes_core::reactive::{Derived, Graph, State};

// =============================================================================
// Graph Shapes
// =============================================================================

/// A state cell feeding a chain of `depth` derived cells.
fn chain(depth: usize) -> (Graph, State<u64>, Derived<u64>) {
    let graph = Graph::new();
    let source = graph.state(0_u64);
    let mut last = graph.derived({
        let source = source.clone();
        move || source.get() + 1
    });
    for _ in 1..depth {
        let previous = last.clone();
        last = graph.derived(move || previous.get() + 1);
    }
    (graph, source, last)
}

/// A state cell read by `width` independent derived cells.
fn fan_out(width: usize) -> (Graph, State<u64>) {
    let graph = Graph::new();
    let source = graph.state(0_u64);
    for i in 0..width as u64 {
        let source = source.clone();
        let _ = graph.derived(move || source.get() * i);
    }
    (graph, source)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");
    for depth in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let (graph, source, last) = chain(depth);
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(n);
                graph.flush().unwrap();
                black_box(last.get())
            });
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let (graph, source) = fan_out(width);
            let mut n = 0;
            b.iter(|| {
                n += 1;
                source.set(n);
                black_box(graph.flush().unwrap())
            });
        });
    }
    group.finish();
}

fn bench_equal_write(c: &mut Criterion) {
    c.bench_function("equal_write", |b| {
        let (graph, source) = fan_out(100);
        source.set(7);
        graph.flush().unwrap();
        b.iter(|| {
            source.set(black_box(7));
            black_box(graph.has_pending_wave())
        });
    });
}

criterion_group!(benches, bench_chain, bench_fan_out, bench_equal_write);
criterion_main!(benches);
