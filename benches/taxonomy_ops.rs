//! Benchmarks for taxonomy traversal and subtree expansion.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ontoclass::taxonomy::expand::SubtreeExpander;
use ontoclass::taxonomy::graph::TaxonomyGraph;
use ontoclass::taxonomy::{OClass, SubclassEdge, TaxonomySnapshot};

/// `roots` roots, each a complete tree of the given fan-out and depth.
fn generated_snapshot(roots: usize, fan_out: usize, depth: usize) -> TaxonomySnapshot {
    let mut classes = Vec::new();
    let mut edges = Vec::new();
    for r in 0..roots {
        let root = format!("R{r}");
        classes.push(OClass::new(root.clone()).root());
        let mut frontier = vec![root];
        for _ in 0..depth {
            let mut next = Vec::with_capacity(frontier.len() * fan_out);
            for parent in &frontier {
                for i in 0..fan_out {
                    let child = format!("{parent}.{i}");
                    classes.push(OClass::new(child.clone()));
                    edges.push(SubclassEdge::new(parent.clone(), child.clone()));
                    next.push(child);
                }
            }
            frontier = next;
        }
    }
    TaxonomySnapshot::new(classes, edges)
}

fn bench_graph_build(c: &mut Criterion) {
    let snapshot = generated_snapshot(8, 6, 4);
    c.bench_function("graph_build_8x6^4", |bench| {
        bench.iter(|| black_box(TaxonomyGraph::new(&snapshot)))
    });
}

fn bench_leaves_of(c: &mut Criterion) {
    let snapshot = generated_snapshot(8, 6, 4);
    let graph = TaxonomyGraph::new(&snapshot);
    c.bench_function("leaves_of_deep_root", |bench| {
        bench.iter(|| black_box(graph.leaves_of("R0")))
    });
}

fn bench_expansion_capped(c: &mut Criterion) {
    let snapshot = generated_snapshot(8, 6, 4);
    let graph = TaxonomyGraph::new(&snapshot);
    c.bench_function("expand_all_roots_cap_200", |bench| {
        bench.iter(|| {
            let mut expander = SubtreeExpander::new(&graph, 200);
            for r in 0..8 {
                black_box(expander.expand(&format!("R{r}")));
            }
            black_box(expander.into_subtrees())
        })
    });
}

criterion_group!(
    benches,
    bench_graph_build,
    bench_leaves_of,
    bench_expansion_capped
);
criterion_main!(benches);
