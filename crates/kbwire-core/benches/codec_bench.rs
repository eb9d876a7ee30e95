//! # Codec Benchmarks
//!
//! Performance benchmarks for template and construction encoding.
//!
//! Run with: `cargo bench -p kbwire-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use kbwire_core::{Addr, Construction, ElementType, Template, TemplateItem};
use serde_json::json;
use std::hint::black_box;

/// Template with N star-shaped triples around one host, every edge aliased.
fn create_star_template(size: usize) -> Template {
    let mut template = Template::new();
    for i in 0..size {
        let edge = TemplateItem::named(ElementType::ARC_POS_VAR_PERM, format!("_e{i}"))
            .expect("alias");
        let item = TemplateItem::named(ElementType::NODE_VAR, format!("_n{i}")).expect("alias");
        template.triple(Addr(1), edge, item).expect("triple");
    }
    template
}

/// Construction of N nodes chained by edges that reference them by alias.
fn create_chain_construction(size: usize) -> Construction {
    let mut c = Construction::new();
    for i in 0..size {
        let alias = format!("n{i}");
        c.add_node(ElementType::NODE_CONST, Some(alias.as_str())).expect("node");
        if i > 0 {
            let prev = format!("n{}", i - 1);
            c.add_edge(ElementType::ARC_POS_CONST_PERM, prev, alias, None)
                .expect("edge");
        }
    }
    c
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_template_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("template_encode");

    for size in [10, 100, 1000].iter() {
        let template = create_star_template(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(template.encode()));
        });
    }

    group.finish();
}

fn bench_search_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_decode");
    let template = create_star_template(4);

    for matches in [10, 100, 1000].iter() {
        let addrs: Vec<Vec<u64>> = (0..*matches as u64)
            .map(|m| (0..12).map(|k| m * 100 + k + 1).collect())
            .collect();
        let reply = json!({"addrs": addrs});
        group.bench_with_input(BenchmarkId::from_parameter(matches), matches, |b, _| {
            b.iter(|| black_box(template.decode_search(&reply)));
        });
    }

    group.finish();
}

fn bench_construction_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction_encode");

    for size in [10, 100, 1000].iter() {
        let construction = create_chain_construction(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(construction.encode()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_template_encode,
    bench_search_decode,
    bench_construction_encode,
);

criterion_main!(benches);
