//! Criterion benchmarks for rowmap

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rowmap::prelude::*;
use rowmap::{default_conversions, RowMapper, StructuralMapper};

mapped_record! {
    #[derive(Debug, PartialEq)]
    pub struct Book {
        pub title: String,
        pub author: String,
        pub pages: Option<i64>,
    }
}

fn sample_row() -> Row {
    Row::of([
        ("title", Value::Text("Dune".into())),
        ("author", Value::Text("Frank Herbert".into())),
        ("pages", Value::Long(412)),
    ])
}

// ============================================================================
// Row Read Benchmarks
// ============================================================================

fn bench_row_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_reads");
    group.throughput(Throughput::Elements(1));
    let row = sample_row();

    group.bench_function("get_exact_kind", |b| {
        b.iter(|| {
            let title: String = row.get(black_box("title")).unwrap();
            black_box(title)
        });
    });

    group.bench_function("get_with_conversion", |b| {
        b.iter(|| {
            let pages: i32 = row.get(black_box("pages")).unwrap();
            black_box(pages)
        });
    });

    group.bench_function("get_opt_null", |b| {
        let row = Row::of([("pages", Value::Null)]);
        b.iter(|| {
            let pages: Option<i64> = row.get_opt(black_box("pages")).unwrap();
            black_box(pages)
        });
    });

    group.finish();
}

// ============================================================================
// Conversion Lookup Benchmarks
// ============================================================================

fn bench_conversions(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversions");
    group.throughput(Throughput::Elements(1));
    let conversions = default_conversions();

    group.bench_function("hit", |b| {
        let value = Value::Long(42);
        b.iter(|| black_box(conversions.convert::<i32>(black_box(&value))));
    });

    group.bench_function("miss", |b| {
        let value = Value::Text("42".into());
        b.iter(|| black_box(conversions.convert::<i64>(black_box(&value))));
    });

    group.finish();
}

// ============================================================================
// Mapping Benchmarks
// ============================================================================

fn bench_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("mapping");
    group.throughput(Throughput::Elements(1));
    let registry = MapperRegistry::new();
    let row = sample_row();

    group.bench_function("resolve_cached", |b| {
        // warm the cache, then measure steady-state resolution
        let _ = registry.resolve_row_mapper::<Book>().unwrap();
        b.iter(|| black_box(registry.resolve_row_mapper::<Book>().unwrap()));
    });

    group.bench_function("structural_map_row", |b| {
        let mapper = StructuralMapper::new(Book::descriptor().unwrap());
        b.iter(|| {
            let book = mapper.map_row(black_box(&row), &registry).unwrap();
            black_box(book)
        });
    });

    group.bench_function("resolve_and_map", |b| {
        b.iter(|| {
            let book: Book = registry.map_row(black_box(&row)).unwrap();
            black_box(book)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_row_reads, bench_conversions, bench_mapping);
criterion_main!(benches);
