//! Shape transition and lookup benchmarks
//!
//! Compares transition reuse against fresh transitions and layout lookup
//! against dictionary lookup.

use criterion::{Criterion, criterion_group, criterion_main};
use otter_vm_shape::{ObjectKind, PropertyAttributes, PropertyKey, ShapeStore};
use std::hint::black_box;

fn keys(count: usize) -> Vec<PropertyKey> {
    (0..count)
        .map(|i| PropertyKey::string(&format!("prop{i}")))
        .collect()
}

/// Benchmark: walking an existing transition chain vs building it
fn bench_transitions(c: &mut Criterion) {
    let keys = keys(20);

    c.bench_function("transition_reuse_20_props", |b| {
        let mut store = ShapeStore::new();
        let root = store.create_root(ObjectKind::Plain, 48, 4);
        let mut shape = root;
        for key in &keys {
            shape = store.add_property(shape, key.clone(), PropertyAttributes::data());
        }
        b.iter(|| {
            let mut shape = root;
            for key in &keys {
                shape = store.add_property(shape, key.clone(), PropertyAttributes::data());
            }
            black_box(shape)
        });
    });

    c.bench_function("transition_create_20_props", |b| {
        b.iter(|| {
            let mut store = ShapeStore::new();
            let mut shape = store.create_root(ObjectKind::Plain, 48, 4);
            for key in &keys {
                shape = store.add_property(shape, key.clone(), PropertyAttributes::data());
            }
            black_box(shape)
        });
    });
}

/// Benchmark: fast layout lookup vs dictionary table lookup
fn bench_lookup(c: &mut Criterion) {
    let keys = keys(50);
    let mut store = ShapeStore::new();
    let mut shape = store.create_root(ObjectKind::Plain, 48, 4);
    for key in &keys {
        shape = store.add_property(shape, key.clone(), PropertyAttributes::data());
    }
    let dictionary = store.transition_to_dictionary(shape);

    c.bench_function("layout_lookup_50_props", |b| {
        b.iter(|| {
            let mut sum = 0u32;
            for key in &keys {
                if let Some(entry) = store.find_property(shape, key) {
                    sum += entry.offset;
                }
            }
            black_box(sum)
        });
    });

    c.bench_function("dictionary_lookup_50_props", |b| {
        b.iter(|| {
            let mut sum = 0u32;
            for key in &keys {
                if let Some(entry) = store.find_dictionary_property(dictionary, key) {
                    sum += entry.offset;
                }
            }
            black_box(sum)
        });
    });
}

criterion_group!(benches, bench_transitions, bench_lookup);
criterion_main!(benches);
