//! Benchmark: crawl throughput over synthetic heaps.
//!
//! Measures a full crawl of linked lists, wide reference arrays and arrays
//! of structs, which exercise the plain traversal, array expansion and
//! value-type aliasing paths.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use heap_crawler::{
    CrawlProgress, CrawlerConfig, FieldDescription, Snapshot, SnapshotBuilder, TypeDescription,
};
use snapshot_memory::VirtualMachineInformation;
use std::hint::black_box;

const BASE: u64 = 0x10_0000;
const OBJECT: usize = 0;
const POINTER: usize = 1;
const ENGINE: usize = 2;
const NODE: usize = 3;
const OBJECT_ARRAY: usize = 4;
const ENTRY: usize = 5;
const ENTRY_ARRAY: usize = 6;

fn class_word(index: usize) -> u64 {
    0x7000_0000 + index as u64 * 0x100
}

fn builder() -> SnapshotBuilder {
    let mut builder = SnapshotBuilder::new(VirtualMachineInformation::mono_64bit());
    let types = [
        TypeDescription::class("System.Object", 16),
        TypeDescription::value_type("System.IntPtr", 8),
        TypeDescription::class("UnityEngine.Object", 24)
            .with_base(OBJECT)
            .with_field(FieldDescription::instance("m_CachedPtr", 16, POINTER)),
        TypeDescription::class("Node", 24)
            .with_base(OBJECT)
            .with_field(FieldDescription::instance("next", 16, OBJECT)),
        TypeDescription::array("System.Object[]", OBJECT, 8),
        TypeDescription::value_type("Entry", 16)
            .with_field(FieldDescription::instance("value", 16, OBJECT))
            .with_field(FieldDescription::instance("hash", 24, POINTER)),
        TypeDescription::array("Entry[]", ENTRY, 16),
    ];
    for (index, ty) in types.into_iter().enumerate() {
        builder.add_type(ty.with_type_info_address(class_word(index)));
    }
    builder.engine_object_type(ENGINE);
    builder
}

fn put(memory: &mut [u8], address: u64, value: u64) {
    let at = usize::try_from(address - BASE).unwrap_or(usize::MAX);
    memory[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// `count` nodes, each pointing at the next.
fn linked_list(count: u64) -> Snapshot {
    let mut builder = builder();
    let mut memory = vec![0u8; usize::try_from(count * 24).unwrap_or(0)];
    for i in 0..count {
        let address = BASE + i * 24;
        put(&mut memory, address, class_word(NODE));
        if i + 1 < count {
            put(&mut memory, address + 16, address + 24);
        }
    }
    builder.add_segment(BASE, memory);
    builder.add_gc_handle(BASE);
    builder.build().unwrap()
}

/// One `object[]` of `count` distinct nodes.
fn wide_array(count: u64) -> Snapshot {
    let mut builder = builder();
    let nodes = BASE + 32 + count * 8;
    let mut memory = vec![0u8; usize::try_from(32 + count * (8 + 24)).unwrap_or(0)];
    put(&mut memory, BASE, class_word(OBJECT_ARRAY));
    put(&mut memory, BASE + 24, count);
    for i in 0..count {
        let node = nodes + i * 24;
        put(&mut memory, BASE + 32 + i * 8, node);
        put(&mut memory, node, class_word(NODE));
    }
    builder.add_segment(BASE, memory);
    builder.add_gc_handle(BASE);
    builder.build().unwrap()
}

/// One `Entry[]` of `count` structs sharing a single target.
fn struct_array(count: u64) -> Snapshot {
    let mut builder = builder();
    let target = BASE + 32 + count * 16;
    let mut memory = vec![0u8; usize::try_from(32 + count * 16 + 24).unwrap_or(0)];
    put(&mut memory, BASE, class_word(ENTRY_ARRAY));
    put(&mut memory, BASE + 24, count);
    for i in 0..count {
        put(&mut memory, BASE + 32 + i * 16, target);
    }
    put(&mut memory, target, class_word(NODE));
    builder.add_segment(BASE, memory);
    builder.add_gc_handle(BASE);
    builder.build().unwrap()
}

fn bench_shapes(c: &mut Criterion) {
    let config = CrawlerConfig::default();
    let shapes: [(&str, fn(u64) -> Snapshot); 3] = [
        ("linked_list", linked_list),
        ("wide_array", wide_array),
        ("struct_array", struct_array),
    ];

    for (name, make) in shapes {
        let mut group = c.benchmark_group(name);
        for count in [1_000u64, 10_000, 100_000] {
            let mut snapshot = make(count);
            group.throughput(Throughput::Elements(count));
            group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
                b.iter(|| {
                    let summary = snapshot
                        .crawl(&[], &config, &CrawlProgress::new())
                        .unwrap();
                    black_box(summary.metrics.objects)
                });
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_shapes);
criterion_main!(benches);
