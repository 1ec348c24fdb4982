//! Performance benchmarks for record-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use record_engine::{path, Message, Mutation, RecordData};
use serde_json::{json, Value};

/// A record with `size` entries, each a small nested object.
fn large_tree(size: usize) -> Value {
    let users: serde_json::Map<String, Value> = (0..size)
        .map(|i| {
            (
                format!("user_{}", i),
                json!({"name": "Test User", "age": i, "tags": ["a", "b", "c"]}),
            )
        })
        .collect();
    json!({ "users": users })
}

fn bench_record_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_apply");

    for size in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("patch", size), &size, |b, &size| {
            let mut record = RecordData::default();
            record.load(1, large_tree(size));
            let mutation = Mutation::Patch {
                path: format!("users.user_{}.tags[1]", size / 2),
                data: json!("patched"),
            };

            b.iter(|| record.apply(black_box(&mutation)))
        });

        group.bench_with_input(BenchmarkId::new("update", size), &size, |b, &size| {
            let mut record = RecordData::default();
            record.load(1, json!({}));
            let mutation = Mutation::Update {
                data: large_tree(size),
            };

            b.iter(|| record.apply(black_box(&mutation)))
        });

        group.bench_with_input(BenchmarkId::new("snapshot", size), &size, |b, &size| {
            let mut record = RecordData::default();
            record.load(1, large_tree(size));

            b.iter(|| black_box(record.snapshot()))
        });
    }

    group.finish();
}

fn bench_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("paths");

    group.bench_function("parse", |b| {
        b.iter(|| path::parse(black_box("users.user_500.tags[2].label")))
    });

    group.bench_function("set_creates_containers", |b| {
        b.iter(|| {
            let mut root = json!({});
            path::set(&mut root, black_box("a.b[3].c.d[1]"), json!(1))
        })
    });

    let tree = large_tree(1000);
    group.bench_function("get_deep", |b| {
        b.iter(|| path::get(&tree, black_box("users.user_999.tags[2]")))
    });

    group.finish();
}

fn bench_messages(c: &mut Criterion) {
    let mut group = c.benchmark_group("messages");

    let message = Message::read_response("recordA", 42, large_tree(100));
    let encoded = serde_json::to_string(&message).unwrap_or_default();

    group.bench_function("encode_read_response", |b| {
        b.iter(|| serde_json::to_string(black_box(&message)))
    });

    group.bench_function("decode_read_response", |b| {
        b.iter(|| serde_json::from_str::<Message>(black_box(&encoded)))
    });

    group.finish();
}

criterion_group!(benches, bench_record_apply, bench_paths, bench_messages);
criterion_main!(benches);
