use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeMap;
use tokenstream::{from_slice, to_vec, token_map, MemoryWriter, Reader};

#[derive(Debug, Default, Clone, PartialEq)]
struct Sample {
    id: u32,
    name: String,
    score: f64,
    active: bool,
}

token_map!(Sample {
    0 => id,
    1 => name,
    2 => score,
    3 => active,
});

#[derive(Debug, Default, Clone, PartialEq)]
struct Batch {
    revision: u64,
    labels: BTreeMap<String, String>,
    samples: Vec<Sample>,
}

token_map!(Batch {
    0 => revision,
    1 => labels,
    2 => samples,
});

fn make_batch(size: usize) -> Batch {
    let mut batch = Batch {
        revision: 42,
        ..Batch::default()
    };
    batch
        .labels
        .insert("source".to_string(), "bench".to_string());
    batch.samples = (0..size)
        .map(|i| Sample {
            id: i as u32,
            name: format!("sample-{i}"),
            score: i as f64 * 0.25,
            active: i % 2 == 0,
        })
        .collect();
    batch
}

fn benchmark_encode_record(c: &mut Criterion) {
    let sample = Sample {
        id: 123,
        name: "alpha".to_string(),
        score: 9.75,
        active: true,
    };
    c.bench_function("encode_flat_record", |b| {
        b.iter(|| to_vec(black_box(&sample)))
    });
}

fn benchmark_decode_record(c: &mut Criterion) {
    let sample = Sample {
        id: 123,
        name: "alpha".to_string(),
        score: 9.75,
        active: true,
    };
    let bytes = to_vec(&sample).unwrap();
    c.bench_function("decode_flat_record", |b| {
        b.iter(|| from_slice::<Sample>(black_box(&bytes)))
    });
}

fn benchmark_encode_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_batch");
    for size in [10usize, 100, 1000] {
        let batch = make_batch(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| to_vec(black_box(batch)));
        });
    }
    group.finish();
}

fn benchmark_decode_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_batch");
    for size in [10usize, 100, 1000] {
        let bytes = to_vec(&make_batch(size)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| from_slice::<Batch>(black_box(bytes)));
        });
    }
    group.finish();
}

fn benchmark_scalar_chunks(c: &mut Criterion) {
    c.bench_function("encode_scalar_chunks", |b| {
        b.iter(|| {
            let mut writer = MemoryWriter::new();
            for token in 0u64..64 {
                writer.put(token, &black_box(0x1234_5678_9abcu64));
            }
            writer.into_bytes()
        })
    });

    let mut writer = MemoryWriter::new();
    for token in 0u64..64 {
        writer.put(token, &0x1234_5678_9abcu64);
    }
    let bytes = writer.into_bytes().unwrap();
    c.bench_function("decode_scalar_chunks", |b| {
        b.iter(|| {
            let mut reader = Reader::new(black_box(&bytes));
            let mut total = 0u64;
            while !reader.eos() {
                reader.token();
                total = total.wrapping_add(reader.get::<u64>());
            }
            total
        })
    });
}

criterion_group!(
    benches,
    benchmark_encode_record,
    benchmark_decode_record,
    benchmark_encode_batches,
    benchmark_decode_batches,
    benchmark_scalar_chunks
);
criterion_main!(benches);
