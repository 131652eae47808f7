// ABOUTME: Benchmark suite for dpx wire codec and queue performance
// ABOUTME: Measures frame encode/decode and bounded queue throughput under various payload sizes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dpx::codec;
use dpx::frame::Frame;
use std::time::Duration;

fn sample_data_frame(payload_len: usize) -> Frame {
    let mut frame = Frame::data().with_payload(vec![b'A'; payload_len]);
    frame.channel = 7;
    frame.header_add("content-type", "application/octet-stream");
    frame
}

fn sample_open_frame() -> Frame {
    let mut frame = Frame::open("echo");
    frame.channel = 3;
    frame
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.measurement_time(Duration::from_secs(5));

    let open_frame = sample_open_frame();
    group.bench_function("open_frame", |b| {
        b.iter(|| codec::encode(black_box(&open_frame)))
    });

    let data_frame = sample_data_frame(64);
    group.bench_function("data_frame_64b", |b| {
        b.iter(|| codec::encode(black_box(&data_frame)))
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.measurement_time(Duration::from_secs(5));

    let open_bytes = codec::encode(&sample_open_frame());
    group.bench_function("open_frame", |b| {
        b.iter(|| codec::try_decode(black_box(&open_bytes)).unwrap())
    });

    let data_bytes = codec::encode(&sample_data_frame(64));
    group.bench_function("data_frame_64b", |b| {
        b.iter(|| codec::try_decode(black_box(&data_bytes)).unwrap())
    });

    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("data_frame_64b", |b| {
        b.iter(|| {
            let frame = sample_data_frame(black_box(64));
            let bytes = codec::encode(&frame);
            codec::try_decode(black_box(&bytes)).unwrap()
        })
    });

    group.finish();
}

fn bench_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload_sizes");
    group.measurement_time(Duration::from_secs(5));

    let sizes = [16, 256, 4096, 65536];
    for &size in &sizes {
        let frame = sample_data_frame(size);
        let bytes = codec::encode(&frame);

        group.bench_with_input(BenchmarkId::new("encode", size), &frame, |b, frame| {
            b.iter(|| codec::encode(black_box(frame)))
        });

        group.bench_with_input(BenchmarkId::new("decode", size), &bytes, |b, bytes| {
            b.iter(|| codec::try_decode(black_box(bytes)).unwrap())
        });
    }

    group.finish();
}

fn bench_queue_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");
    group.measurement_time(Duration::from_secs(5));

    let rt = tokio::runtime::Runtime::new().unwrap();

    group.bench_function("send_recv_depth_1024", |b| {
        b.iter(|| {
            rt.block_on(async {
                let q = dpx::queue::BoundedQueue::new(1024);
                for i in 0..100 {
                    q.send(black_box(i)).await.unwrap();
                }
                for _ in 0..100 {
                    black_box(q.recv().await);
                }
            })
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_roundtrip,
    bench_payload_sizes,
    bench_queue_throughput
);
criterion_main!(benches);
