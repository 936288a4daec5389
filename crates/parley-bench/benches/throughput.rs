//! Throughput benchmarks for the Parley engine.
//!
//! These benchmarks measure how fast the delivery engine stamps, stores and
//! fans out messages.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parley_core::DeliveryEngine;
use parley_protocol::{ClientEvent, PrivateMessageRequest, RoomMessageRequest};

/// Benchmark global chat messages of growing size.
fn bench_global(c: &mut Criterion) {
    let mut group = c.benchmark_group("global_message");

    for size in [64usize, 1024, 65536] {
        let text = "x".repeat(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            let mut engine = DeliveryEngine::new();
            engine.handle("conn-0", ClientEvent::Register("bench".into()));
            b.iter(|| engine.handle("conn-0", black_box(ClientEvent::ChatMessage(text.clone()))));
        });
    }

    group.finish();
}

/// Benchmark private messages between a fixed pair.
fn bench_private(c: &mut Criterion) {
    let mut group = c.benchmark_group("private_message");

    group.bench_function("64B", |b| {
        let mut engine = DeliveryEngine::new();
        let request = PrivateMessageRequest {
            to: "conn-2".into(),
            message: "x".repeat(64),
        };
        b.iter(|| {
            engine.handle(
                "conn-1",
                black_box(ClientEvent::PrivateMessage(request.clone())),
            )
        });
    });

    group.finish();
}

/// Benchmark room fan-out: unread bookkeeping for every member.
fn bench_room_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("room_fanout");

    for members in [10usize, 100, 1000, 10000] {
        group.throughput(Throughput::Elements(members as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(members),
            &members,
            |b, &members| {
                let mut engine = DeliveryEngine::new();
                for i in 0..members {
                    engine.handle(&format!("conn-{i}"), ClientEvent::JoinRoom("bench".into()));
                }
                let request = RoomMessageRequest {
                    room: "bench".into(),
                    message: "x".repeat(64),
                };

                b.iter(|| {
                    engine.handle(
                        "conn-0",
                        black_box(ClientEvent::RoomMessage(request.clone())),
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_global, bench_private, bench_room_fanout);
criterion_main!(benches);
