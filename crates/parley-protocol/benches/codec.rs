//! Codec benchmarks for parley-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parley_protocol::{
    codec, ClientEvent, ClientFrame, HistoryQuery, RoomBroadcast, ScopeSelector, ServerEvent,
};

fn room_broadcast(size: usize) -> ServerEvent {
    ServerEvent::RoomMessage(RoomBroadcast {
        username: "alice".into(),
        message: "x".repeat(size),
        timestamp: "2024-01-01T00:00:00.000Z".into(),
        room: "lobby".into(),
        user_id: "conn_1".into(),
        message_id: "conn_1_1704067200000-1".into(),
    })
}

fn bench_encode(c: &mut Criterion) {
    let event = room_broadcast(64);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("binary_64B", |b| b.iter(|| codec::encode(black_box(&event))));
    group.bench_function("text_64B", |b| {
        b.iter(|| codec::encode_text(black_box(&event)))
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let frame = ClientFrame::with_ack(
        1,
        ClientEvent::GetMessages(HistoryQuery {
            scope: ScopeSelector::room("lobby"),
            page: 1,
            page_size: Some(20),
        }),
    );
    let encoded = codec::encode(&frame).unwrap();
    let text = codec::encode_text(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("binary_get_messages", |b| {
        b.iter(|| codec::decode::<ClientFrame>(black_box(&encoded)))
    });
    group.bench_function("text_get_messages", |b| {
        b.iter(|| codec::decode_text::<ClientFrame>(black_box(&text)))
    });
    group.finish();
}

fn bench_roundtrip(c: &mut Criterion) {
    let event = room_broadcast(256);

    c.bench_function("roundtrip_256B", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&event)).unwrap();
            codec::decode::<ServerEvent>(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_roundtrip);
criterion_main!(benches);
