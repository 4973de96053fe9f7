use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ember_session::protocol::{RoomEvent, ServerEvent};
use ember_session::transcript::Transcript;

fn live_message(id: u64) -> ServerEvent {
    ServerEvent::Message {
        id: format!("msg_{id}"),
        username: "BraveFox".to_string(),
        contents: "a typical short chat line".to_string(),
        timestamp: Utc.timestamp_millis_opt(id as i64 * 250).unwrap(),
    }
}

fn bench_ingest_unique_messages(c: &mut Criterion) {
    c.bench_function("ingest_1k_unique_messages", |b| {
        b.iter(|| {
            let mut transcript = Transcript::new();
            for i in 0..1_000u64 {
                transcript.ingest(black_box(live_message(i)));
            }
            black_box(transcript.len());
        })
    });
}

fn bench_ingest_duplicate_scan(c: &mut Criterion) {
    // Worst case for the dedup scan: the log already holds a session's
    // worth of messages and every new frame is a replay of the first.
    c.bench_function("ingest_duplicate_into_1k_log", |b| {
        let mut transcript = Transcript::new();
        for i in 0..1_000u64 {
            transcript.ingest(live_message(i));
        }
        b.iter(|| {
            black_box(transcript.ingest(black_box(live_message(0))));
        })
    });
}

fn bench_decode_frame(c: &mut Criterion) {
    let raw = live_message(42).encode().unwrap();
    c.bench_function("decode_message_frame", |b| {
        b.iter(|| {
            black_box(ServerEvent::decode(black_box(&raw)).unwrap());
        })
    });
}

fn bench_snapshot_replace(c: &mut Criterion) {
    let replay: Vec<RoomEvent> = (0..500u64)
        .map(|i| RoomEvent::Message {
            id: format!("msg_{i}"),
            username: "BraveFox".to_string(),
            contents: "a typical short chat line".to_string(),
            timestamp: Utc.timestamp_millis_opt(i as i64 * 250).unwrap(),
        })
        .collect();

    c.bench_function("snapshot_replace_500", |b| {
        b.iter(|| {
            let mut transcript = Transcript::new();
            transcript.ingest(black_box(ServerEvent::MessageHistory {
                username: "fox42".to_string(),
                messages: replay.clone(),
            }));
            black_box(transcript.len());
        })
    });
}

criterion_group!(
    benches,
    bench_ingest_unique_messages,
    bench_ingest_duplicate_scan,
    bench_decode_frame,
    bench_snapshot_replace
);
criterion_main!(benches);
