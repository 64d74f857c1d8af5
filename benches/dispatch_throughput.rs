//! Command dispatch and event fan-out throughput benchmark.
//!
//! Measures dispatch → handler → result latency, channel publish cost per
//! subscriber count, and broadcast translation using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use p2p_bridge::channels::{ChannelEvent, EventCategory, EventChannelPool};
use p2p_bridge::dispatch::{Command, CommandDispatcher, HandlerRegistry, ResultSink};
use p2p_bridge::events::translate_broadcast;
use p2p_bridge::platform::{NativeAction, RawBroadcast};
use p2p_bridge::types::{DeviceAddress, PeerDevice};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct NoopContext;

async fn ack(_ctx: Arc<NoopContext>, _command: Command, sink: ResultSink) -> p2p_bridge::Result<()> {
    sink.success(true);
    Ok(())
}

fn registry() -> HandlerRegistry<NoopContext> {
    let mut table: HandlerRegistry<NoopContext> = HashMap::new();
    table.insert("ack", |c, m, s| Box::pin(ack(c, m, s)));
    table
}

fn peers(count: usize) -> Vec<PeerDevice> {
    (0..count)
        .map(|i| {
            let address = DeviceAddress::from_string(format!("02:00:00:00:{:02x}:{:02x}", i / 256, i % 256))
                .unwrap();
            PeerDevice::new(address)
        })
        .collect()
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let dispatcher = CommandDispatcher::new(Arc::new(NoopContext), rt.handle().clone(), registry);

    let mut group = c.benchmark_group("dispatch");
    group.bench_function("known_command", |b| {
        b.iter(|| rt.block_on(dispatcher.call(black_box(Command::new("ack")))));
    });
    group.bench_function("unknown_command", |b| {
        b.iter(|| rt.block_on(dispatcher.call(black_box(Command::new("missing")))));
    });
    group.finish();
}

fn bench_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let subscriber_counts: &[usize] = &[0, 1, 4, 16];

    let mut group = c.benchmark_group("publish");
    for &count in subscriber_counts {
        let pool = EventChannelPool::new();
        let (sink, mut streams) = rt.block_on(async {
            pool.register_all().await;
            let mut streams = Vec::with_capacity(count);
            for _ in 0..count {
                streams.push(pool.subscribe(EventCategory::PeersChanged).await.unwrap());
            }
            (pool.sink(EventCategory::PeersChanged).await.unwrap(), streams)
        });
        let payload = ChannelEvent::PeersChanged(peers(8));

        group.bench_with_input(BenchmarkId::from_parameter(count), &payload, |b, p| {
            b.iter(|| {
                let delivered = rt.block_on(sink.publish(black_box(p.clone()))).unwrap();
                // Drain so queues stay empty between iterations
                for stream in streams.iter_mut() {
                    stream.try_recv();
                }
                delivered
            });
        });
    }
    group.finish();
}

fn bench_translate(c: &mut Criterion) {
    let peer_counts: &[usize] = &[1, 32, 256];

    let mut group = c.benchmark_group("translate_peers");
    for &count in peer_counts {
        let raw = RawBroadcast::new(
            NativeAction::PeersChanged,
            serde_json::json!({ "wifiP2pDeviceList": peers(count) }),
        );
        group.bench_with_input(BenchmarkId::from_parameter(count), &raw, |b, r| {
            b.iter(|| translate_broadcast(black_box(r)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_publish, bench_translate);
criterion_main!(benches);
