//! Benchmark: send/consume round-trip latency
//!
//! Measures one `send` answered by an attached consumer, sequentially and
//! with concurrent producers sharing one request id.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rendezvous_runtime::{Broker, HandlerError, RequestId};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn attach_echo(rt: &Runtime, broker: &Broker<u64, u64>, request_id: &RequestId) {
    let broker = broker.clone();
    let request_id = request_id.clone();
    rt.spawn(async move {
        broker
            .consume(&request_id, |n: u64| -> Result<u64, HandlerError> { Ok(n + 1) })
            .await
    });
}

fn bench_sequential(c: &mut Criterion) {
    let rt = runtime();
    let broker: Broker<u64, u64> = Broker::new();
    let request_id = RequestId::try_new("bench-seq").unwrap();
    attach_echo(&rt, &broker, &request_id);

    c.bench_function("send_roundtrip/sequential", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(broker.send(&request_id, black_box(41)).await.unwrap())
        });
    });
}

fn bench_concurrent(c: &mut Criterion) {
    let rt = runtime();
    let broker: Broker<u64, u64> = Broker::new();
    let request_id = RequestId::try_new("bench-fan-in").unwrap();
    attach_echo(&rt, &broker, &request_id);

    let mut group = c.benchmark_group("send_roundtrip/concurrent");
    for producers in [4u64, 16, 64] {
        group.throughput(Throughput::Elements(producers));
        group.bench_with_input(BenchmarkId::from_parameter(producers), &producers, |b, &n| {
            b.to_async(&rt).iter(|| async {
                let calls: Vec<_> = (0..n)
                    .map(|i| {
                        let broker = broker.clone();
                        let request_id = request_id.clone();
                        tokio::spawn(async move { broker.send(&request_id, i).await })
                    })
                    .collect();
                for call in calls {
                    black_box(call.await.unwrap().unwrap());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sequential, bench_concurrent);
criterion_main!(benches);
