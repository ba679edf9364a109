//! # Transaction Layer Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | State transition | < 1µs |
//! | Transactional tagging of a send | < 1µs |
//! | Commit round trip against the in-memory peer | < 1ms |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quay_tests::TestPeer;
use quay_transactions::{transition, TransactedSession, TransactionConfig, TransferTagger, TxnEvent, TxnState};
use shared_types::entities::{DeliveryId, LinkHandle};
use shared_types::frames::Transfer;

fn bench_state_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("txn-state-machine");
    let txn_id = TestPeer::txn_id(1);

    group.bench_function("commit_cycle", |b| {
        b.iter(|| {
            let state = transition(&TxnState::Unbound, TxnEvent::Begin).unwrap();
            let state = transition(&state, TxnEvent::Declared(txn_id.clone())).unwrap();
            let state = transition(&state, TxnEvent::Enlist).unwrap();
            let state = transition(&state, TxnEvent::Commit).unwrap();
            black_box(transition(&state, TxnEvent::Discharged).unwrap())
        })
    });

    group.finish();
}

fn bench_tagging(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer-tagger");
    let txn_id = TestPeer::txn_id(1);

    for size in [64usize, 1024, 16 * 1024] {
        let transfer = Transfer::message(LinkHandle(1), DeliveryId(0), vec![0u8; size], false);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("tag_send", size), &transfer, |b, transfer| {
            b.iter(|| black_box(TransferTagger::tag_send(&txn_id, transfer.clone())))
        });
    }

    group.bench_function("acknowledgement", |b| {
        b.iter(|| black_box(TransferTagger::acknowledgement(&txn_id, DeliveryId(42))))
    });

    group.finish();
}

fn bench_commit_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let peer = TestPeer::new();
    let mut session = runtime
        .block_on(TransactedSession::open(TransactionConfig::default(), peer.wire()))
        .unwrap();
    let producer = runtime.block_on(session.create_producer("bench")).unwrap();

    c.bench_function("send_and_commit", |b| {
        b.iter(|| {
            runtime.block_on(async {
                session.send(producer, b"payload".to_vec()).await.unwrap();
                session.commit().await.unwrap();
            });
            peer.clear();
        })
    });
}

criterion_group!(benches, bench_state_machine, bench_tagging, bench_commit_round_trip);
criterion_main!(benches);
