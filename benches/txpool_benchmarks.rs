//! Transaction Pool Benchmarks
//!
//! ## Benchmark Path Types
//!
//! - `txn_*`: single-thread Begin / Exec / Commit lifecycle cost
//! - `classify_*`: error classification on the RPC boundary
//! - `contention_*`: many threads sharing a small connection pool
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench txpool_benchmarks
//! cargo bench --bench txpool_benchmarks -- "classify"
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tablet::{
    classify, classify_message, CallContext, FakeDb, QueryResult, RpcCode, SqlError, TabletError,
    TxPool, TxPoolConfig,
};

// =============================================================================
// Constants and Configuration
// =============================================================================

/// Duration for fixed-time contention benchmarks.
const CONTENTION_BENCH_DURATION: Duration = Duration::from_secs(2);

const INSERT: &str = "insert into t values (1)";

fn open_pool(capacity: usize) -> (FakeDb, TxPool) {
    let db = FakeDb::new("bench");
    db.add_query(INSERT, QueryResult::with_rows_affected(1));
    let pool = TxPool::new(TxPoolConfig {
        name: "BenchPool".to_string(),
        capacity,
        transaction_timeout_ms: 30_000,
        idle_timeout_ms: 0,
        pool_timeout_ms: 10_000,
    });
    pool.open(db.connector());
    (db, pool)
}

// =============================================================================
// Transaction lifecycle
// =============================================================================

fn txn_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("txn");
    group.throughput(Throughput::Elements(1));
    let ctx = CallContext::background();

    {
        let (_db, pool) = open_pool(4);
        group.bench_function("begin_commit", |b| {
            b.iter(|| {
                let id = pool.begin(&ctx).unwrap();
                pool.commit(&ctx, black_box(id)).unwrap();
            })
        });
        pool.close();
    }

    for statements in [1usize, 10] {
        let (_db, pool) = open_pool(4);
        group.bench_with_input(
            BenchmarkId::new("begin_exec_rollback", statements),
            &statements,
            |b, &statements| {
                b.iter(|| {
                    let id = pool.begin(&ctx).unwrap();
                    let tx = pool.get(id, "for query").unwrap();
                    for _ in 0..statements {
                        tx.record_query(INSERT);
                        black_box(tx.exec(&ctx, INSERT, 0, false).unwrap());
                    }
                    tx.recycle();
                    pool.rollback(&ctx, id).unwrap();
                })
            },
        );
        pool.close();
    }

    group.finish();
}

// =============================================================================
// Classification
// =============================================================================

fn classify_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(1));

    let sql = SqlError::new(1062, "23000", "Duplicate entry '1' for key 'PRIMARY'")
        .with_query("insert into t values (1)");
    let wrapped = TabletError::from_sql(RpcCode::Unknown, sql.clone());
    let rendered = wrapped.to_string();
    let plain = TabletError::new(RpcCode::ResourceExhausted, "Transaction pool connection limit exceeded");

    group.bench_function("structured", |b| b.iter(|| classify(black_box(&wrapped))));
    group.bench_function("text_recovery", |b| {
        b.iter(|| classify_message(black_box(&rendered), RpcCode::Unknown))
    });
    group.bench_function("code_mapping", |b| b.iter(|| classify(black_box(&plain))));
    group.finish();
}

// =============================================================================
// Contention
// =============================================================================

fn contention_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    group.sample_size(10);

    for threads in [2usize, 8] {
        group.bench_with_input(
            BenchmarkId::new("begin_commit_cap2", threads),
            &threads,
            |b, &threads| {
                b.iter_custom(|iters| {
                    let (_db, pool) = open_pool(2);
                    let pool = Arc::new(pool);
                    let barrier = Arc::new(Barrier::new(threads));
                    let committed = Arc::new(AtomicU64::new(0));
                    let per_thread = (iters as usize / threads).max(1);

                    let start = Instant::now();
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let pool = Arc::clone(&pool);
                            let barrier = Arc::clone(&barrier);
                            let committed = Arc::clone(&committed);
                            thread::spawn(move || {
                                let ctx = CallContext::background();
                                barrier.wait();
                                for _ in 0..per_thread {
                                    let id = pool.begin(&ctx).unwrap();
                                    pool.commit(&ctx, id).unwrap();
                                    committed.fetch_add(1, Ordering::Relaxed);
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    let elapsed = start.elapsed();
                    pool.close();
                    elapsed
                })
            },
        );
    }
    group.finish();
}

criterion_group!(txn, txn_benchmarks);
criterion_group!(classification, classify_benchmarks);
criterion_group!(
    name = contention;
    config = Criterion::default().measurement_time(CONTENTION_BENCH_DURATION);
    targets = contention_benchmarks
);
criterion_main!(txn, classification, contention);
