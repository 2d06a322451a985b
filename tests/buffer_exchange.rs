//! Concurrency tests for the three-list buffer exchange.

use mmpipe::Error;
use mmpipe::config::ExchangeConfig;
use mmpipe::exchange::BufferExchange;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

// ============================================================================
// Conservation
// ============================================================================

/// Test that nodes are conserved while a producer, a consumer and a
/// releasing thread work the same exchange.
#[test]
fn test_concurrent_traffic_conserves_nodes() {
    let exchange = Arc::new(
        BufferExchange::<u64>::new("stress", ExchangeConfig::new(4, 4).with_max_nodes(32)).unwrap(),
    );
    let total = 5_000u64;
    let produced_done = Arc::new(AtomicBool::new(false));
    let (consumed_tx, consumed_rx) = kanal::unbounded();

    let producer = {
        let exchange = Arc::clone(&exchange);
        let done = Arc::clone(&produced_done);
        thread::spawn(move || {
            let mut next = 0u64;
            while next < total {
                match exchange.push_ready(next) {
                    Ok(_) => next += 1,
                    Err(Error::InsufficientResources(_)) => thread::yield_now(),
                    Err(e) => panic!("push failed: {e}"),
                }
            }
            done.store(true, Ordering::Release);
        })
    };

    let consumer = {
        let exchange = Arc::clone(&exchange);
        let done = Arc::clone(&produced_done);
        thread::spawn(move || {
            let mut expected = 0u64;
            loop {
                match exchange.pop_ready() {
                    Some((token, value)) => {
                        assert_eq!(value, expected, "ready list out of order");
                        expected += 1;
                        consumed_tx.send(Some(token)).unwrap();
                    }
                    None if done.load(Ordering::Acquire) && exchange.is_ready_empty() => break,
                    None => thread::yield_now(),
                }
            }
            consumed_tx.send(None).unwrap();
            expected
        })
    };

    let released = Arc::new(AtomicUsize::new(0));
    let releaser = {
        let exchange = Arc::clone(&exchange);
        let released = Arc::clone(&released);
        thread::spawn(move || {
            while let Ok(Some(token)) = consumed_rx.recv() {
                exchange.release(token).unwrap();
                released.fetch_add(1, Ordering::Relaxed);
                let counts = exchange.counts();
                assert!(counts.is_conserved(), "{counts:?}");
                assert!(counts.allocated <= 32);
            }
        })
    };

    producer.join().unwrap();
    assert_eq!(consumer.join().unwrap(), total);
    releaser.join().unwrap();

    assert_eq!(released.load(Ordering::Relaxed) as u64, total);
    let counts = exchange.counts();
    assert!(counts.is_conserved());
    assert_eq!(counts.in_flight(), 0);
    assert_eq!(counts.empty, counts.allocated);
}

/// Test that stale tokens never match again after their node is recycled.
#[test]
fn test_stale_tokens_rejected_under_reuse() {
    let exchange = BufferExchange::<u32>::new("stale", ExchangeConfig::new(1, 1).with_max_nodes(1))
        .unwrap();

    let mut stale = Vec::new();
    for i in 0..100 {
        exchange.push_ready(i).unwrap();
        let (token, value) = exchange.pop_ready().unwrap();
        assert_eq!(value, i);
        assert_eq!(exchange.release(token).unwrap(), i);
        stale.push(token);
    }

    // Same slot each time, never the same generation.
    assert!(stale.iter().all(|t| t.slot() == 0));
    exchange.push_ready(7).unwrap();
    exchange.pop_ready().unwrap();
    for token in &stale {
        assert!(matches!(exchange.release(*token), Err(Error::BadParameter(_))));
    }
    assert_eq!(exchange.processing_len(), 1);
}

/// Test the producer-side path: reserve, commit, then release on giveback.
#[test]
fn test_reserve_commit_release_across_threads() {
    let exchange = Arc::new(
        BufferExchange::<String>::new("out", ExchangeConfig::new(2, 2).with_max_nodes(4)).unwrap(),
    );
    let (tx, rx) = kanal::bounded(4);

    let consumer = {
        let exchange = Arc::clone(&exchange);
        thread::spawn(move || {
            let mut got = Vec::new();
            while let Ok(Some(token)) = rx.recv() {
                got.push(exchange.release(token).unwrap());
            }
            got
        })
    };

    let mut sent = 0;
    while sent < 200 {
        let token = match exchange.reserve_empty() {
            Ok(token) => token,
            Err(Error::InsufficientResources(_)) => {
                thread::yield_now();
                continue;
            }
            Err(e) => panic!("reserve failed: {e}"),
        };
        exchange.commit_processing(token, format!("packet-{sent}")).unwrap();
        tx.send(Some(token)).unwrap();
        sent += 1;
    }
    tx.send(None).unwrap();

    let got = consumer.join().unwrap();
    assert_eq!(got.len(), 200);
    assert_eq!(got[0], "packet-0");
    assert_eq!(got[199], "packet-199");
    let counts = exchange.counts();
    assert!(counts.is_conserved());
    assert!(counts.allocated <= 4);
    assert_eq!(counts.in_flight(), 0);
}
