//! Typed test suites over the whole queue family.
//!
//! Each suite is instantiated per queue type by macro, the analogue of a
//! typed test fixture: every family member must satisfy the same FIFO
//! semantics, with the mutex queue as the reference implementation.
//!
//! Payloads are shared references into test-owned storage; the queues move
//! pointers, never values, and nothing writes through them.

use ringmpmc::{
    BoundedCrq, BoundedMtq, BoundedMuxQueue, BoundedPrq, FaaQueue, Lcrq, LinkedMuxQueue, Lmtq,
    Lprq, Queue,
};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UserData {
    tid: usize,
    id: u64,
}

fn gauss(n: u64) -> u64 {
    n * (n + 1) / 2
}

// =============================================================================
// Generic scenarios
// =============================================================================

/// Push `total` values through a ring of smaller capacity, single-threaded;
/// everything comes back in order (unbounded queues only).
fn run_wrap_in_order<Q: Queue<u64>>(queue: &Q, total: u64) {
    let vals: Vec<u64> = (1..=total).collect();
    for v in &vals {
        assert!(queue.push(NonNull::from(v), 0));
    }
    for expect in 1..=total {
        let got = queue.pop(0).expect("value present");
        assert_eq!(unsafe { *got.as_ref() }, expect);
    }
    assert!(queue.pop(0).is_none());
    assert_eq!(queue.len(0), 0);
}

/// Alternating push/pop never grows the queue and never loses order.
fn run_alternation<Q: Queue<u64>>(queue: &Q) {
    let vals: Vec<u64> = (1..30).collect();
    for v in &vals {
        assert!(queue.push(NonNull::from(v), 0));
        let got = queue.pop(0).expect("value present");
        assert_eq!(unsafe { *got.as_ref() }, *v);
    }
    assert!(queue.pop(0).is_none());
    assert_eq!(queue.len(0), 0);
}

/// Bounded fill/drain cycling: fill to capacity, reject a burst of
/// overflowing pushes without disturbing the content, drain in order.
fn run_fill_drain_cycles<Q: Queue<u64>>(queue: &Q, capacity: usize) {
    let mut overflow = 0u64;
    for round in 0..10u64 {
        let vals: Vec<u64> = (0..capacity as u64).map(|i| round * 10_000 + i).collect();
        for v in &vals {
            assert!(queue.push(NonNull::from(v), 0));
        }
        assert_eq!(queue.len(0), capacity);

        for _ in 0..2048 {
            assert!(!queue.push(NonNull::from(&mut overflow), 0));
            assert_eq!(queue.len(0), capacity);
        }

        for expect in &vals {
            let got = queue.pop(0).expect("value present");
            assert_eq!(unsafe { *got.as_ref() }, *expect);
        }
        assert!(queue.pop(0).is_none());
        assert_eq!(queue.len(0), 0);
    }
}

/// N producers, N consumers, each producer pushing ids `1..=iter`; the sum
/// of consumed ids accounts for every item exactly once.
fn run_transfer_all<Q: Queue<UserData> + Sync>(queue: &Q, n: usize, iter: u64) {
    let stop = AtomicBool::new(false);
    let data: Vec<Vec<UserData>> = (0..n)
        .map(|tid| (1..=iter).map(|id| UserData { tid, id }).collect())
        .collect();

    let mut totals: Vec<(u64, u64)> = Vec::new();
    thread::scope(|s| {
        let stop = &stop;
        let consumers: Vec<_> = (0..n)
            .map(|c| {
                s.spawn(move || {
                    let tid = n + c;
                    let mut sum = 0u64;
                    let mut count = 0u64;
                    while !stop.load(Ordering::Acquire) {
                        if let Some(ud) = queue.pop(tid) {
                            sum += unsafe { ud.as_ref() }.id;
                            count += 1;
                        }
                    }
                    while let Some(ud) = queue.pop(tid) {
                        sum += unsafe { ud.as_ref() }.id;
                        count += 1;
                    }
                    (sum, count)
                })
            })
            .collect();

        let producers: Vec<_> = data
            .iter()
            .enumerate()
            .map(|(tid, items)| {
                s.spawn(move || {
                    for item in items {
                        // Bounded members may be momentarily full.
                        while !queue.push(NonNull::from(item), tid) {}
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        stop.store(true, Ordering::Release);
        totals = consumers.into_iter().map(|h| h.join().unwrap()).collect();
    });

    let sum: u64 = totals.iter().map(|t| t.0).sum();
    let count: u64 = totals.iter().map(|t| t.1).sum();
    assert_eq!(count, n as u64 * iter, "every item consumed exactly once");
    assert_eq!(sum, n as u64 * gauss(iter));
    assert!(queue.pop(0).is_none());
    assert_eq!(queue.len(0), 0);
}

/// Same transfer, but consumers record what they saw: within any single
/// consumer, each producer's ids must appear in strictly increasing order,
/// and the union of all records must be exactly the produced multiset.
fn run_per_producer_fifo<Q: Queue<UserData> + Sync>(queue: &Q, n: usize, iter: u64) {
    let stop = AtomicBool::new(false);
    let data: Vec<Vec<UserData>> = (0..n)
        .map(|tid| (1..=iter).map(|id| UserData { tid, id }).collect())
        .collect();

    let mut records: Vec<Vec<UserData>> = Vec::new();
    thread::scope(|s| {
        let stop = &stop;
        let consumers: Vec<_> = (0..n)
            .map(|c| {
                s.spawn(move || {
                    let tid = n + c;
                    let mut seen = Vec::new();
                    while !stop.load(Ordering::Acquire) {
                        if let Some(ud) = queue.pop(tid) {
                            seen.push(*unsafe { ud.as_ref() });
                        }
                    }
                    while let Some(ud) = queue.pop(tid) {
                        seen.push(*unsafe { ud.as_ref() });
                    }
                    seen
                })
            })
            .collect();

        let producers: Vec<_> = data
            .iter()
            .enumerate()
            .map(|(tid, items)| {
                s.spawn(move || {
                    for item in items {
                        while !queue.push(NonNull::from(item), tid) {}
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        stop.store(true, Ordering::Release);
        records = consumers.into_iter().map(|h| h.join().unwrap()).collect();
    });

    // Per-producer order within each consumer
    for seen in &records {
        let mut last: HashMap<usize, u64> = HashMap::new();
        for ud in seen {
            if let Some(prev) = last.get(&ud.tid) {
                assert!(
                    ud.id > *prev,
                    "producer {} ids out of order: {} after {}",
                    ud.tid,
                    ud.id,
                    prev
                );
            }
            last.insert(ud.tid, ud.id);
        }
    }

    // Conservation: the consumed multiset equals the produced multiset
    let mut per_producer: HashMap<usize, Vec<u64>> = HashMap::new();
    for seen in &records {
        for ud in seen {
            per_producer.entry(ud.tid).or_default().push(ud.id);
        }
    }
    assert_eq!(per_producer.len(), n);
    for (tid, mut ids) in per_producer {
        ids.sort_unstable();
        assert_eq!(ids.len() as u64, iter, "producer {tid} item count");
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(*id, i as u64 + 1, "producer {tid} multiset mismatch");
        }
    }
}

/// Producers force segment links while a third thread hammers `len`; the
/// probe must only ever observe hazard-protected segments.
fn run_len_probe<Q: Queue<u64> + Sync>(queue: &Q, per_producer: u64) {
    let stop = AtomicBool::new(false);
    let data: Vec<Vec<u64>> = (0..2)
        .map(|p| (0..per_producer).map(|i| p * per_producer + i).collect())
        .collect();

    thread::scope(|s| {
        let stop = &stop;
        let prober = s.spawn(move || {
            let mut observations = 0u64;
            while !stop.load(Ordering::Acquire) {
                let _ = queue.len(2);
                observations += 1;
            }
            observations
        });
        let consumer = s.spawn(move || {
            let mut count = 0u64;
            while !stop.load(Ordering::Acquire) {
                if queue.pop(3).is_some() {
                    count += 1;
                }
            }
            while queue.pop(3).is_some() {
                count += 1;
            }
            count
        });
        let producers: Vec<_> = data
            .iter()
            .enumerate()
            .map(|(tid, items)| {
                s.spawn(move || {
                    for item in items {
                        while !queue.push(NonNull::from(item), tid) {}
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        stop.store(true, Ordering::Release);
        assert!(prober.join().unwrap() > 0);
        let consumed = consumer.join().unwrap();
        assert_eq!(consumed, 2 * per_producer);
    });
    assert_eq!(queue.len(0), 0);
}

// =============================================================================
// Suite instantiation
// =============================================================================

macro_rules! unbounded_suite {
    ($name:ident, $Q:ident) => {
        mod $name {
            use super::*;

            #[test]
            fn wrap_in_order() {
                // Ring smaller than the item count: the chain must extend
                let q = $Q::<u64>::new(20, 2).unwrap();
                run_wrap_in_order(&q, 30);
            }

            #[test]
            fn alternation() {
                let q = $Q::<u64>::new(20, 2).unwrap();
                run_alternation(&q);
            }

            #[test]
            fn large_burst_in_order() {
                let q = $Q::<u64>::new(32, 2).unwrap();
                run_wrap_in_order(&q, 2048);
            }

            #[test]
            fn transfer_all_items() {
                for n in 1..=2 {
                    let q = $Q::<UserData>::new(1024, 4 * n).unwrap();
                    run_transfer_all(&q, n, 10_000);
                }
            }

            #[test]
            fn per_producer_fifo() {
                for n in 1..=2 {
                    let q = $Q::<UserData>::new(1024, 4 * n).unwrap();
                    run_per_producer_fifo(&q, n, 10_000);
                }
            }

            #[test]
            fn rejects_zero_capacity() {
                assert!(matches!(
                    $Q::<u64>::new(0, 1),
                    Err(ringmpmc::QueueError::ZeroCapacity)
                ));
            }

            #[test]
            fn rejects_oversized_thread_count() {
                assert!(matches!(
                    $Q::<u64>::new(16, ringmpmc::MAX_THREADS + 1),
                    Err(ringmpmc::QueueError::TooManyThreads { .. })
                ));
            }
        }
    };
}

macro_rules! bounded_suite {
    ($name:ident, $Q:ident) => {
        mod $name {
            use super::*;

            #[test]
            fn fill_drain_cycles() {
                let q = $Q::<u64>::new(32, 1).unwrap();
                run_fill_drain_cycles(&q, 32);
            }

            #[test]
            fn alternation() {
                let q = $Q::<u64>::new(32, 1).unwrap();
                run_alternation(&q);
            }

            #[test]
            fn transfer_all_items() {
                for n in 1..=2 {
                    let q = $Q::<UserData>::new(4096, 4 * n).unwrap();
                    run_transfer_all(&q, n, 10_000);
                }
            }

            #[test]
            fn per_producer_fifo() {
                for n in 1..=2 {
                    let q = $Q::<UserData>::new(4096, 4 * n).unwrap();
                    run_per_producer_fifo(&q, n, 10_000);
                }
            }

            #[test]
            fn rejects_zero_capacity() {
                assert!(matches!(
                    $Q::<u64>::new(0, 1),
                    Err(ringmpmc::QueueError::ZeroCapacity)
                ));
            }
        }
    };
}

/// Unbounded members report their segment churn through `metrics()`; an
/// overflow five times the ring size must allocate at least four segments
/// and still drain in order.
macro_rules! segment_churn_suite {
    ($name:ident, $Q:ident) => {
        mod $name {
            use super::*;

            #[test]
            fn overflow_allocates_segments() {
                let q = $Q::<u64>::new(128, 2).unwrap();
                let vals: Vec<u64> = (0..128 * 5).collect();
                for v in &vals {
                    q.push(NonNull::from(v), 0);
                }
                assert!(
                    q.metrics().segments_allocated >= 4,
                    "expected at least 4 extra segments, saw {}",
                    q.metrics().segments_allocated
                );
                for expect in 0..128 * 5 {
                    let got = q.pop(1).expect("value present");
                    assert_eq!(unsafe { *got.as_ref() }, expect);
                }
                assert!(q.pop(1).is_none());
            }

            #[test]
            fn drained_segments_are_retired() {
                let q = $Q::<u64>::new(64, 2).unwrap();
                let vals: Vec<u64> = (0..64 * 4).collect();
                for v in &vals {
                    q.push(NonNull::from(v), 0);
                }
                while q.pop(1).is_some() {}
                let m = q.metrics();
                assert!(m.segments_retired > 0);
                assert!(m.segments_retired <= m.segments_allocated);
            }

            #[test]
            fn concurrent_len_probe() {
                let q = $Q::<u64>::new(64, 4).unwrap();
                run_len_probe(&q, 20_000);
            }
        }
    };
}

unbounded_suite!(lcrq, Lcrq);
unbounded_suite!(lprq, Lprq);
unbounded_suite!(lmtq, Lmtq);
unbounded_suite!(faa, FaaQueue);
unbounded_suite!(linked_mux, LinkedMuxQueue);

bounded_suite!(bounded_crq, BoundedCrq);
bounded_suite!(bounded_prq, BoundedPrq);
bounded_suite!(bounded_mtq, BoundedMtq);
bounded_suite!(bounded_mux, BoundedMuxQueue);

segment_churn_suite!(lcrq_churn, Lcrq);
segment_churn_suite!(lprq_churn, Lprq);
segment_churn_suite!(lmtq_churn, Lmtq);
segment_churn_suite!(faa_churn, FaaQueue);

// =============================================================================
// Cross-type checks
// =============================================================================

#[test]
fn class_names_are_distinct_and_stable() {
    let names = [
        <Lcrq<u64> as Queue<u64>>::class_name(),
        <Lprq<u64> as Queue<u64>>::class_name(),
        <Lmtq<u64> as Queue<u64>>::class_name(),
        <FaaQueue<u64> as Queue<u64>>::class_name(),
        <LinkedMuxQueue<u64> as Queue<u64>>::class_name(),
        <BoundedCrq<u64> as Queue<u64>>::class_name(),
        <BoundedPrq<u64> as Queue<u64>>::class_name(),
        <BoundedMtq<u64> as Queue<u64>>::class_name(),
        <BoundedMuxQueue<u64> as Queue<u64>>::class_name(),
    ];
    for (i, a) in names.iter().enumerate() {
        assert!(!a.is_empty());
        for b in names.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
    assert!(names[0].starts_with("LinkedCRQueue"));
}
