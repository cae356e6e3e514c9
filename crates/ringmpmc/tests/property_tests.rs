//! Property-based tests: the sequential FIFO model is the reference.
//!
//! Single-threaded, every queue in the family must be indistinguishable
//! from a `VecDeque` of the pushed values: pops return the same values in
//! the same order, bounded members reject exactly when the model is at
//! capacity, and a full drain leaves both empty. This pins down the
//! sequential semantics the concurrent tests build on.

use proptest::prelude::*;
use ringmpmc::Queue;
use std::collections::VecDeque;
use std::ptr::NonNull;

/// How faithfully a bounded flavor's `push` result tracks "the model is at
/// capacity".
#[derive(Clone, Copy, PartialEq)]
enum FullSemantics {
    /// Unbounded: every push accepted.
    Never,
    /// Rejects exactly when full (MTQ ticket matching, the mutex queue).
    Exact,
    /// Rejects whenever full, but a burst of rejected tickets may inflate
    /// the tail counter and cause further spurious rejections until the
    /// ring drains (CRQ/PRQ fetch-add protocol).
    AtLeastWhenFull,
}

/// Apply a push/pop sequence to a queue and the model in lockstep, then
/// drain both and require them to agree at every step.
///
/// The model records accepted pushes only, so pop comparisons stay exact
/// even for flavors with spurious rejections. `len` is only
/// sanity-bounded: the ring queues estimate occupancy from ticket counters.
fn check_against_model<Q: Queue<u64>>(
    queue: &Q,
    capacity: usize,
    ops: &[bool],
    full: FullSemantics,
) {
    let storage: Vec<u64> = (0..ops.len() as u64 + 1).collect();
    let mut model: VecDeque<u64> = VecDeque::new();
    let mut next = 0usize;

    for &is_push in ops {
        if is_push {
            let v = &storage[next];
            let accepted = queue.push(NonNull::from(v), 0);
            match full {
                FullSemantics::Never => assert!(accepted),
                FullSemantics::Exact => {
                    assert_eq!(accepted, model.len() < capacity);
                }
                FullSemantics::AtLeastWhenFull => {
                    if model.len() >= capacity {
                        assert!(!accepted, "push accepted into a full ring");
                    }
                }
            }
            if accepted {
                assert!(model.len() < capacity || full == FullSemantics::Never);
                model.push_back(*v);
                next += 1;
            }
        } else {
            let got = queue.pop(0).map(|p| unsafe { *p.as_ref() });
            assert_eq!(got, model.pop_front());
        }
        if full != FullSemantics::Never {
            assert!(queue.len(0) <= capacity);
        }
    }

    while let Some(expect) = model.pop_front() {
        let got = queue.pop(0).map(|p| unsafe { *p.as_ref() });
        assert_eq!(got, Some(expect));
    }
    assert!(queue.pop(0).is_none());
    assert_eq!(queue.len(0), 0);
}

/// Effective capacities shared by every flavor: powers of two, at least 2
/// (ticket matching needs two slots; the others round up to these anyway).
fn capacities() -> impl Strategy<Value = usize> {
    prop_oneof![Just(2usize), Just(4), Just(8), Just(16), Just(32)]
}

macro_rules! model_equivalence {
    ($name:ident, $Q:ty, $full:expr) => {
        proptest! {
            #[test]
            fn $name(
                capacity in capacities(),
                ops in prop::collection::vec(prop::bool::ANY, 0..120),
            ) {
                let queue = <$Q>::new(capacity, 1).unwrap();
                check_against_model(&queue, capacity, &ops, $full);
            }
        }
    };
}

model_equivalence!(
    prop_bounded_crq_matches_model,
    ringmpmc::BoundedCrq<u64>,
    FullSemantics::AtLeastWhenFull
);
model_equivalence!(
    prop_bounded_prq_matches_model,
    ringmpmc::BoundedPrq<u64>,
    FullSemantics::AtLeastWhenFull
);
model_equivalence!(
    prop_bounded_mtq_matches_model,
    ringmpmc::BoundedMtq<u64>,
    FullSemantics::Exact
);
model_equivalence!(
    prop_bounded_mux_matches_model,
    ringmpmc::BoundedMuxQueue<u64>,
    FullSemantics::Exact
);

model_equivalence!(prop_lcrq_matches_model, ringmpmc::Lcrq<u64>, FullSemantics::Never);
model_equivalence!(prop_lprq_matches_model, ringmpmc::Lprq<u64>, FullSemantics::Never);
model_equivalence!(prop_lmtq_matches_model, ringmpmc::Lmtq<u64>, FullSemantics::Never);
model_equivalence!(prop_faa_matches_model, ringmpmc::FaaQueue<u64>, FullSemantics::Never);
model_equivalence!(
    prop_linked_mux_matches_model,
    ringmpmc::LinkedMuxQueue<u64>,
    FullSemantics::Never
);

proptest! {
    /// Drain law: N pushes then pops with no concurrency return everything
    /// in order; the N+1th pop is `None` and the queue reports empty.
    #[test]
    fn prop_unbounded_drain(
        capacity in capacities(),
        n in 0u64..300,
    ) {
        let queue = ringmpmc::Lcrq::<u64>::new(capacity, 1).unwrap();
        let storage: Vec<u64> = (0..n).collect();
        for v in &storage {
            queue.push(NonNull::from(v), 0);
        }
        for expect in 0..n {
            let got = queue.pop(0).map(|p| unsafe { *p.as_ref() });
            prop_assert_eq!(got, Some(expect));
        }
        prop_assert!(queue.pop(0).is_none());
        prop_assert_eq!(queue.len(0), 0);
    }

    /// Small rings under long streams: chain growth is bounded by the
    /// stream length and everything still drains in order.
    #[test]
    fn prop_chain_growth_is_bounded(
        n in 1u64..500,
    ) {
        let queue = ringmpmc::Lprq::<u64>::new(2, 1).unwrap();
        let storage: Vec<u64> = (0..n).collect();
        for v in &storage {
            queue.push(NonNull::from(v), 0);
        }
        let allocated = queue.metrics().segments_allocated;
        prop_assert!(allocated <= n, "allocated {} segments for {} items", allocated, n);
        for expect in 0..n {
            let got = queue.pop(0).map(|p| unsafe { *p.as_ref() });
            prop_assert_eq!(got, Some(expect));
        }
        prop_assert!(queue.pop(0).is_none());
    }
}
