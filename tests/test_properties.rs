//! Property-based tests for merge laws and throughput arithmetic.

use std::sync::Arc;

use proptest::prelude::*;
use rustyeval::metrics::{
    Accumulator, EffectiveThroughput, ManualClock, Metric, MetricError, Minimum, Perplexity,
};

fn counter_state(values: &[i64], total: f64, start: f64) -> Accumulator {
    let mut acc = Accumulator::new()
        .with_counter("counts", values.len())
        .with_sum("total", 1)
        .with_minimum("start", start);
    acc.add_counts("counts", values).unwrap();
    acc.add_values("total", &[total]).unwrap();
    acc
}

fn worker_states() -> impl Strategy<Value = Vec<(Vec<i64>, u32, u32)>> {
    prop::collection::vec(
        (prop::collection::vec(0i64..1_000, 4), 0u32..1_000, 0u32..1_000),
        1..6,
    )
}

proptest! {
    #[test]
    fn prop_merge_is_order_independent(workers in worker_states()) {
        let states: Vec<Accumulator> = workers
            .iter()
            .map(|(c, t, s)| counter_state(c, *t as f64, *s as f64))
            .collect();

        let mut forward = states[0].clone();
        forward.merge(&states[1..]).unwrap();

        let mut reversed_peers: Vec<Accumulator> = states[1..].to_vec();
        reversed_peers.reverse();
        let mut backward = states[0].clone();
        backward.merge(&reversed_peers).unwrap();

        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn prop_merge_equals_sum_and_min(workers in worker_states()) {
        let states: Vec<Accumulator> = workers
            .iter()
            .map(|(c, t, s)| counter_state(c, *t as f64, *s as f64))
            .collect();

        let mut merged = states[0].clone();
        merged.merge(&states[1..]).unwrap();

        let mut expected_counts = vec![0i64; 4];
        for (counts, _, _) in &workers {
            for (e, c) in expected_counts.iter_mut().zip(counts) {
                *e += c;
            }
        }
        let expected_total: f64 = workers.iter().map(|(_, t, _)| *t as f64).sum();
        let expected_start = workers.iter().map(|(_, _, s)| *s).min().unwrap() as f64;

        prop_assert_eq!(merged.counts("counts").unwrap().to_vec(), expected_counts);
        prop_assert_eq!(merged.values("total").unwrap()[0], expected_total);
        prop_assert_eq!(merged.values("start").unwrap()[0], expected_start);
    }

    #[test]
    fn prop_throughput_is_count_over_elapsed(
        updates in prop::collection::vec(0i64..10_000, 0..20),
        elapsed in 0.001f64..1_000.0,
    ) {
        let clock = Arc::new(ManualClock::new(50.0));
        let mut wps = EffectiveThroughput::with_clock(clock.clone());
        for n in &updates {
            wps.update(*n).unwrap();
        }
        clock.advance(elapsed);

        let expected = updates.iter().sum::<i64>() as f64 / elapsed;
        let actual = wps.compute().unwrap();
        prop_assert!((actual - expected).abs() <= 1e-9 * expected.max(1.0));
    }

    #[test]
    fn prop_negative_update_keeps_state(before in 0i64..1_000, bad in i64::MIN..0) {
        let mut wps = EffectiveThroughput::with_clock(Arc::new(ManualClock::new(0.0)));
        wps.update(before).unwrap();

        let err = wps.update(bad).unwrap_err();
        prop_assert!(matches!(err, MetricError::InvalidArgument(_)));
        prop_assert_eq!(wps.num_total().unwrap(), before as f64);
    }

    #[test]
    fn prop_merged_throughput_uses_earliest_start(
        starts in prop::collection::vec(0.0f64..100.0, 2..5),
        counts in prop::collection::vec(0i64..1_000, 5),
    ) {
        let workers: Vec<EffectiveThroughput> = starts
            .iter()
            .zip(&counts)
            .map(|(start, n)| {
                let mut wps = EffectiveThroughput::with_clock(Arc::new(ManualClock::new(*start)));
                wps.update(*n).unwrap();
                wps
            })
            .collect();

        let mut merged = workers[0].clone();
        merged.merge(workers[1..].iter()).unwrap();

        let earliest = starts.iter().cloned().fold(f64::INFINITY, f64::min);
        let total: i64 = counts.iter().take(starts.len()).sum();
        prop_assert_eq!(merged.start_time().unwrap(), earliest);
        prop_assert_eq!(merged.num_total().unwrap(), total as f64);
    }

    #[test]
    fn prop_split_perplexity_matches_whole(
        losses in prop::collection::vec((0.0f64..10.0, 1i64..50), 1..12),
        split in 0usize..12,
    ) {
        let split = split.min(losses.len());
        let mut whole = Perplexity::new();
        let mut left = Perplexity::new();
        let mut right = Perplexity::new();
        for (i, (nll, tokens)) in losses.iter().enumerate() {
            whole.update_nll(*nll, *tokens).unwrap();
            if i < split {
                left.update_nll(*nll, *tokens).unwrap();
            } else {
                right.update_nll(*nll, *tokens).unwrap();
            }
        }

        left.merge([&right]).unwrap();
        let (a, b) = (left.compute().unwrap(), whole.compute().unwrap());
        prop_assert!((a - b).abs() <= 1e-9 * b);
    }

    #[test]
    fn prop_minimum_survives_any_merge_order(values in prop::collection::vec(-1e6f64..1e6, 1..10)) {
        let workers: Vec<Minimum> = values
            .iter()
            .map(|v| {
                let mut m = Minimum::new();
                m.update(*v);
                m
            })
            .collect();

        let mut merged = workers[workers.len() - 1].clone();
        merged.merge(workers.iter().rev()).unwrap();

        let expected = values.iter().cloned().fold(f64::INFINITY, f64::min);
        prop_assert_eq!(merged.compute().unwrap(), expected);
    }
}
