// Property tests for the statistical laws BlockStat must satisfy

use super::block_stat::{TRIM_FRACTION, TRIM_MIN_SAMPLES};
use super::BlockStat;
use proptest::prelude::*;

fn block(samples: &[f64]) -> BlockStat {
    let mut b = BlockStat::new();
    for &s in samples {
        b.add_time(s);
    }
    b
}

fn samples(min: usize, max: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.01f64..500.0, min..max)
}

fn close(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

proptest! {
    #[test]
    fn prop_zero_trim_is_plain_mean(s in samples(1, 64)) {
        let b = block(&s);
        prop_assert!(close(b.trunc_average(0.0), b.average()));
    }

    #[test]
    fn prop_int_average_switches_on_sample_count(s in samples(1, 64)) {
        let b = block(&s);
        if s.len() < TRIM_MIN_SAMPLES {
            prop_assert_eq!(b.int_average().to_bits(), b.average().to_bits());
        } else {
            prop_assert_eq!(
                b.int_average().to_bits(),
                b.trunc_average(TRIM_FRACTION).to_bits()
            );
        }
    }

    #[test]
    fn prop_half_quantile_is_median(s in samples(1, 64), q in 1u32..8) {
        let mut b = block(&s);
        let expected = median(&s);
        prop_assert!(close(b.quantile(q, 2 * q), expected));
    }

    #[test]
    fn prop_quantiles_are_bounded(s in samples(1, 64), k in 0u32..=10) {
        let mut b = block(&s);
        let min = b.min();
        let max = b.max();
        let value = b.quantile(k, 10);
        prop_assert!(value >= min - 1e-9 && value <= max + 1e-9);
        let exact = b.quantile_exact(k, 10);
        prop_assert!(s.contains(&exact));
    }

    #[test]
    fn prop_remove_last_restores_aggregates(s in samples(1, 32), x in 0.01f64..500.0) {
        let mut b = block(&s);
        b.make_valid();
        let count = b.count();
        let sum = b.sum();
        let average = b.average();
        let stdev = b.stdev();
        let decile = b.clone().decile();

        b.add_time(x);
        // a quantile sort in between must not matter
        b.quantile(1, 2);
        b.remove_last();

        prop_assert_eq!(b.count(), count);
        prop_assert!(close(b.sum(), sum));
        prop_assert!(close(b.average(), average));
        prop_assert!(close(b.stdev(), stdev));
        prop_assert!(close(b.decile(), decile));
        prop_assert!(b.is_initialized());
    }

    #[test]
    fn prop_same_validity_merge_is_associative(
        a in samples(0, 16),
        b in samples(0, 16),
        c in samples(0, 16),
        valid in any::<bool>(),
    ) {
        let make = |s: &[f64]| {
            let mut stat = block(s);
            if valid {
                stat.make_valid();
            }
            stat
        };
        let (ba, bb, bc) = (make(&a), make(&b), make(&c));

        let mut left = ba.clone();
        left.add_valid(&bb);
        left.add_valid(&bc);

        let mut right_tail = bb.clone();
        right_tail.add_valid(&bc);
        let mut right = ba.clone();
        right.add_valid(&right_tail);

        prop_assert_eq!(left.samples(), right.samples());
        prop_assert_eq!(left.errors(), right.errors());
        prop_assert_eq!(left.is_valid(), right.is_valid());
    }

    #[test]
    fn prop_invalid_adder_never_touches_valid_samples(
        kept in samples(1, 16),
        other in samples(0, 16),
        errors in 0u32..5,
    ) {
        let mut sum = block(&kept);
        sum.make_valid();
        let mut adder = block(&other);
        for _ in 0..errors {
            adder.add_error();
        }

        sum.add_valid(&adder);
        prop_assert_eq!(sum.samples(), &kept[..]);
        prop_assert_eq!(sum.errors(), errors);
        prop_assert!(sum.is_valid());
    }

    #[test]
    fn prop_trimmed_mean_within_range(s in samples(1, 64), p in 0.0f64..0.9) {
        let b = block(&s);
        let t = b.trunc_average(p);
        prop_assert!(t == 0.0 || (t >= b.min() - 1e-9 && t <= b.max() + 1e-9));
    }
}
