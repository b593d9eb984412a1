// Scenario tests for both classifier rule sets
//
// Thresholds are calibrated on a 8.57ms rotational delay:
// fast 8.57, normal 17.14, slow 34.28, very slow 51.42.

use super::*;
use crate::config::{ClassifierKind, SpeedThresholds};
use test_case::test_case;

const DELAY: f64 = 8.57;

fn classifier(min_reads: usize) -> Classifier {
    Classifier::new(SpeedThresholds::from_rotational_delay(DELAY), min_reads, 0.5)
}

fn classic(min_reads: usize) -> Classifier {
    classifier(min_reads).with_kind(ClassifierKind::Classic)
}

fn valid_block(samples: &[f64]) -> BlockStat {
    let mut b = BlockStat::new();
    b.make_valid();
    for &s in samples {
        b.add_time(s);
    }
    b
}

fn verdict(c: &Classifier, samples: &[f64], search: Search) -> Verdict {
    let mut stats = vec![valid_block(samples)];
    c.classify(&mut stats, 0, search)
}

// ==================== DECILE RULES ====================

#[test]
fn test_uninitialized_block_never_reported() {
    let mut stats = vec![BlockStat::new(); 8];
    for c in [classifier(3), classic(3)] {
        assert!(c.find_bad_blocks(&mut stats, Search::UNCERTAIN).is_none());
        assert!(c.find_bad_blocks(&mut stats, Search::CERTAIN_BAD).is_none());
    }
}

#[test]
fn test_two_fast_samples_are_fine() {
    let c = classifier(2);
    assert_eq!(verdict(&c, &[1.0, 1.0], Search::UNCERTAIN), Verdict::Fine);
    assert_eq!(verdict(&c, &[1.0, 1.0], Search::CERTAIN_BAD), Verdict::Fine);
}

#[test]
fn test_under_sampled_block_is_uncertain() {
    let c = classifier(3);
    assert_eq!(verdict(&c, &[1.0], Search::UNCERTAIN), Verdict::Uncertain);
    assert_eq!(verdict(&c, &[1.0], Search::CERTAIN_BAD), Verdict::Uncertain);
}

#[test]
fn test_invalid_block_is_uncertain() {
    let c = classifier(1);
    let mut stats = vec![valid_block(&[1.0, 1.0, 1.0])];
    stats[0].make_invalid();
    assert_eq!(c.classify(&mut stats, 0, Search::UNCERTAIN), Verdict::Uncertain);
}

#[test]
fn test_soft_delay_suppresses_noisy_fast_block() {
    let c = classifier(3);
    // relative stdev is high but every read is under half a revolution
    assert_eq!(verdict(&c, &[1.0, 1.0, 4.0], Search::UNCERTAIN), Verdict::Fine);
}

#[test]
fn test_consistent_slowish_block_bad_only_when_certain() {
    let c = classifier(3);
    let samples = vec![20.0; 25];
    assert_eq!(verdict(&c, &samples, Search::UNCERTAIN), Verdict::Fine);
    assert_eq!(verdict(&c, &samples, Search::CERTAIN_BAD), Verdict::Bad);
}

#[test_case(20.0, 10, Verdict::Uncertain ; "normal decile below depth 15")]
#[test_case(20.0, 15, Verdict::Bad ; "normal decile at depth 15")]
#[test_case(40.0, 19, Verdict::Uncertain ; "slow decile below depth 20")]
#[test_case(40.0, 20, Verdict::Bad ; "slow decile at depth 20")]
#[test_case(60.0, 25, Verdict::Uncertain ; "very slow decile below depth 30")]
#[test_case(60.0, 30, Verdict::Bad ; "very slow decile at depth 30")]
fn test_evidence_depth(latency: f64, samples: usize, expected: Verdict) {
    let c = classifier(3);
    assert_eq!(
        verdict(&c, &vec![latency; samples], Search::CERTAIN_BAD),
        expected
    );
}

#[test_case(&[1.0, 1.0, 12.0], Verdict::Fine ; "single slow read of three is a fluke")]
#[test_case(&[9.0, 9.0, 12.0], Verdict::Bad ; "three slow reads")]
#[test_case(&[5.0, 9.0, 12.0], Verdict::Uncertain ; "fast lower quartile")]
#[test_case(&[2.0, 2.0, 2.0, 12.0, 12.0], Verdict::Fine ; "fast median small max")]
#[test_case(&[9.0, 10.0, 10.0, 11.0, 12.0], Verdict::Bad ; "slow lower quartile")]
#[test_case(&[2.0, 3.0, 4.0, 10.0, 18.0], Verdict::Uncertain ; "max far above median")]
#[test_case(&[2.0, 3.0, 9.0, 16.0, 16.0], Verdict::Bad ; "max close to median")]
fn test_small_sample_cases(samples: &[f64], expected: Verdict) {
    let c = classifier(3);
    assert_eq!(verdict(&c, samples, Search::CERTAIN_BAD), expected);
}

#[test]
fn test_noisy_block_needs_more_reads() {
    let c = classifier(3);
    assert_eq!(
        verdict(&c, &[2.0, 3.0, 4.0, 10.0, 18.0], Search::UNCERTAIN),
        Verdict::Uncertain
    );
}

#[test]
fn test_deep_noisy_block_stops_rereads() {
    let c = classifier(3);
    let mut samples = vec![5.0; 10];
    samples.extend(vec![30.0; 12]);
    assert_eq!(verdict(&c, &samples, Search::UNCERTAIN), Verdict::Fine);
}

#[test]
fn test_output_is_ascending_singletons() {
    let c = classifier(2);
    let mut stats = vec![
        valid_block(&[1.0, 1.0]),
        valid_block(&[1.0]),
        BlockStat::new(),
        valid_block(&vec![20.0; 25]),
        valid_block(&[1.0, 1.0]),
        valid_block(&[2.0]),
    ];

    let list = c.find_bad_blocks(&mut stats, Search::CERTAIN_BAD).unwrap();
    assert!(list.iter().all(|r| r.length == 1));
    assert_eq!(list.blocks().collect::<Vec<_>>(), vec![1, 3, 5]);
}

#[test]
fn test_block_zero_can_be_reported() {
    let c = classifier(3);
    let mut stats = vec![valid_block(&[1.0]), valid_block(&[1.0, 1.0, 1.0])];
    let list = c.find_uncertain_blocks(&mut stats).unwrap();
    assert_eq!(list.blocks().collect::<Vec<_>>(), vec![0]);
}

// ==================== CLASSIC RULES ====================

#[test]
fn test_classic_lone_slow_sample_flagged() {
    let c = classic(1);
    let mut stats: Vec<BlockStat> = [5.0, 5.0, 5.0, 50.0, 5.0, 5.0, 5.0, 5.0]
        .iter()
        .map(|&t| valid_block(&[t]))
        .collect();
    assert_eq!(c.classify(&mut stats, 3, Search::UNCERTAIN), Verdict::Uncertain);
}

#[test]
fn test_classic_local_anomaly_below_delay() {
    let c = classic(1);
    let mut stats: Vec<BlockStat> = [2.0, 2.0, 2.0, 2.0, 6.0, 2.0, 2.0, 2.0]
        .iter()
        .map(|&t| valid_block(&[t]))
        .collect();
    assert_eq!(c.classify(&mut stats, 4, Search::UNCERTAIN), Verdict::Uncertain);

    stats[4] = valid_block(&[2.4]);
    assert_eq!(c.classify(&mut stats, 4, Search::UNCERTAIN), Verdict::Fine);
}

#[test]
fn test_classic_slow_average_bad_when_certain() {
    let c = classic(3);
    assert_eq!(
        verdict(&c, &vec![20.0; 25], Search::CERTAIN_BAD),
        Verdict::Bad
    );
    assert_eq!(verdict(&c, &vec![20.0; 25], Search::UNCERTAIN), Verdict::Fine);
}

#[test]
fn test_classic_fast_block_skipped_without_soft_delay() {
    let c = classic(3);
    assert_eq!(
        verdict(&c, &[1.0, 1.0, 6.0], Search::CERTAIN_BAD),
        Verdict::Fine
    );
}
