/// Classification and re-read selection over realistic stat tables
///
/// A 1 TB disk at 256 sectors per block has ~7.6M blocks; the tables here are
/// scaled down but keep the same mix of healthy, noisy and slow blocks.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use latentscan::classifier::{Classifier, QuickSelector, Search};
use latentscan::config::{ClassifierKind, SpeedThresholds};
use latentscan::StatTable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn stat_table(blocks: usize, reads: usize) -> StatTable {
    let mut rng = StdRng::seed_from_u64(7);
    let mut stats = StatTable::new(blocks);
    for block in stats.iter_mut() {
        block.make_valid();
        let base = if rng.gen_bool(0.001) { 40.0 } else { 1.0 };
        for _ in 0..reads {
            let spike = if rng.gen_bool(0.01) { 12.0 } else { 0.0 };
            block.add_time(base + rng.gen_range(0.0..0.3) + spike);
        }
    }
    stats
}

fn classifier(kind: ClassifierKind) -> Classifier {
    Classifier::new(SpeedThresholds::default(), 3, 0.5).with_kind(kind)
}

fn bench_find_uncertain(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_uncertain_blocks");

    for blocks in [10_000usize, 100_000] {
        group.throughput(Throughput::Elements(blocks as u64));
        for kind in [ClassifierKind::Decile, ClassifierKind::Classic] {
            let classifier = classifier(kind);
            let template = stat_table(blocks, 5);
            group.bench_with_input(
                BenchmarkId::new(format!("{kind:?}"), blocks),
                &blocks,
                |b, _| {
                    b.iter_batched(
                        || template.clone(),
                        |mut stats| black_box(classifier.find_uncertain_blocks(&mut stats)),
                        criterion::BatchSize::LargeInput,
                    );
                },
            );
        }
    }

    group.finish();
}

fn bench_certain_bad(c: &mut Criterion) {
    let classifier = classifier(ClassifierKind::Decile);
    let template = stat_table(100_000, 10);

    c.bench_function("find_bad_blocks_certain", |b| {
        b.iter_batched(
            || template.clone(),
            |mut stats| black_box(classifier.find_bad_blocks(&mut stats, Search::CERTAIN_BAD)),
            criterion::BatchSize::LargeInput,
        );
    });
}

fn bench_quick_select(c: &mut Criterion) {
    let classifier = classifier(ClassifierKind::Decile);
    let template = stat_table(100_000, 5);

    c.bench_function("quick_select_first_round", |b| {
        b.iter_batched(
            || (QuickSelector::new(), template.clone()),
            |(mut selector, mut stats)| black_box(selector.select(&classifier, &mut stats)),
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_find_uncertain,
    bench_certain_bad,
    bench_quick_select
);
criterion_main!(benches);
