/// Quick mode: bound re-read work by chasing the worst blocks first
use super::Classifier;
use crate::ranges::{BlockRange, BlockRangeList};
use crate::stats::BlockStat;
use std::cmp::Ordering;

/// Picks re-read candidates for quick mode.
///
/// Under-sampled or invalid blocks always come first. Once there are none,
/// slow blocks without enough samples are chosen; if there are more than the
/// cap (large on the first selection, small afterwards) only the worst by
/// 9th decile are kept.
#[derive(Debug, Default)]
pub struct QuickSelector {
    selections: usize,
}

impl QuickSelector {
    pub fn new() -> Self {
        Self::default()
    }

    fn cap(&self, classifier: &Classifier) -> usize {
        if self.selections == 0 {
            classifier.tuning().quick_first_cap
        } else {
            classifier.tuning().quick_cap
        }
    }

    pub fn select(
        &mut self,
        classifier: &Classifier,
        stats: &mut [BlockStat],
    ) -> Option<BlockRangeList> {
        let cap = self.cap(classifier);
        self.selections += 1;

        let starved: BlockRangeList = stats
            .iter()
            .enumerate()
            .filter(|(_, b)| {
                b.is_initialized() && (!b.is_valid() || b.count() < classifier.min_reads())
            })
            .map(|(i, _)| BlockRange::single(i as u64))
            .collect();
        if !starved.is_empty() {
            return Some(starved);
        }

        let slow = classifier.thresholds().slow;
        let depth = classifier.tuning().certain_depth;
        let mut candidates: Vec<(usize, bool, f64)> = Vec::new();
        for (index, block) in stats.iter_mut().enumerate() {
            if !block.is_initialized() || block.count() >= depth {
                continue;
            }
            let decile = block.decile();
            if decile >= slow {
                candidates.push((index, block.is_valid(), decile));
            }
        }

        if candidates.len() > cap {
            candidates.sort_by(|a, b| match b.1.cmp(&a.1) {
                Ordering::Equal => b.2.total_cmp(&a.2),
                other => other,
            });
            candidates.truncate(cap);
            candidates.sort_by_key(|c| c.0);
        }
        tracing::debug!(selected = candidates.len(), cap, "quick selection");

        if candidates.is_empty() {
            return None;
        }
        Some(
            candidates
                .into_iter()
                .map(|(i, _, _)| BlockRange::single(i as u64))
                .collect(),
        )
    }
}
