/// Latency statistics for every block of the device
pub mod block_stat;

pub use block_stat::BlockStat;

use serde::Serialize;
use std::ops::{Deref, DerefMut};

/// One [`BlockStat`] per block, allocated once for the whole scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatTable {
    blocks: Vec<BlockStat>,
}

/// Sweep-level confidence figures over the blocks read so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SweepConfidence {
    pub blocks: usize,
    pub high_stdev: usize,
    pub invalid: usize,
}

impl SweepConfidence {
    pub fn high_stdev_ratio(&self) -> f64 {
        ratio(self.high_stdev, self.blocks)
    }

    pub fn invalid_ratio(&self) -> f64 {
        ratio(self.invalid, self.blocks)
    }

    /// Whether both ratios are within the allowed bounds
    pub fn is_confident(&self, max_high_stdev: f64, max_invalid: f64) -> bool {
        self.high_stdev_ratio() <= max_high_stdev && self.invalid_ratio() <= max_invalid
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64
}

impl StatTable {
    pub fn new(block_count: usize) -> Self {
        Self {
            blocks: vec![BlockStat::new(); block_count],
        }
    }

    pub fn initialized(&self) -> impl Iterator<Item = (usize, &BlockStat)> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_initialized())
    }

    pub fn invalid_count(&self) -> usize {
        self.initialized().filter(|(_, b)| !b.is_valid()).count()
    }

    pub fn error_count(&self) -> u64 {
        self.blocks.iter().map(|b| u64::from(b.errors())).sum()
    }

    pub fn sample_count(&self) -> usize {
        self.blocks.iter().map(BlockStat::count).sum()
    }

    /// Confidence over the first `upto` blocks
    pub fn sweep_confidence(&self, upto: usize, max_std_dev: f64) -> SweepConfidence {
        let upto = upto.min(self.blocks.len());
        let mut confidence = SweepConfidence {
            blocks: upto,
            ..Default::default()
        };
        for block in &self.blocks[..upto] {
            if block.int_rel_stdev() > max_std_dev {
                confidence.high_stdev += 1;
            }
            if !block.is_valid() {
                confidence.invalid += 1;
            }
        }
        confidence
    }
}

impl Deref for StatTable {
    type Target = [BlockStat];

    fn deref(&self) -> &Self::Target {
        &self.blocks
    }
}

impl DerefMut for StatTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.blocks
    }
}

impl From<Vec<BlockStat>> for StatTable {
    fn from(blocks: Vec<BlockStat>) -> Self {
        Self { blocks }
    }
}

#[cfg(test)]
mod block_stat_tests;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_is_uninitialized() {
        let table = StatTable::new(10);
        assert_eq!(table.len(), 10);
        assert_eq!(table.initialized().count(), 0);
        assert_eq!(table.invalid_count(), 0);
        assert_eq!(table.sample_count(), 0);
    }

    #[test]
    fn test_counts() {
        let mut table = StatTable::new(4);
        table[0].add_time(1.0);
        table[0].make_valid();
        table[1].add_time(2.0);
        table[1].add_time(3.0);
        table[2].add_error();
        table[2].add_error();

        assert_eq!(table.initialized().count(), 3);
        assert_eq!(table.invalid_count(), 2);
        assert_eq!(table.error_count(), 2);
        assert_eq!(table.sample_count(), 3);
    }

    #[test]
    fn test_sweep_confidence() {
        let mut table = StatTable::new(10);
        for (i, block) in table.iter_mut().enumerate() {
            block.make_valid();
            block.add_time(5.0);
            block.add_time(if i < 3 { 50.0 } else { 5.0 });
        }
        table[9].make_invalid();

        let c = table.sweep_confidence(10, 0.5);
        assert_eq!(c.high_stdev, 3);
        assert_eq!(c.invalid, 1);
        assert!(!c.is_confident(0.25, 0.10));
        assert!(c.is_confident(0.30, 0.10));

        let partial = table.sweep_confidence(5, 0.5);
        assert_eq!(partial.blocks, 5);
        assert_eq!(partial.invalid, 0);
    }

    #[test]
    fn test_empty_confidence_is_confident() {
        let table = StatTable::new(0);
        assert!(table.sweep_confidence(0, 0.5).is_confident(0.25, 0.1));
    }
}
