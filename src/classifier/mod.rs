/// Bad and uncertain block detection
///
/// The classifier walks the stat table in block order and decides per block
/// whether it is fine, needs more reads (uncertain) or is bad. Two rule sets
/// exist: the default decile cascade, which demands more evidence the slower a
/// block claims to be, and the classic mean/stdev rules with a lone-sample
/// neighbour check. Flagged blocks are emitted as single-block ranges in
/// ascending order; callers compact them when they want batches.
pub mod classic;
pub mod quick;

pub use quick::QuickSelector;

use crate::config::{ClassifierKind, ClassifierTuning, ScanConfig, SpeedThresholds};
use crate::ranges::{BlockRange, BlockRangeList};
use crate::stats::BlockStat;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Fine,
    Uncertain,
    Bad,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Fine => write!(f, "fine"),
            Verdict::Uncertain => write!(f, "uncertain"),
            Verdict::Bad => write!(f, "bad"),
        }
    }
}

/// What a classification run is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Search {
    /// Presume blocks whose every read is well under one revolution good
    pub soft_delay: bool,
    /// Final pass: report blocks that are bad, not only those needing reads
    pub certain_bad: bool,
}

impl Search {
    /// Re-read phase search
    pub const UNCERTAIN: Search = Search {
        soft_delay: true,
        certain_bad: false,
    };

    /// Final report search
    pub const CERTAIN_BAD: Search = Search {
        soft_delay: false,
        certain_bad: true,
    };
}

#[derive(Debug, Clone)]
pub struct Classifier {
    kind: ClassifierKind,
    thresholds: SpeedThresholds,
    tuning: ClassifierTuning,
    min_reads: usize,
    max_std_dev: f64,
}

impl Classifier {
    pub fn new(thresholds: SpeedThresholds, min_reads: usize, max_std_dev: f64) -> Self {
        Self {
            kind: ClassifierKind::Decile,
            thresholds,
            tuning: ClassifierTuning::default(),
            min_reads,
            max_std_dev,
        }
    }

    pub fn from_config(config: &ScanConfig, thresholds: SpeedThresholds) -> Self {
        Self::new(thresholds, config.min_reads, config.max_std_dev)
            .with_kind(config.classifier)
            .with_tuning(config.tuning.clone())
    }

    pub fn with_kind(mut self, kind: ClassifierKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_tuning(mut self, tuning: ClassifierTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn thresholds(&self) -> &SpeedThresholds {
        &self.thresholds
    }

    pub fn tuning(&self) -> &ClassifierTuning {
        &self.tuning
    }

    pub fn min_reads(&self) -> usize {
        self.min_reads
    }

    /// Blocks that still need reads, `None` when there are none
    pub fn find_uncertain_blocks(&self, stats: &mut [BlockStat]) -> Option<BlockRangeList> {
        self.find_bad_blocks(stats, Search::UNCERTAIN)
    }

    /// Run the configured rule set over the whole table.
    ///
    /// Returns `None` when no block matches.
    pub fn find_bad_blocks(
        &self,
        stats: &mut [BlockStat],
        search: Search,
    ) -> Option<BlockRangeList> {
        let mut flagged = BlockRangeList::new();
        for index in 0..stats.len() {
            if self.classify(stats, index, search) != Verdict::Fine {
                flagged.push(BlockRange::single(index as u64));
            }
        }

        tracing::debug!(
            flagged = flagged.len(),
            certain_bad = search.certain_bad,
            "classification finished"
        );
        (!flagged.is_empty()).then_some(flagged)
    }

    /// Verdict for a single block
    pub fn classify(&self, stats: &mut [BlockStat], index: usize, search: Search) -> Verdict {
        match self.kind {
            ClassifierKind::Decile => self.decile_verdict(&mut stats[index], search),
            ClassifierKind::Classic => classic::verdict(self, stats, index, search),
        }
    }

    /// Rules 1 to 3 shared by both rule sets. `Some` ends the cascade.
    fn screen(&self, block: &BlockStat, search: Search) -> Option<Verdict> {
        if !block.is_initialized() {
            return Some(Verdict::Fine);
        }
        if block.count() < self.min_reads || !block.is_valid() {
            return Some(Verdict::Uncertain);
        }
        if search.soft_delay && self.soft_delay_suppressed(block) {
            return Some(Verdict::Fine);
        }
        None
    }

    /// High relative stdev of very fast reads is measurement noise
    fn soft_delay_suppressed(&self, block: &BlockStat) -> bool {
        let fast = self.thresholds.fast;
        let n = block.count();
        let max = block.max();
        (n > 2 && max < fast / 2.0)
            || (n > 1 && max < fast && block.int_rel_stdev() < self.max_std_dev * 2.0)
    }

    fn decile_verdict(&self, block: &mut BlockStat, search: Search) -> Verdict {
        if let Some(verdict) = self.screen(block, search) {
            return verdict;
        }
        if !search.certain_bad && block.int_rel_stdev() <= self.max_std_dev {
            return Verdict::Fine;
        }

        let t = &self.thresholds;
        let decile = block.decile();
        if decile < t.fast {
            return Verdict::Fine;
        }

        // slower claims need deeper evidence
        let required = if decile >= t.vslow {
            self.tuning.vslow_depth
        } else if decile >= t.slow {
            self.tuning.slow_depth
        } else if decile >= t.normal {
            self.tuning.normal_depth
        } else {
            0
        };
        let n = block.count();
        if n < required {
            return Verdict::Uncertain;
        }

        if n >= self.tuning.certain_depth {
            return if search.certain_bad {
                Verdict::Bad
            } else {
                Verdict::Fine
            };
        }
        if !search.certain_bad {
            return Verdict::Uncertain;
        }

        match n {
            0..=2 => {
                if block.min() >= t.fast {
                    Verdict::Bad
                } else {
                    Verdict::Uncertain
                }
            }
            3 => {
                let median = block.quantile_exact(1, 2);
                let lower_quartile = block.quantile_exact(1, 4);
                if median < t.fast {
                    // one slow read out of three is a fluke
                    Verdict::Fine
                } else if lower_quartile >= t.fast {
                    Verdict::Bad
                } else {
                    Verdict::Uncertain
                }
            }
            4 | 5 => {
                let median = block.quantile(1, 2);
                let lower_quartile = block.quantile(1, 4);
                let max = block.max();
                if median < t.fast && max < t.normal {
                    Verdict::Fine
                } else if lower_quartile >= t.fast {
                    Verdict::Bad
                } else if max > median * 2.0 {
                    Verdict::Uncertain
                } else {
                    Verdict::Bad
                }
            }
            _ => Verdict::Bad,
        }
    }
}

#[cfg(test)]
mod classifier_tests;
