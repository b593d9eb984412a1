/// Block ranges and range lists
///
/// A [`BlockRangeList`] is the unit of work handed from the classifier to the
/// read scheduler: ascending, explicit-length, and possibly starting at
/// block 0.
pub mod file;

pub use file::{read_range_file, write_range_file};

use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Contiguous run of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub offset: u64,
    pub length: u64,
}

impl BlockRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub fn single(offset: u64) -> Self {
        Self { offset, length: 1 }
    }

    /// One past the last block of the range
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    pub fn blocks(&self) -> std::ops::Range<u64> {
        self.offset..self.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRangeList {
    ranges: Vec<BlockRange>,
}

impl BlockRangeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, range: BlockRange) {
        self.ranges.push(range);
    }

    /// Total number of blocks covered (overlaps counted twice)
    pub fn block_count(&self) -> u64 {
        self.ranges.iter().map(|r| r.length).sum()
    }

    /// Every block index, in list order
    pub fn blocks(&self) -> impl Iterator<Item = u64> + '_ {
        self.ranges.iter().flat_map(BlockRange::blocks)
    }

    /// Merge nearby ranges into longer runs.
    ///
    /// The list must be sorted by offset. A range is folded into the run
    /// before it when it overlaps that run or starts at most `glob` blocks
    /// after the run's first block, so `glob` also bounds how long a merged
    /// run grows. `glob == 1` keeps the list as is.
    pub fn compact(&self, glob: u64) -> BlockRangeList {
        if glob == 1 {
            return self.clone();
        }

        let mut out: Vec<BlockRange> = Vec::with_capacity(self.ranges.len());
        for range in &self.ranges {
            match out.last_mut() {
                Some(run) if range.offset < run.end() => {
                    run.length = run.end().max(range.end()) - run.offset;
                }
                Some(run) if range.offset <= run.offset + glob => {
                    run.length = range.end() - run.offset;
                }
                _ => out.push(*range),
            }
        }
        BlockRangeList { ranges: out }
    }

    /// Index of the first range ending after `block`
    pub fn position_after(&self, block: u64) -> usize {
        self.ranges
            .iter()
            .position(|r| r.end() > block)
            .unwrap_or(self.ranges.len())
    }
}

impl Deref for BlockRangeList {
    type Target = [BlockRange];

    fn deref(&self) -> &Self::Target {
        &self.ranges
    }
}

impl FromIterator<BlockRange> for BlockRangeList {
    fn from_iter<I: IntoIterator<Item = BlockRange>>(iter: I) -> Self {
        Self {
            ranges: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<BlockRange>> for BlockRangeList {
    fn from(ranges: Vec<BlockRange>) -> Self {
        Self { ranges }
    }
}

impl<'a> IntoIterator for &'a BlockRangeList {
    type Item = &'a BlockRange;
    type IntoIter = std::slice::Iter<'a, BlockRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}
