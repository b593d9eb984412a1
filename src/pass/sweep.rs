use crate::io::{BlockRead, IoCounters};
use crate::stats::{BlockStat, SweepConfidence};
use serde::Serialize;
use std::collections::VecDeque;

/// Totals of the whole-device sweeps
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SweepReport {
    /// Completed loops
    pub loops: usize,
    pub blocks_read: u64,
    pub interrupted_reads: u64,
    pub errors: u64,
    /// Sweeps ended because the timings were stable
    pub confident: bool,
    pub stopped_early: bool,
    /// Figures after the last completed loop
    pub confidence: SweepConfidence,
}

/// Whether a sweep read overlapped with foreign I/O.
///
/// Direct reads must show exactly one read of one block; buffered reads may
/// be split by the kernel, so only gross excess counts.
pub fn is_interrupted_read(
    read: &BlockRead,
    delta: Option<&IoCounters>,
    direct: bool,
    sectors_per_block: u64,
) -> bool {
    if let BlockRead::Short { .. } = read {
        return true;
    }
    let Some(delta) = delta else {
        return false;
    };
    let reads_off = if direct {
        delta.reads != 1 || delta.sectors_read != sectors_per_block
    } else {
        delta.reads > 4
    };
    reads_off || delta.writes != 0
}

/// Sample acceptance during one sweep loop
#[derive(Debug)]
pub struct SweepState {
    next_is_valid: bool,
    /// Blocks whose valid sample from this loop may have to be taken back
    recent: VecDeque<usize>,
    window: usize,
    interrupted_reads: u64,
    errors: u64,
}

impl SweepState {
    pub fn new(back_invalidation: usize) -> Self {
        Self {
            next_is_valid: true,
            recent: VecDeque::with_capacity(back_invalidation),
            window: back_invalidation,
            interrupted_reads: 0,
            errors: 0,
        }
    }

    pub fn interrupted_reads(&self) -> u64 {
        self.interrupted_reads
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Fold one sweep read of block `index` into `stats`.
    ///
    /// - EIO: counted, the samples already taken stay
    /// - interrupted: invalid blocks keep the timing, valid ones don't, and
    ///   the samples this loop gave to the preceding blocks are withdrawn
    /// - clean after clean: appended; the first one also turns an invalid
    ///   block valid, dropping its old timings
    /// - clean right after an interruption: appended to invalid blocks only
    pub fn record(
        &mut self,
        stats: &mut [BlockStat],
        index: usize,
        read: &BlockRead,
        interrupted: bool,
    ) {
        if let BlockRead::IoError { .. } = read {
            tracing::warn!(block = index, "I/O error during sweep");
            let stat = &mut stats[index];
            stat.add_error();
            self.errors += 1;
            return;
        }

        let latency_ms = read.latency_ms();
        if interrupted {
            self.interrupted_reads += 1;
            tracing::debug!(block = index, latency_ms, "sweep read interrupted");
            if !stats[index].is_valid() {
                stats[index].add_time(latency_ms);
            }
            self.next_is_valid = false;
            // an interruption slows down the reads queued before it
            for i in self.recent.drain(..) {
                if stats[i].is_valid() {
                    stats[i].remove_last();
                }
            }
            return;
        }

        let stat = &mut stats[index];
        if !stat.is_valid() {
            if self.next_is_valid {
                stat.clear();
                stat.make_valid();
            }
            stat.add_time(latency_ms);
            if stat.is_valid() {
                self.remember(index);
            }
        } else if self.next_is_valid {
            stat.add_time(latency_ms);
            self.remember(index);
        }
        self.next_is_valid = true;
    }

    fn remember(&mut self, index: usize) {
        if self.window == 0 {
            return;
        }
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(index);
    }
}
