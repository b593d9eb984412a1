/// Adaptive batched re-reads
///
/// The scheduler reads the blocks of a range list in batches, each batch
/// preceded by reads that flush the on-board disk cache and isolate the seek,
/// and followed by two reads that soak up unfinished foreign I/O. Batch
/// length follows an AIMD rule driven by the outcome of the last 16 batches.
pub mod window;

pub use window::{SuccessWindow, WindowDecision};

use crate::config::ScanConfig;
use crate::io::{BlockDevice, BlockRead, IoCounters};
use crate::ranges::BlockRangeList;
use crate::stats::{BlockStat, StatTable};
use crate::ui::Console;
use crate::{is_interrupted, ScanError, ScanResult};
use std::time::{Duration, Instant};

/// Batch length used before any feedback is available
pub const INITIAL_MAX_LEN: u64 = 4;
/// Shortest batch the scheduler shrinks to
pub const MIN_MAX_LEN: u64 = 2;
/// Reads issued after each batch
const TRAILING_READS: u64 = 2;

/// Outcome of one [`ReadScheduler::read_block_list`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadReport {
    pub batches: u64,
    pub failed_batches: u64,
    pub blocks_read: u64,
    pub backoffs: u64,
    pub stopped_early: bool,
}

#[derive(Debug)]
pub struct ReadScheduler {
    max_len: u64,
    max_batch_blocks: u64,
    disk_cache_blocks: u64,
    backoff: Duration,
    window: SuccessWindow,
}

impl ReadScheduler {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            max_len: INITIAL_MAX_LEN,
            max_batch_blocks: config.max_batch_blocks() as u64,
            disk_cache_blocks: config.disk_cache_blocks(),
            backoff: config.backoff,
            window: SuccessWindow::new(),
        }
    }

    /// Current batch length bound
    pub fn max_len(&self) -> u64 {
        self.max_len
    }

    pub fn window(&self) -> &SuccessWindow {
        &self.window
    }

    /// Read one batch of `len` blocks at `offset` with cache flushing.
    ///
    /// Returns fresh per-block statistics, or `None` when foreign I/O was
    /// detected and the whole batch has to be thrown away. Any EIO or short
    /// read in the batch marks every block of it invalid.
    pub fn read_batch(
        &self,
        device: &mut dyn BlockDevice,
        offset: u64,
        len: u64,
    ) -> ScanResult<Option<Vec<BlockStat>>> {
        debug_assert!(len > 0);
        let block_count = device.block_count();
        let before = device.io_counters();
        let mut issued = 0;
        let mut bad_sectors = false;

        // flush the disk cache, then read the block before the batch; the
        // flush never reaches the seek block or the batch itself
        let seek_block = offset.saturating_sub(1);
        let flush_start = offset.saturating_sub(self.disk_cache_blocks + 1);
        let flush_len = self
            .disk_cache_blocks
            .min(block_count.saturating_sub(flush_start))
            .min(seek_block - flush_start);
        let mut lead_in = if flush_len > 0 {
            device.read_n_blocks_at(flush_start, flush_len)?
        } else {
            Vec::new()
        };
        lead_in.extend(device.read_n_blocks_at(seek_block, 1)?);
        issued += flush_len + 1;
        for read in &lead_in {
            match read {
                BlockRead::Complete { .. } => {}
                BlockRead::IoError { .. } => bad_sectors = true,
                BlockRead::Short { .. } => {
                    tracing::debug!(offset, "lead-in read came back short");
                    return Ok(None);
                }
            }
        }

        let reads = device.read_n_blocks_at(offset, len)?;
        if reads.len() as u64 != len {
            return Err(ScanError::WrongOffset {
                expected: offset + len,
                actual: offset + reads.len() as u64,
            });
        }
        issued += len;

        let mut blocks = vec![BlockStat::new(); reads.len()];
        for (block, read) in blocks.iter_mut().zip(&reads) {
            match *read {
                BlockRead::Complete { latency_ms } => {
                    block.make_valid();
                    block.add_time(latency_ms);
                }
                BlockRead::IoError { .. } => {
                    block.add_error();
                    bad_sectors = true;
                }
                BlockRead::Short { .. } => bad_sectors = true,
            }
        }

        let trailing = TRAILING_READS.min(block_count.saturating_sub(offset + len));
        if trailing > 0 {
            device.read_n_blocks_at(offset + len, trailing)?;
            issued += trailing;
        }

        if !bad_sectors {
            if let (Some(before), Some(after)) = (before, device.io_counters()) {
                if foreign_io(&after.since(&before), issued, device.is_direct()) {
                    tracing::debug!(offset, len, issued, "batch interrupted by foreign I/O");
                    return Ok(None);
                }
            }
        } else {
            tracing::warn!(offset, len, "bad sectors in batch, timings not trusted");
            for block in &mut blocks {
                block.make_invalid();
            }
        }
        Ok(Some(blocks))
    }

    /// Re-read every block of `list` and merge the results into `stats`.
    ///
    /// The batch length carries over between calls. Stops early when the
    /// process is interrupted.
    pub fn read_block_list(
        &mut self,
        device: &mut dyn BlockDevice,
        stats: &mut StatTable,
        list: &BlockRangeList,
        console: &mut Console,
    ) -> ScanResult<ReadReport> {
        let mut report = ReadReport::default();
        if list.is_empty() {
            return Ok(report);
        }

        let started = Instant::now();
        let total = list.block_count();
        let mut work = list.compact(self.max_len * 2);
        let mut next = 0;
        while next < work.len() {
            if is_interrupted() {
                report.stopped_early = true;
                break;
            }

            let range = work[next];
            tracing::trace!(offset = range.offset, length = range.length, "reading batch");
            let result = self.read_batch(device, range.offset, range.length)?;
            let success = result.as_ref().is_some_and(|blocks| blocks[0].is_valid());

            report.batches += 1;
            report.blocks_read += range.length;
            if !success {
                report.failed_batches += 1;
                tracing::debug!(offset = range.offset, length = range.length, "re-read interrupted");
            }
            if let Some(blocks) = result {
                for (i, block) in blocks.iter().enumerate() {
                    if let Some(stat) = stats.get_mut(range.offset as usize + i) {
                        stat.add_valid(block);
                    }
                }
            }
            next += 1;
            console.reread_progress(report.blocks_read.min(total), total, started.elapsed());

            self.window.record(success);
            let resume = range.end();
            match self.window.decision() {
                WindowDecision::Backoff => {
                    report.backoffs += 1;
                    tracing::info!(
                        backoff_ms = self.backoff.as_millis() as u64,
                        "all recent batches failed, letting pending I/O settle"
                    );
                    std::thread::sleep(self.backoff);
                }
                WindowDecision::Shrink if self.max_len > MIN_MAX_LEN => {
                    self.max_len /= 2;
                    work = list.compact(self.max_len);
                    next = work.position_after(resume);
                    self.window.adjusted();
                    tracing::debug!(max_len = self.max_len, "shrinking batches");
                }
                WindowDecision::Grow if self.max_len < self.max_batch_blocks => {
                    self.max_len *= 2;
                    work = list.compact(self.max_len);
                    next = work.position_after(resume);
                    self.window.adjusted();
                    tracing::debug!(max_len = self.max_len, "growing batches");
                }
                _ => {}
            }
        }
        console.finish_line();

        tracing::info!(
            batches = report.batches,
            failed = report.failed_batches,
            blocks = report.blocks_read,
            max_len = self.max_len,
            "re-read pass finished"
        );
        Ok(report)
    }
}

/// Counter deltas that cannot be explained by the reads we issued
fn foreign_io(delta: &IoCounters, issued: u64, direct: bool) -> bool {
    let reads_off = if direct {
        delta.reads != issued
    } else {
        delta.reads > issued * 4
    };
    reads_off || delta.writes != 0
}
