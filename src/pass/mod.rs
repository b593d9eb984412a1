/// Scan orchestration
///
/// A scan is a sequence of whole-device sweeps until the timings are
/// trustworthy, followed by rounds of targeted re-reads of the blocks the
/// classifier is unsure about, and a final strict classification that yields
/// the reported bad blocks. With an input range list the sweeps are replaced
/// by batched reads of just those ranges.
pub mod sweep;

pub use sweep::{SweepReport, SweepState};

use crate::classifier::{Classifier, QuickSelector, Search};
use crate::config::{ScanConfig, SpeedThresholds};
use crate::io::BlockDevice;
use crate::ranges::{BlockRange, BlockRangeList};
use crate::scheduler::ReadScheduler;
use crate::stats::StatTable;
use crate::ui::{Console, SweepStatus};
use crate::{is_interrupted, ScanError, ScanResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Totals of the targeted re-read phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReReadReport {
    pub rounds: usize,
    pub batches: u64,
    pub failed_batches: u64,
    pub blocks_read: u64,
    /// Uncertain blocks left when the phase ended
    pub remaining: usize,
}

impl ReReadReport {
    pub fn converged(&self) -> bool {
        self.remaining == 0
    }
}

/// Everything a finished (or interrupted) scan produced
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub stats: StatTable,
    /// Result of the final strict classification, one range per block
    pub bad_blocks: BlockRangeList,
    pub sweep: SweepReport,
    pub re_reads: ReReadReport,
    pub sectors_per_block: u64,
    pub interrupted: bool,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub wall_time: Duration,
}

pub struct PassController {
    config: ScanConfig,
    thresholds: SpeedThresholds,
    classifier: Classifier,
    scheduler: ReadScheduler,
    console: Console,
}

impl PassController {
    /// Controller for a validated configuration, printing to the terminal
    pub fn new(config: ScanConfig) -> ScanResult<Self> {
        let config = config.validate()?;
        let thresholds = config.thresholds()?;
        Ok(Self {
            classifier: Classifier::from_config(&config, thresholds),
            scheduler: ReadScheduler::new(&config),
            console: Console::new(&config, thresholds),
            thresholds,
            config,
        })
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &SpeedThresholds {
        &self.thresholds
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    /// Full scan: sweeps, re-reads, final classification
    pub fn run(&mut self, device: &mut dyn BlockDevice) -> ScanResult<ScanOutcome> {
        let started = Utc::now();
        let clock = Instant::now();
        let mut stats = new_table(device)?;
        tracing::info!(
            started = %started.to_rfc3339(),
            blocks = device.block_count(),
            min_reads = self.config.min_reads,
            max_reads = self.config.max_reads,
            "scan started"
        );

        let sweep = self.read_whole_disk(device, &mut stats)?;
        let re_reads = self.perform_re_reads(device, &mut stats)?;
        Ok(self.finish(device, stats, sweep, re_reads, started, clock))
    }

    /// Scan only the given block ranges, `min_reads` times each, then re-read
    pub fn run_ranges(
        &mut self,
        device: &mut dyn BlockDevice,
        ranges: &BlockRangeList,
    ) -> ScanResult<ScanOutcome> {
        let started = Utc::now();
        let clock = Instant::now();
        let mut stats = new_table(device)?;
        let ranges = clip_ranges(ranges, device.block_count());
        tracing::info!(
            started = %started.to_rfc3339(),
            ranges = ranges.len(),
            blocks = ranges.block_count(),
            "range scan started"
        );

        let mut sweep = SweepReport::default();
        for pass in 1..=self.config.min_reads {
            if is_interrupted() {
                sweep.stopped_early = true;
                break;
            }
            self.console.message(&format!(
                "Reading listed ranges, pass {} of {}",
                pass, self.config.min_reads
            ));
            let report =
                self.scheduler
                    .read_block_list(device, &mut stats, &ranges, &mut self.console)?;
            sweep.loops = pass;
            sweep.blocks_read += report.blocks_read;
            sweep.stopped_early |= report.stopped_early;
        }
        sweep.confident = !sweep.stopped_early;

        let re_reads = self.perform_re_reads(device, &mut stats)?;
        Ok(self.finish(device, stats, sweep, re_reads, started, clock))
    }

    /// Repeat whole-device sweeps until the timings are trustworthy.
    ///
    /// Stops after `min_reads` loops once few blocks have a high relative
    /// stdev and few are invalid, or after `max_reads` loops with a warning.
    pub fn read_whole_disk(
        &mut self,
        device: &mut dyn BlockDevice,
        stats: &mut StatTable,
    ) -> ScanResult<SweepReport> {
        let block_count = device.block_count();
        if stats.len() as u64 != block_count {
            return Err(ScanError::InvalidConfig(format!(
                "stat table has {} blocks, device has {}",
                stats.len(),
                block_count
            )));
        }

        let tuning = self.config.tuning.clone();
        let mut report = SweepReport::default();
        loop {
            if is_interrupted() {
                report.stopped_early = true;
                break;
            }
            let loop_index = report.loops + 1;
            let loop_start = Utc::now();
            tracing::info!(loop_index, started = %loop_start.to_rfc3339(), "sweep started");

            // park the head at the start of the device
            device.read_n_blocks_at(0, 1)?;

            let mut state = SweepState::new(tuning.back_invalidation);
            let clock = Instant::now();
            for block in 0..block_count {
                if is_interrupted() {
                    report.stopped_early = true;
                    break;
                }
                let before = device.io_counters();
                let reads = device.read_n_blocks_at(block, 1)?;
                let Some(read) = reads.first() else {
                    return Err(ScanError::WrongOffset {
                        expected: block + 1,
                        actual: block,
                    });
                };
                let delta = before
                    .zip(device.io_counters())
                    .map(|(before, after)| after.since(&before));

                self.console.sector(block, read, delta);
                let interrupted = sweep::is_interrupted_read(
                    read,
                    delta.as_ref(),
                    device.is_direct(),
                    device.sectors_per_block(),
                );
                state.record(stats, block as usize, read, interrupted);
                report.blocks_read += 1;

                self.console.sweep_status(
                    &self.status(loop_index, block + 1, block_count, clock.elapsed()),
                    block + 1 == block_count,
                );
            }
            self.console.end_sweep();
            report.interrupted_reads += state.interrupted_reads();
            report.errors += state.errors();
            if report.stopped_early {
                break;
            }
            report.loops = loop_index;

            let confidence = stats.sweep_confidence(block_count as usize, self.config.max_std_dev);
            report.confidence = confidence;
            tracing::info!(
                loop_index,
                high_stdev = confidence.high_stdev,
                invalid = confidence.invalid,
                elapsed_ms = clock.elapsed().as_millis() as u64,
                "sweep finished"
            );

            let confident = confidence.is_confident(tuning.high_stdev_ratio, tuning.invalid_ratio);
            if report.loops >= self.config.min_reads && confident {
                report.confident = true;
                break;
            }
            if report.loops >= self.config.max_reads {
                tracing::warn!(
                    loops = report.loops,
                    high_stdev_ratio = confidence.high_stdev_ratio(),
                    invalid_ratio = confidence.invalid_ratio(),
                    "sweeps did not reach stable timings, results may be unreliable"
                );
                break;
            }
        }
        Ok(report)
    }

    /// Re-read uncertain blocks until none are left or the budget is spent
    pub fn perform_re_reads(
        &mut self,
        device: &mut dyn BlockDevice,
        stats: &mut StatTable,
    ) -> ScanResult<ReReadReport> {
        let budget = self.config.re_read_budget();
        let mut report = ReReadReport::default();
        let mut quick = QuickSelector::new();

        for round in 1..=budget {
            if is_interrupted() {
                break;
            }
            let selected = if self.config.quick {
                quick.select(&self.classifier, stats)
            } else {
                self.classifier.find_uncertain_blocks(stats)
            };
            let Some(list) = selected else {
                tracing::info!(round, "no uncertain blocks left");
                return Ok(report);
            };

            tracing::info!(round, budget, blocks = list.len(), "re-reading uncertain blocks");
            self.console.message(&format!(
                "Re-read {} of {}: {} uncertain blocks",
                round,
                budget,
                list.len()
            ));
            let batch = self
                .scheduler
                .read_block_list(device, stats, &list, &mut self.console)?;
            report.rounds = round;
            report.batches += batch.batches;
            report.failed_batches += batch.failed_batches;
            report.blocks_read += batch.blocks_read;
        }

        report.remaining = self
            .classifier
            .find_uncertain_blocks(stats)
            .map_or(0, |list| list.len());
        if report.remaining > 0 && !is_interrupted() {
            tracing::warn!(
                remaining = report.remaining,
                rounds = report.rounds,
                "re-read budget exhausted with uncertain blocks left"
            );
        }
        Ok(report)
    }

    /// Strict classification whose result is the reported bad block list
    pub fn final_classification(&self, stats: &mut StatTable) -> BlockRangeList {
        self.classifier
            .find_bad_blocks(stats, Search::CERTAIN_BAD)
            .unwrap_or_default()
    }

    fn finish(
        &mut self,
        device: &dyn BlockDevice,
        mut stats: StatTable,
        sweep: SweepReport,
        re_reads: ReReadReport,
        started: DateTime<Utc>,
        clock: Instant,
    ) -> ScanOutcome {
        let bad_blocks = self.final_classification(&mut stats);
        let interrupted = is_interrupted();
        if interrupted {
            tracing::warn!("scan interrupted, results are partial");
        }
        let finished = Utc::now();
        tracing::info!(
            finished = %finished.to_rfc3339(),
            bad_blocks = bad_blocks.len(),
            errors = stats.error_count(),
            "scan finished"
        );
        ScanOutcome {
            stats,
            bad_blocks,
            sweep,
            re_reads,
            sectors_per_block: device.sectors_per_block(),
            interrupted,
            started,
            finished,
            wall_time: clock.elapsed(),
        }
    }

    fn status(
        &self,
        loop_index: usize,
        blocks_done: u64,
        block_count: u64,
        elapsed: Duration,
    ) -> SweepStatus {
        SweepStatus {
            loop_index,
            min_loops: self.config.min_reads,
            max_loops: self.config.max_reads,
            blocks_done,
            block_count,
            sectors_per_block: self.config.sectors_per_block,
            sector_size: self.config.sector_size,
            elapsed,
        }
    }
}

fn new_table(device: &dyn BlockDevice) -> ScanResult<StatTable> {
    let blocks = usize::try_from(device.block_count()).map_err(|_| {
        ScanError::InvalidConfig(format!(
            "device of {} blocks does not fit in memory",
            device.block_count()
        ))
    })?;
    Ok(StatTable::new(blocks))
}

/// Drop the parts of `ranges` past the end of the device
fn clip_ranges(ranges: &BlockRangeList, block_count: u64) -> BlockRangeList {
    let clipped: BlockRangeList = ranges
        .iter()
        .filter(|r| r.offset < block_count)
        .map(|r| BlockRange::new(r.offset, r.end().min(block_count) - r.offset))
        .collect();
    if clipped.block_count() < ranges.block_count() {
        tracing::warn!(
            dropped = ranges.block_count() - clipped.block_count(),
            block_count,
            "listed ranges extend past the end of the device"
        );
    }
    clipped
}
