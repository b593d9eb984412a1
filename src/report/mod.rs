/// Scan results for humans and machines
///
/// The summary condenses the stat table into a speed histogram of per-block
/// averages and a disk verdict. The detailed stats file and the JSON report
/// live in their own modules.
pub mod json;
pub mod stats_file;

pub use json::{write_json_report, JsonReport};
pub use stats_file::write_stats_file;

use crate::config::{SpeedBucket, SpeedThresholds};
use crate::pass::ScanOutcome;
use crate::ranges::BlockRangeList;
use crate::stats::{BlockStat, StatTable};
use colored::Colorize;
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

/// Block (or sample) counts per speed bucket plus the blocks that saw EIO
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpeedHistogram {
    pub buckets: [u64; 7],
    pub errors: u64,
}

impl SpeedHistogram {
    pub fn count(&self, bucket: SpeedBucket) -> u64 {
        self.buckets[bucket.index()]
    }

    /// Histogram of per-block intelligent averages; blocks with errors
    /// count as errors only
    pub fn of_blocks(stats: &StatTable, thresholds: &SpeedThresholds) -> Self {
        let mut histogram = Self::default();
        for (_, block) in stats.initialized() {
            if block.errors() > 0 {
                histogram.errors += 1;
            } else if block.count() > 0 {
                histogram.buckets[thresholds.bucket(block.int_average()).index()] += 1;
            }
        }
        histogram
    }

    /// Histogram of every individual sample
    pub fn of_samples(stats: &StatTable, thresholds: &SpeedThresholds) -> Self {
        let mut histogram = Self::default();
        for block in stats.iter() {
            for &sample in block.samples() {
                histogram.buckets[thresholds.bucket(sample).index()] += 1;
            }
            histogram.errors += u64::from(block.errors());
        }
        histogram
    }
}

/// Overall health assessment, worst first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskVerdict {
    Failed,
    Critical,
    VeryBad,
    Bad,
    Moderate,
    Good,
    VeryGood,
    Excellent,
}

impl DiskVerdict {
    /// First matching rule wins
    pub fn assess(histogram: &SpeedHistogram, blocks: u64) -> Self {
        let share = |count: u64| {
            if blocks == 0 {
                0.0
            } else {
                count as f64 / blocks as f64
            }
        };
        let normal = histogram.count(SpeedBucket::Normal);
        let fast = histogram.count(SpeedBucket::Fast);

        if histogram.errors > 0 {
            DiskVerdict::Failed
        } else if histogram.count(SpeedBucket::VeryVerySlow) > 0 {
            DiskVerdict::Critical
        } else if histogram.count(SpeedBucket::VerySlow) > 0 {
            DiskVerdict::VeryBad
        } else if histogram.count(SpeedBucket::Slow) > 0 {
            DiskVerdict::Bad
        } else if share(normal) > 0.001 {
            DiskVerdict::Moderate
        } else if normal == 0 && share(fast) < 0.1 {
            DiskVerdict::Excellent
        } else if normal == 0 {
            DiskVerdict::VeryGood
        } else {
            DiskVerdict::Good
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DiskVerdict::Failed => {
                "CAUTION! Bad sectors detected, copy data off this disk AS SOON AS POSSIBLE!"
            }
            DiskVerdict::Critical => {
                "Sectors that required more than 6 read attempts detected, drive may be ALREADY FAILING!"
            }
            DiskVerdict::VeryBad => "Sectors that required more than 4 read attempts detected",
            DiskVerdict::Bad => "Sectors that required more than 2 read attempts detected",
            DiskVerdict::Moderate => {
                "High number of blocks that required more than 1 read attempt detected"
            }
            DiskVerdict::Good => "Few blocks that required more than 1 read attempt detected",
            DiskVerdict::VeryGood | DiskVerdict::Excellent => {
                "No blocks that required constant re-reads detected"
            }
        }
    }

    /// At or below `Bad` the disk needs attention
    pub fn is_alarming(&self) -> bool {
        *self <= DiskVerdict::Bad
    }
}

impl fmt::Display for DiskVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiskVerdict::Failed => "FAILED",
            DiskVerdict::Critical => "CRITICAL",
            DiskVerdict::VeryBad => "very bad",
            DiskVerdict::Bad => "bad",
            DiskVerdict::Moderate => "moderate",
            DiskVerdict::Good => "good",
            DiskVerdict::VeryGood => "very good",
            DiskVerdict::Excellent => "excellent",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub wall_time: Duration,
    /// Sum of every sample (ms)
    pub sample_time_ms: f64,
    pub tested_blocks: u64,
    pub errors: u64,
    pub samples: u64,
    /// Mean and stdev over the per-block intelligent averages (ms)
    pub mean_block_ms: f64,
    pub block_stdev_ms: f64,
    pub invalid_blocks: u64,
    pub bad_blocks: u64,
    pub thresholds: SpeedThresholds,
    pub histogram: SpeedHistogram,
    pub raw_histogram: SpeedHistogram,
    pub verdict: DiskVerdict,
}

impl ScanSummary {
    pub fn from_outcome(outcome: &ScanOutcome, thresholds: &SpeedThresholds) -> Self {
        let stats = &outcome.stats;
        let mut block_means = BlockStat::new();
        let mut tested_blocks = 0;
        for (_, block) in stats.initialized() {
            tested_blocks += 1;
            if block.count() > 0 {
                block_means.add_time(block.int_average());
            }
        }
        let histogram = SpeedHistogram::of_blocks(stats, thresholds);

        Self {
            wall_time: outcome.wall_time,
            sample_time_ms: stats.iter().map(BlockStat::sum).sum(),
            tested_blocks,
            errors: stats.error_count(),
            samples: stats.sample_count() as u64,
            mean_block_ms: block_means.average(),
            block_stdev_ms: block_means.stdev(),
            invalid_blocks: stats.invalid_count() as u64,
            bad_blocks: outcome.bad_blocks.block_count(),
            thresholds: *thresholds,
            histogram,
            raw_histogram: SpeedHistogram::of_samples(stats, thresholds),
            verdict: DiskVerdict::assess(&histogram, tested_blocks),
        }
    }

    /// Human-readable summary; the per-sample histogram only when `raw`
    pub fn write_to(&self, out: &mut impl Write, raw: bool) -> io::Result<()> {
        writeln!(out, "Wall time: {}", rounded(self.wall_time))?;
        writeln!(
            out,
            "Sum time: {}",
            rounded(Duration::from_secs_f64(self.sample_time_ms.max(0.0) / 1000.0))
        )?;
        writeln!(
            out,
            "Tested {} blocks ({} errors, {} samples)",
            self.tested_blocks, self.errors, self.samples
        )?;
        writeln!(
            out,
            "Mean block time: {:.2} ms, std dev: {:.2} ms",
            self.mean_block_ms, self.block_stdev_ms
        )?;
        writeln!(out, "Number of invalid blocks: {}", self.invalid_blocks)?;
        writeln!(out, "Number of suspect blocks: {}", self.bad_blocks)?;

        writeln!(out, "\nBlocks by average read time:")?;
        self.write_histogram(out, &self.histogram)?;
        if raw {
            writeln!(out, "\nIndividual samples:")?;
            self.write_histogram(out, &self.raw_histogram)?;
        }

        let verdict = format!("{}", self.verdict);
        let verdict = if self.verdict.is_alarming() {
            verdict.red().bold()
        } else {
            verdict.green().bold()
        };
        writeln!(out, "\nDisk status: {}", verdict)?;
        writeln!(out, "{}", self.verdict.message())
    }

    fn write_histogram(&self, out: &mut impl Write, histogram: &SpeedHistogram) -> io::Result<()> {
        let t = &self.thresholds;
        let upper = [t.vvfast, t.vfast, t.fast, t.normal, t.slow, t.vslow];
        for bucket in SpeedBucket::ALL {
            let label = match upper.get(bucket.index()) {
                Some(limit) => format!("<  {:>7.2} ms", limit),
                None => format!(">= {:>7.2} ms", t.vslow),
            };
            writeln!(
                out,
                "  {} {}: {}",
                bucket.symbol(),
                label,
                histogram.count(bucket)
            )?;
        }
        writeln!(out, "  ERR           : {}", histogram.errors)
    }
}

/// Round to whole milliseconds for display
fn rounded(duration: Duration) -> humantime::FormattedDuration {
    humantime::format_duration(Duration::from_millis(duration.as_millis() as u64))
}

/// One line per flagged block with its statistics
pub fn write_bad_blocks(
    out: &mut impl Write,
    stats: &StatTable,
    bad_blocks: &BlockRangeList,
    sectors_per_block: u64,
) -> io::Result<()> {
    for index in bad_blocks.blocks() {
        let Some(block) = stats.get(index as usize) else {
            continue;
        };
        writeln!(out, "{}", block_line(index, block, sectors_per_block))?;
    }
    Ok(())
}

fn block_line(index: u64, block: &BlockStat, sectors_per_block: u64) -> String {
    let samples: Vec<String> = block.samples().iter().map(|s| format!("{s:.2}")).collect();
    format!(
        "block {} (LBA {}-{}): rel stdev {:.2}, avg {:.2} ms, {}, {} errors, samples [{}]",
        index,
        index * sectors_per_block,
        (index + 1) * sectors_per_block,
        block.int_rel_stdev(),
        block.int_average(),
        if block.is_valid() { "valid" } else { "invalid" },
        block.errors(),
        samples.join(", ")
    )
}
