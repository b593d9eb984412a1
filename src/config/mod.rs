/// Scan configuration
///
/// Everything the scan needs to know is collected into one immutable
/// [`ScanConfig`] built at startup and handed by reference to the device
/// layer, the classifier, the scheduler and the pass controller.
use crate::{ScanError, ScanResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SECTORS_PER_BLOCK: u64 = 256;
pub const SECTOR_SIZE: u64 = 512;
pub const DEFAULT_DISK_CACHE_MIB: u64 = 32;
pub const DEFAULT_DISK_RPM: u32 = 7200;
/// Upper bound on the number of bytes read in one scheduler batch
pub const DEFAULT_MAX_BATCH_BYTES: u64 = 64 * 1024 * 1024;

/// Latency buckets derived from the rotational delay of the disk (ms)
///
/// A read shorter than one revolution is "fast"; every further bucket
/// roughly corresponds to another read attempt the drive had to make.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedThresholds {
    pub rotational_delay: f64,
    pub vvfast: f64,
    pub vfast: f64,
    pub fast: f64,
    pub normal: f64,
    pub slow: f64,
    pub vslow: f64,
}

impl SpeedThresholds {
    pub fn from_rpm(rpm: u32) -> ScanResult<Self> {
        if rpm == 0 {
            return Err(ScanError::InvalidConfig(
                "disk RPM must be greater than zero".to_string(),
            ));
        }
        Ok(Self::from_rotational_delay(60_000.0 / f64::from(rpm)))
    }

    pub fn from_rotational_delay(delay_ms: f64) -> Self {
        Self {
            rotational_delay: delay_ms,
            vvfast: delay_ms / 4.0,
            vfast: delay_ms / 2.0,
            fast: delay_ms,
            normal: delay_ms * 2.0,
            slow: delay_ms * 4.0,
            vslow: delay_ms * 6.0,
        }
    }

    /// Bucket a latency (ms) falls into
    pub fn bucket(&self, latency_ms: f64) -> SpeedBucket {
        if latency_ms < self.vvfast {
            SpeedBucket::VeryVeryFast
        } else if latency_ms < self.vfast {
            SpeedBucket::VeryFast
        } else if latency_ms < self.fast {
            SpeedBucket::Fast
        } else if latency_ms < self.normal {
            SpeedBucket::Normal
        } else if latency_ms < self.slow {
            SpeedBucket::Slow
        } else if latency_ms < self.vslow {
            SpeedBucket::VerySlow
        } else {
            SpeedBucket::VeryVerySlow
        }
    }
}

impl Default for SpeedThresholds {
    fn default() -> Self {
        Self::from_rotational_delay(60_000.0 / f64::from(DEFAULT_DISK_RPM))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeedBucket {
    VeryVeryFast,
    VeryFast,
    Fast,
    Normal,
    Slow,
    VerySlow,
    VeryVerySlow,
}

impl SpeedBucket {
    pub const ALL: [SpeedBucket; 7] = [
        SpeedBucket::VeryVeryFast,
        SpeedBucket::VeryFast,
        SpeedBucket::Fast,
        SpeedBucket::Normal,
        SpeedBucket::Slow,
        SpeedBucket::VerySlow,
        SpeedBucket::VeryVerySlow,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Progress symbol printed per block with `--sector-symbols`
    pub fn symbol(self) -> char {
        match self {
            SpeedBucket::VeryVeryFast => '_',
            SpeedBucket::VeryFast => '.',
            SpeedBucket::Fast => ',',
            SpeedBucket::Normal => '-',
            SpeedBucket::Slow => '+',
            SpeedBucket::VerySlow => '#',
            SpeedBucket::VeryVerySlow => '!',
        }
    }
}

/// Empirically tuned classifier and sweep constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierTuning {
    /// Lone sample flagged when above this multiple of the neighbour mean
    pub neighbour_multiplier: f64,
    /// Samples required before a decile at or above "normal" is trusted
    pub normal_depth: usize,
    /// Samples required before a decile at or above "slow" is trusted
    pub slow_depth: usize,
    /// Samples required before a decile at or above "very slow" is trusted
    pub vslow_depth: usize,
    /// Sample count past which more reads are not expected to change anything
    pub certain_depth: usize,
    pub quick_first_cap: usize,
    pub quick_cap: usize,
    /// Sweep repeats while more than this fraction of blocks has high stdev
    pub high_stdev_ratio: f64,
    /// Sweep repeats while more than this fraction of blocks is invalid
    pub invalid_ratio: f64,
    /// Blocks before an interrupted read whose last sample is discarded
    pub back_invalidation: usize,
}

impl Default for ClassifierTuning {
    fn default() -> Self {
        Self {
            neighbour_multiplier: 1.25,
            normal_depth: 15,
            slow_depth: 20,
            vslow_depth: 30,
            certain_depth: 20,
            quick_first_cap: 1024,
            quick_cap: 64,
            high_stdev_ratio: 0.25,
            invalid_ratio: 0.10,
            back_invalidation: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClassifierKind {
    /// Decile and sample-depth cascade
    #[default]
    Decile,
    /// Mean/stdev rules with the lone-sample neighbour check
    Classic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SectorOutput {
    #[default]
    None,
    Symbols,
    Times,
}

/// Console verbosity, 0 is the default, negative is quieter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Verbosity(pub i8);

impl Verbosity {
    pub fn from_flags(verbose: u8, quiet: u8) -> Self {
        Self(i8::try_from(verbose).unwrap_or(i8::MAX) - i8::try_from(quiet).unwrap_or(i8::MAX))
    }

    pub fn is_quiet(self) -> bool {
        self.0 < 0
    }

    pub fn at_least(self, level: i8) -> bool {
        self.0 >= level
    }

    /// Default `tracing` filter directive for this verbosity
    pub fn filter_directive(self) -> &'static str {
        match self.0 {
            i8::MIN..=-1 => "error",
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub device: PathBuf,
    pub sectors_per_block: u64,
    pub sector_size: u64,
    pub disk_cache_mib: u64,
    pub disk_rpm: u32,
    pub min_reads: usize,
    pub max_reads: usize,
    pub max_std_dev: f64,
    /// Stop the scan after this many sectors
    pub max_sectors: Option<u64>,

    // open flags
    pub direct: bool,
    pub sync: bool,
    pub exclusive: bool,
    pub flush: bool,

    // process tuning
    pub affinity: bool,
    pub realtime: bool,
    pub rt_ioprio: bool,

    pub stats_file: Option<PathBuf>,
    pub write_samples: bool,
    pub bad_sectors_file: Option<PathBuf>,
    pub read_sectors_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub json_file: Option<PathBuf>,

    pub sector_output: SectorOutput,
    pub classifier: ClassifierKind,
    pub quick: bool,
    pub verbosity: Verbosity,

    /// Pause after 16 failed batches in a row
    pub backoff: Duration,
    pub max_batch_bytes: u64,
    pub tuning: ClassifierTuning,
}

impl ScanConfig {
    /// Configuration with the default preset (min 3, max 10, stdev 0.5)
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            sectors_per_block: DEFAULT_SECTORS_PER_BLOCK,
            sector_size: SECTOR_SIZE,
            disk_cache_mib: DEFAULT_DISK_CACHE_MIB,
            disk_rpm: DEFAULT_DISK_RPM,
            min_reads: 3,
            max_reads: 10,
            max_std_dev: 0.5,
            max_sectors: None,
            direct: true,
            sync: true,
            exclusive: false,
            flush: true,
            affinity: true,
            realtime: true,
            rt_ioprio: true,
            stats_file: None,
            write_samples: false,
            bad_sectors_file: None,
            read_sectors_file: None,
            log_file: None,
            json_file: None,
            sector_output: SectorOutput::None,
            classifier: ClassifierKind::Decile,
            quick: false,
            verbosity: Verbosity::default(),
            backoff: Duration::from_secs(1),
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            tuning: ClassifierTuning::default(),
        }
    }

    /// Exclusive access: the device is trusted more, so fewer reads suffice
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self.min_reads = 1;
        self.max_reads = 5;
        self.max_std_dev = 0.75;
        self
    }

    /// Run politely next to other workloads: no affinity, no real-time
    /// scheduling or IO class, and a larger re-read budget
    pub fn background(mut self) -> Self {
        self.max_reads = 20;
        self.affinity = false;
        self.realtime = false;
        self.rt_ioprio = false;
        self
    }

    pub fn with_min_reads(mut self, min_reads: usize) -> Self {
        self.min_reads = min_reads;
        self
    }

    pub fn with_max_reads(mut self, max_reads: usize) -> Self {
        self.max_reads = max_reads;
        self
    }

    pub fn with_max_std_dev(mut self, max_std_dev: f64) -> Self {
        self.max_std_dev = max_std_dev;
        self
    }

    pub fn with_sectors_per_block(mut self, sectors: u64) -> Self {
        self.sectors_per_block = sectors;
        self
    }

    pub fn with_disk_cache_mib(mut self, mib: u64) -> Self {
        self.disk_cache_mib = mib;
        self
    }

    pub fn with_disk_rpm(mut self, rpm: u32) -> Self {
        self.disk_rpm = rpm;
        self
    }

    pub fn with_max_sectors(mut self, sectors: u64) -> Self {
        self.max_sectors = Some(sectors);
        self
    }

    pub fn with_classifier(mut self, kind: ClassifierKind) -> Self {
        self.classifier = kind;
        self
    }

    pub fn with_quick(mut self, quick: bool) -> Self {
        self.quick = quick;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Check and normalize the configuration.
    ///
    /// `min_reads > max_reads` is corrected by raising `max_reads`.
    pub fn validate(mut self) -> ScanResult<Self> {
        if self.sectors_per_block == 0 {
            return Err(ScanError::InvalidConfig(
                "sectors per block must be greater than zero".to_string(),
            ));
        }
        if self.sector_size == 0 || self.sector_size % 512 != 0 {
            return Err(ScanError::InvalidConfig(format!(
                "sector size {} is not a multiple of 512",
                self.sector_size
            )));
        }
        if self.disk_rpm == 0 {
            return Err(ScanError::InvalidConfig(
                "disk RPM must be greater than zero".to_string(),
            ));
        }
        if self.min_reads == 0 {
            return Err(ScanError::InvalidConfig(
                "min reads must be at least 1".to_string(),
            ));
        }
        if !(self.max_std_dev.is_finite() && self.max_std_dev > 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "max standard deviation {} must be a positive number",
                self.max_std_dev
            )));
        }
        if self.min_reads > self.max_reads {
            tracing::warn!(
                min_reads = self.min_reads,
                max_reads = self.max_reads,
                "min reads bigger than max reads, correcting"
            );
            self.max_reads = self.min_reads;
        }
        Ok(self)
    }

    pub fn thresholds(&self) -> ScanResult<SpeedThresholds> {
        SpeedThresholds::from_rpm(self.disk_rpm)
    }

    pub fn block_bytes(&self) -> u64 {
        self.sectors_per_block * self.sector_size
    }

    /// Number of blocks covered by the on-board disk cache
    pub fn disk_cache_blocks(&self) -> u64 {
        self.disk_cache_mib * 1024 * 1024 / self.block_bytes()
    }

    /// Largest number of blocks read in one scheduler batch
    pub fn max_batch_blocks(&self) -> usize {
        usize::try_from(self.max_batch_bytes / self.block_bytes())
            .unwrap_or(usize::MAX)
            .max(2)
    }

    /// Targeted re-read rounds left after the sweep
    pub fn re_read_budget(&self) -> usize {
        self.max_reads.saturating_sub(self.min_reads)
    }
}
