use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use latentscan::config::{ClassifierKind, SectorOutput, Verbosity};
use latentscan::io::{apply_process_tuning, BlockDevice, RawDevice};
use latentscan::ranges::file::{read_range_file, write_range_file};
use latentscan::report::{
    write_bad_blocks, write_json_report, write_stats_file, JsonReport, ScanSummary,
};
use latentscan::{PassController, ScanConfig, ScanError, ScanOutcome};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

/// Exit status of a scan stopped by SIGINT
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "latentscan")]
#[command(about = "Find latent bad sectors by statistical analysis of block read times")]
#[command(version)]
#[command(group(ArgGroup::new("preset").args(["exclusive", "background"])))]
#[command(group(ArgGroup::new("sector_output").args(["sector_symbols", "sector_times"])))]
struct Cli {
    /// Device (or image file) to test
    #[arg(short = 'f', long = "file", value_name = "DEVICE")]
    device: PathBuf,

    /// Exclusive access: open with O_EXCL, fewer reads (min 1, max 5, std dev 0.75)
    #[arg(short = 'x', long)]
    exclusive: bool,

    /// Run next to other workloads: max 20 reads, no process tuning
    #[arg(short = 'b', long)]
    background: bool,

    /// Write detailed per-block statistics to FILE
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    stats_file: Option<PathBuf>,

    /// Append individual samples to the statistics file
    #[arg(long, requires = "stats_file")]
    stats_samples: bool,

    /// Write suspect sectors as LBA ranges to FILE
    #[arg(short = 'w', long = "write-sectors", value_name = "FILE")]
    bad_sectors_file: Option<PathBuf>,

    /// Test only the LBA ranges listed in FILE
    #[arg(short = 'r', long = "read-sectors", value_name = "FILE")]
    read_sectors_file: Option<PathBuf>,

    /// Log test parameters and results to FILE
    #[arg(short = 'l', long = "log", value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Write a JSON report to FILE
    #[arg(long = "json", value_name = "FILE")]
    json_file: Option<PathBuf>,

    /// Don't use O_DIRECT
    #[arg(long)]
    nodirect: bool,

    /// Don't drop the page cache of the device before testing
    #[arg(long)]
    noflush: bool,

    /// Don't use O_SYNC
    #[arg(long)]
    nosync: bool,

    /// Don't pin the process to the first CPU
    #[arg(long)]
    noaffinity: bool,

    /// Don't switch to the real-time IO class
    #[arg(long)]
    nortio: bool,

    /// Don't switch to real-time scheduling
    #[arg(long)]
    nort: bool,

    /// Print a speed symbol per block during sweeps
    #[arg(long)]
    sector_symbols: bool,

    /// Print the read time of every block during sweeps
    #[arg(long)]
    sector_times: bool,

    /// Minimal number of whole-device sweeps
    #[arg(long, value_name = "N")]
    min_reads: Option<usize>,

    /// Maximal number of reads of any block
    #[arg(long, value_name = "N")]
    max_reads: Option<usize>,

    /// Relative standard deviation below which a block is trusted
    #[arg(long = "max-std-deviation", value_name = "RATIO")]
    max_std_dev: Option<f64>,

    /// Test only the first N sectors
    #[arg(long, value_name = "N")]
    max_sectors: Option<u64>,

    /// Size of the on-board disk cache in MiB
    #[arg(long = "disk-cache", value_name = "MIB")]
    disk_cache: Option<u64>,

    /// Rotational speed of the disk
    #[arg(long = "disk-rpm", value_name = "RPM")]
    disk_rpm: Option<u32>,

    /// Sectors per measured block
    #[arg(long = "block-sectors", value_name = "N")]
    sectors_per_block: Option<u64>,

    /// Rule set used to pick blocks for re-reading
    #[arg(long, value_enum, default_value_t = ClassifierArg::Decile)]
    classifier: ClassifierArg,

    /// Re-read only the worst blocks first
    #[arg(long)]
    quick: bool,

    /// Pause after a window of failed batches (e.g. "1s", "500ms")
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    backoff: Option<Duration>,

    /// More output, repeat for more
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Less output
    #[arg(long, action = clap::ArgAction::Count)]
    noverbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassifierArg {
    Decile,
    Classic,
}

impl From<ClassifierArg> for ClassifierKind {
    fn from(arg: ClassifierArg) -> Self {
        match arg {
            ClassifierArg::Decile => ClassifierKind::Decile,
            ClassifierArg::Classic => ClassifierKind::Classic,
        }
    }
}

impl Cli {
    /// Preset first, explicit options on top
    fn scan_config(&self) -> ScanConfig {
        let mut config = ScanConfig::new(&self.device);
        if self.exclusive {
            config = config.exclusive();
        }
        if self.background {
            config = config.background();
        }

        if let Some(n) = self.min_reads {
            config = config.with_min_reads(n);
        }
        if let Some(n) = self.max_reads {
            config = config.with_max_reads(n);
        }
        if let Some(ratio) = self.max_std_dev {
            config = config.with_max_std_dev(ratio);
        }
        if let Some(sectors) = self.max_sectors {
            config = config.with_max_sectors(sectors);
        }
        if let Some(mib) = self.disk_cache {
            config = config.with_disk_cache_mib(mib);
        }
        if let Some(rpm) = self.disk_rpm {
            config = config.with_disk_rpm(rpm);
        }
        if let Some(sectors) = self.sectors_per_block {
            config = config.with_sectors_per_block(sectors);
        }
        if let Some(backoff) = self.backoff {
            config = config.with_backoff(backoff);
        }

        config.direct = !self.nodirect;
        config.sync = !self.nosync;
        config.flush = !self.noflush;
        config.affinity &= !self.noaffinity;
        config.realtime &= !self.nort;
        config.rt_ioprio &= !self.nortio;

        config.stats_file = self.stats_file.clone();
        config.write_samples = self.stats_samples;
        config.bad_sectors_file = self.bad_sectors_file.clone();
        config.read_sectors_file = self.read_sectors_file.clone();
        config.log_file = self.log_file.clone();
        config.json_file = self.json_file.clone();

        config.sector_output = if self.sector_symbols {
            SectorOutput::Symbols
        } else if self.sector_times {
            SectorOutput::Times
        } else {
            SectorOutput::None
        };

        config
            .with_classifier(self.classifier.into())
            .with_quick(self.quick)
            .with_verbosity(Verbosity::from_flags(self.verbose, self.noverbose))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.scan_config();

    let log_guard = init_logging(config.verbosity, config.log_file.as_deref())?;
    setup_signal_handlers()?;

    let config = config.validate().context("Invalid configuration")?;
    tracing::info!(
        parameters = %serde_json::to_string(&config).unwrap_or_default(),
        "test parameters"
    );

    apply_process_tuning(&config).context("Failed to tune the process for stable timings")?;

    let mut device = RawDevice::open(&config)
        .with_context(|| format!("Failed to open {}", config.device.display()))?;

    let ranges = match &config.read_sectors_file {
        Some(path) => Some(
            read_range_file(path, config.sectors_per_block)
                .with_context(|| format!("Failed to read ranges from {}", path.display()))?,
        ),
        None => None,
    };

    let quiet = config.verbosity.is_quiet();
    if !quiet {
        println!(
            "Testing {} ({} blocks of {} sectors), {} to {} reads per block",
            device.path().display(),
            device.block_count(),
            config.sectors_per_block,
            config.min_reads,
            config.max_reads
        );
    }

    let mut pass = PassController::new(config.clone())?;
    let outcome = match &ranges {
        Some(ranges) => pass.run_ranges(&mut device, ranges)?,
        None => pass.run(&mut device)?,
    };
    let summary = ScanSummary::from_outcome(&outcome, pass.thresholds());

    if !quiet {
        let mut stdout = io::stdout().lock();
        if !outcome.bad_blocks.is_empty() {
            writeln!(stdout, "\nSuspect blocks:")?;
            write_bad_blocks(
                &mut stdout,
                &outcome.stats,
                &outcome.bad_blocks,
                outcome.sectors_per_block,
            )?;
        }
        writeln!(stdout)?;
        summary.write_to(&mut stdout, config.verbosity.at_least(3))?;
    }

    write_outputs(&config, &outcome, &summary)?;

    tracing::info!(
        verdict = %summary.verdict,
        tested_blocks = summary.tested_blocks,
        errors = summary.errors,
        suspect_blocks = summary.bad_blocks,
        mean_block_ms = summary.mean_block_ms,
        "test finished: {}",
        summary.verdict.message()
    );

    if outcome.interrupted {
        tracing::warn!(error = %ScanError::Interrupted, "partial results written");
        drop(log_guard);
        std::process::exit(EXIT_INTERRUPTED);
    }
    Ok(())
}

fn write_outputs(config: &ScanConfig, outcome: &ScanOutcome, summary: &ScanSummary) -> Result<()> {
    if let Some(path) = &config.bad_sectors_file {
        write_range_file(path, &outcome.bad_blocks, outcome.sectors_per_block)
            .with_context(|| format!("Failed to write suspect sectors to {}", path.display()))?;
    }
    if let Some(path) = &config.stats_file {
        write_stats_file(path, &outcome.stats, config.write_samples)
            .with_context(|| format!("Failed to write statistics to {}", path.display()))?;
    }
    if let Some(path) = &config.json_file {
        write_json_report(path, &JsonReport::new(config, outcome, summary))
            .with_context(|| format!("Failed to write JSON report to {}", path.display()))?;
    }
    Ok(())
}

/// stderr filtered by verbosity (or `RUST_LOG`), plus an info-level log file
fn init_logging(verbosity: Verbosity, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(filter);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::INFO);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

// Signal handler for graceful shutdown
fn setup_signal_handlers() -> Result<()> {
    use signal_hook::{consts::SIGINT, iterator::Signals};

    let mut signals = Signals::new(&[SIGINT])?;

    std::thread::spawn(move || {
        for sig in signals.forever() {
            if sig == SIGINT {
                eprintln!("\nInterrupt received, finishing the current read...");
                latentscan::set_interrupted();
            }
        }
    });

    Ok(())
}
