use crate::config::{ScanConfig, SectorOutput, SpeedThresholds};
use crate::io::{BlockRead, IoCounters};
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Minimum time between two redraws of the same status
const REDRAW_INTERVAL: Duration = Duration::from_secs(1);
/// Symbols printed per line in symbol mode
const SYMBOLS_PER_LINE: usize = 64;

const BOLD: &str = "\x1b[1m";
const CYAN: &str = "\x1b[38;5;51m";
const RESET: &str = "\x1b[0m";

/// Snapshot of the sequential sweep shown in the status block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepStatus {
    /// 1-based loop number
    pub loop_index: usize,
    pub min_loops: usize,
    pub max_loops: usize,
    pub blocks_done: u64,
    pub block_count: u64,
    pub sectors_per_block: u64,
    pub sector_size: u64,
    pub elapsed: Duration,
}

impl SweepStatus {
    pub fn fraction(&self) -> f64 {
        if self.block_count == 0 {
            return 0.0;
        }
        (self.blocks_done as f64 / self.block_count as f64).clamp(0.0, 1.0)
    }

    pub fn bytes_read(&self) -> u64 {
        self.blocks_done * self.sectors_per_block * self.sector_size
    }

    pub fn speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_read() as f64 / secs
    }

    /// Expected duration of the current loop
    pub fn expected(&self) -> Option<Duration> {
        let fraction = self.fraction();
        if fraction <= 0.0 {
            return None;
        }
        Some(self.elapsed.div_f64(fraction))
    }

    /// Lines of the status block, without colors
    pub fn lines(&self) -> [String; 6] {
        let loops = if self.min_loops == self.max_loops {
            format!("{}", self.max_loops)
        } else {
            format!("{}-{}", self.min_loops, self.max_loops)
        };
        let expected = self
            .expected()
            .map(|d| format_duration(d.as_secs()))
            .unwrap_or_else(|| "-".to_string());
        [
            format!("Loop:          {} of {}", self.loop_index, loops),
            format!("Progress:      {:.2}%", self.fraction() * 100.0),
            format!(
                "Read:          {} sectors ({})",
                self.blocks_done * self.sectors_per_block,
                human_bytes(self.bytes_read() as f64)
            ),
            format!("Speed:         {}/s", human_bytes(self.speed())),
            format!("Elapsed time:  {}", format_duration(self.elapsed.as_secs())),
            format!("Expected time: {}", expected),
        ]
    }
}

/// Console output of a running scan: the sweep status block, re-read
/// progress and the optional per-block sector output.
///
/// The status block is redrawn in place, so it is disabled while sector
/// output is active.
pub struct Console {
    enabled: bool,
    sector_output: SectorOutput,
    thresholds: SpeedThresholds,
    status_drawn: bool,
    line_open: bool,
    last_redraw: Option<Instant>,
    symbols_on_line: usize,
}

impl Console {
    pub fn new(config: &ScanConfig, thresholds: SpeedThresholds) -> Self {
        Self {
            enabled: !config.verbosity.is_quiet(),
            sector_output: config.sector_output,
            thresholds,
            status_drawn: false,
            line_open: false,
            last_redraw: None,
            symbols_on_line: 0,
        }
    }

    /// Console that prints nothing
    pub fn silent() -> Self {
        Self {
            enabled: false,
            sector_output: SectorOutput::None,
            thresholds: SpeedThresholds::default(),
            status_drawn: false,
            line_open: false,
            last_redraw: None,
            symbols_on_line: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn due(&mut self, force: bool) -> bool {
        let now = Instant::now();
        let due = force
            || self
                .last_redraw
                .map_or(true, |last| now.duration_since(last) >= REDRAW_INTERVAL);
        if due {
            self.last_redraw = Some(now);
        }
        due
    }

    /// Redraw the sweep status block, at most once a second unless forced
    pub fn sweep_status(&mut self, status: &SweepStatus, force: bool) {
        if !self.enabled || self.sector_output != SectorOutput::None || !self.due(force) {
            return;
        }
        let lines = status.lines();
        let mut out = io::stdout().lock();
        if self.status_drawn {
            // move up over the previous block
            let _ = write!(out, "\x1b[{}A", lines.len());
        }
        for line in &lines {
            let _ = writeln!(out, "\x1b[2K\r{BOLD}{line}{RESET}");
        }
        let _ = out.flush();
        self.status_drawn = true;
    }

    /// Forget the drawn status block so the next one starts below it
    pub fn end_sweep(&mut self) {
        self.status_drawn = false;
        self.last_redraw = None;
        self.finish_line();
    }

    /// Single-line progress of a targeted re-read pass
    pub fn reread_progress(&mut self, done: u64, total: u64, elapsed: Duration) {
        if !self.enabled || self.sector_output != SectorOutput::None {
            return;
        }
        if !self.due(done >= total) {
            return;
        }
        let pct = if total == 0 {
            100.0
        } else {
            done as f64 * 100.0 / total as f64
        };
        let mut out = io::stdout().lock();
        let _ = write!(
            out,
            "\x1b[2K\r{CYAN}re-reading{RESET} {done}/{total} blocks ({pct:.1}%) {}",
            format_duration(elapsed.as_secs())
        );
        let _ = out.flush();
        self.line_open = true;
    }

    /// Terminate an open single-line progress display
    pub fn finish_line(&mut self) {
        if self.line_open || self.symbols_on_line > 0 {
            println!();
        }
        self.line_open = false;
        self.symbols_on_line = 0;
        self.last_redraw = None;
    }

    /// Per-block sector output of the sweep
    pub fn sector(&mut self, block: u64, read: &BlockRead, delta: Option<IoCounters>) {
        if !self.enabled {
            return;
        }
        match self.sector_output {
            SectorOutput::None => {}
            SectorOutput::Symbols => {
                print!("{}", sector_symbol(&self.thresholds, read));
                self.symbols_on_line += 1;
                if self.symbols_on_line == SYMBOLS_PER_LINE {
                    println!();
                    self.symbols_on_line = 0;
                }
                let _ = io::stdout().flush();
            }
            SectorOutput::Times => println!("{}", sector_time_line(block, read, delta)),
        }
    }

    /// Plain message on its own line
    pub fn message(&mut self, text: &str) {
        if !self.enabled {
            return;
        }
        self.finish_line();
        println!("{text}");
    }
}

/// Speed class symbol of one read; `X` for an I/O error, `?` for a short read
pub fn sector_symbol(thresholds: &SpeedThresholds, read: &BlockRead) -> char {
    match read {
        BlockRead::Complete { latency_ms } => thresholds.bucket(*latency_ms).symbol(),
        BlockRead::IoError { .. } => 'X',
        BlockRead::Short { .. } => '?',
    }
}

/// `block  µs  reads  sectors  writes` with `-` where counters are missing
pub fn sector_time_line(block: u64, read: &BlockRead, delta: Option<IoCounters>) -> String {
    let micros = (read.latency_ms() * 1000.0).round() as u64;
    let state = match read {
        BlockRead::Complete { .. } => "",
        BlockRead::IoError { .. } => "\tEIO",
        BlockRead::Short { .. } => "\tshort",
    };
    match delta {
        Some(d) => format!(
            "{block}\t{micros}\t{}\t{}\t{}{state}",
            d.reads, d.sectors_read, d.writes
        ),
        None => format!("{block}\t{micros}\t-\t-\t-{state}"),
    }
}

/// Convert bytes/sec to readable string
pub(crate) fn human_bytes(bps: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bps <= 0.0 || bps.is_nan() {
        return "0B".to_string();
    }
    let mut val = bps;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}

/// Format seconds to H:MM:SS or M:SS
pub(crate) fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
