// Allow uppercase acronyms for industry-standard terms like EIO, LBA, RPM
#![allow(clippy::upper_case_acronyms)]

pub mod classifier;
pub mod config;
pub mod io;
pub mod pass;
pub mod ranges;
pub mod report;
pub mod scheduler;
pub mod stats;
pub mod ui;

// Re-export the scan entry points for convenience
pub use config::{ScanConfig, SpeedThresholds};
pub use pass::{PassController, ScanOutcome};
pub use ranges::{BlockRange, BlockRangeList};
pub use stats::{BlockStat, StatTable};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

// Global flag for handling Ctrl+C interrupts
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Set the interrupt flag (called by signal handler)
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Check if an interrupt has been received
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Reset the interrupt flag (primarily for testing)
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read failed with something other than EIO. Measurements taken after
    /// this are not trustworthy.
    #[error("Read of block {block} failed: {source}")]
    ReadFailed {
        block: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Device positioned at byte {actual}, expected {expected}")]
    WrongOffset { expected: u64, actual: u64 },

    #[error("Device of {bytes} bytes is smaller than one block ({block_bytes} bytes)")]
    DeviceTooSmall { bytes: u64, block_bytes: u64 },

    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("{}:{line}: {reason}", path.display())]
    RangeFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Process tuning failed: {0}")]
    Tuning(String),

    #[error("Scan interrupted by user")]
    Interrupted,
}

pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod lib_tests;
