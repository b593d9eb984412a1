/// Device access for the scanner
///
/// The scan only needs two primitives from a device: "read N consecutive
/// blocks at offset O, timing each read" and, optionally, "current OS-level
/// read/write counters". [`BlockDevice`] captures both; [`RawDevice`] backs
/// it with a real block device or file, [`SimulatedDevice`] with an in-memory
/// latency model.
pub mod buffer;
pub mod raw;
pub mod sim;
pub mod sysfs;
pub mod tuning;

// Re-exports
pub use buffer::AlignedBuffer;
pub use raw::RawDevice;
pub use sim::SimulatedDevice;
pub use sysfs::SysfsCounters;
pub use tuning::apply_process_tuning;

use crate::ScanResult;

/// Outcome of one timed block read
///
/// Every variant carries the time between the end of the previous read of
/// the same request and the end of this one, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockRead {
    /// The whole block was read
    Complete { latency_ms: f64 },
    /// The device reported EIO for this block
    IoError { latency_ms: f64 },
    /// Fewer bytes than a block came back, or the read was interrupted
    Short { bytes: usize, latency_ms: f64 },
}

impl BlockRead {
    pub fn latency_ms(&self) -> f64 {
        match *self {
            BlockRead::Complete { latency_ms }
            | BlockRead::IoError { latency_ms }
            | BlockRead::Short { latency_ms, .. } => latency_ms,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, BlockRead::Complete { .. })
    }
}

/// Cumulative device counters as exported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoCounters {
    pub reads: u64,
    pub sectors_read: u64,
    pub writes: u64,
}

impl IoCounters {
    /// Activity between `earlier` and `self`
    pub fn since(&self, earlier: &IoCounters) -> IoCounters {
        IoCounters {
            reads: self.reads.saturating_sub(earlier.reads),
            sectors_read: self.sectors_read.saturating_sub(earlier.sectors_read),
            writes: self.writes.saturating_sub(earlier.writes),
        }
    }
}

pub trait BlockDevice {
    /// Number of whole blocks that can be scanned
    fn block_count(&self) -> u64;

    fn sectors_per_block(&self) -> u64;

    /// Whether reads bypass the page cache, which makes counter deltas exact
    fn is_direct(&self) -> bool;

    /// Read `count` consecutive blocks starting at block `offset`, one read
    /// per block.
    ///
    /// Timestamps are chained: each read is timed from the end of the
    /// previous one. EIO and short reads are reported per block; any other
    /// failure aborts with an error.
    fn read_n_blocks_at(&mut self, offset: u64, count: u64) -> ScanResult<Vec<BlockRead>>;

    /// Current device counters, `None` when the device has none
    fn io_counters(&mut self) -> Option<IoCounters>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_delta() {
        let before = IoCounters {
            reads: 10,
            sectors_read: 2560,
            writes: 3,
        };
        let after = IoCounters {
            reads: 12,
            sectors_read: 3072,
            writes: 3,
        };
        assert_eq!(
            after.since(&before),
            IoCounters {
                reads: 2,
                sectors_read: 512,
                writes: 0
            }
        );
        // counter reset does not underflow
        assert_eq!(before.since(&after).reads, 0);
    }

    #[test]
    fn test_block_read_latency() {
        assert_eq!(BlockRead::Complete { latency_ms: 1.5 }.latency_ms(), 1.5);
        assert_eq!(BlockRead::IoError { latency_ms: 9.0 }.latency_ms(), 9.0);
        let short = BlockRead::Short {
            bytes: 10,
            latency_ms: 2.0,
        };
        assert_eq!(short.latency_ms(), 2.0);
        assert!(!short.is_complete());
    }
}
