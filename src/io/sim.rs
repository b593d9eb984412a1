/// In-memory device with a scripted latency model
///
/// Serves reads instantly but reports the latency the model assigns to each
/// block, so scans over it are deterministic. Faults are injected per block
/// (EIO, slow, slow-every-Nth-read) or per read (foreign I/O landing in the
/// middle of a timed read, visible through the counters).
use super::{BlockDevice, BlockRead, IoCounters};
use crate::ScanResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};

/// Extra latency a read suffers when foreign I/O interrupts it (ms)
const INTERRUPTION_PENALTY_MS: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    /// Every read of the block takes this long
    Slow(f64),
    /// Every `period`-th read of the block takes `latency_ms`
    Flaky { latency_ms: f64, period: u32 },
}

#[derive(Debug)]
pub struct SimulatedDevice {
    block_count: u64,
    sectors_per_block: u64,
    base_latency_ms: f64,
    faults: HashMap<u64, Fault>,
    failing: HashSet<u64>,
    /// Physical read numbers (0-based) that foreign I/O lands on
    interruptions: HashSet<u64>,
    jitter: Option<(StdRng, f64)>,
    counters: IoCounters,
    with_counters: bool,
    block_reads: HashMap<u64, u32>,
    physical_reads: u64,
    requests: Vec<(u64, u64)>,
}

impl SimulatedDevice {
    pub fn new(block_count: u64, sectors_per_block: u64) -> Self {
        Self {
            block_count,
            sectors_per_block,
            base_latency_ms: 1.0,
            faults: HashMap::new(),
            failing: HashSet::new(),
            interruptions: HashSet::new(),
            jitter: None,
            counters: IoCounters::default(),
            with_counters: true,
            block_reads: HashMap::new(),
            physical_reads: 0,
            requests: Vec::new(),
        }
    }

    /// Latency of every healthy block
    pub fn with_base_latency(mut self, latency_ms: f64) -> Self {
        self.base_latency_ms = latency_ms;
        self
    }

    pub fn with_slow_block(mut self, block: u64, latency_ms: f64) -> Self {
        self.faults.insert(block, Fault::Slow(latency_ms));
        self
    }

    /// Block that is slow only on every `period`-th read (first read included)
    pub fn with_flaky_block(mut self, block: u64, latency_ms: f64, period: u32) -> Self {
        self.faults.insert(
            block,
            Fault::Flaky {
                latency_ms,
                period: period.max(1),
            },
        );
        self
    }

    /// Block that always fails with EIO
    pub fn with_failing_block(mut self, block: u64) -> Self {
        self.failing.insert(block);
        self
    }

    /// Foreign I/O overlaps the `read_number`-th physical read (0-based)
    pub fn with_interruption_at(mut self, read_number: u64) -> Self {
        self.interruptions.insert(read_number);
        self
    }

    /// Multiply every latency by a random factor in `1 ± fraction`
    pub fn with_jitter(mut self, seed: u64, fraction: f64) -> Self {
        self.jitter = Some((StdRng::seed_from_u64(seed), fraction.abs()));
        self
    }

    /// Behave like a regular file: no kernel counters
    pub fn without_counters(mut self) -> Self {
        self.with_counters = false;
        self
    }

    /// Physical block reads served so far
    pub fn physical_reads(&self) -> u64 {
        self.physical_reads
    }

    /// How often `block` was read
    pub fn reads_of(&self, block: u64) -> u32 {
        self.block_reads.get(&block).copied().unwrap_or(0)
    }

    /// Every `(offset, count)` request in arrival order
    pub fn requests(&self) -> &[(u64, u64)] {
        &self.requests
    }

    fn latency(&mut self, block: u64, nth_read: u32) -> f64 {
        let base = match self.faults.get(&block) {
            Some(Fault::Slow(latency_ms)) => *latency_ms,
            Some(Fault::Flaky { latency_ms, period }) if (nth_read - 1) % period == 0 => {
                *latency_ms
            }
            _ => self.base_latency_ms,
        };
        match self.jitter.as_mut() {
            Some((rng, fraction)) if *fraction > 0.0 => {
                let f = *fraction;
                base * (1.0 + rng.gen_range(-f..=f))
            }
            _ => base,
        }
    }
}

impl BlockDevice for SimulatedDevice {
    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn sectors_per_block(&self) -> u64 {
        self.sectors_per_block
    }

    fn is_direct(&self) -> bool {
        true
    }

    fn read_n_blocks_at(&mut self, offset: u64, count: u64) -> ScanResult<Vec<BlockRead>> {
        self.requests.push((offset, count));
        let mut reads = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for block in offset..offset + count {
            let read_number = self.physical_reads;
            self.physical_reads += 1;

            if block >= self.block_count {
                reads.push(BlockRead::Short {
                    bytes: 0,
                    latency_ms: self.base_latency_ms,
                });
                continue;
            }

            let nth = self.block_reads.entry(block).or_insert(0);
            *nth += 1;
            let nth = *nth;
            let mut latency_ms = self.latency(block, nth);

            self.counters.reads += 1;
            self.counters.sectors_read += self.sectors_per_block;
            if self.interruptions.contains(&read_number) {
                self.counters.reads += 1;
                self.counters.sectors_read += self.sectors_per_block;
                latency_ms += INTERRUPTION_PENALTY_MS;
            }

            if self.failing.contains(&block) {
                reads.push(BlockRead::IoError { latency_ms });
            } else {
                reads.push(BlockRead::Complete { latency_ms });
            }
        }
        Ok(reads)
    }

    fn io_counters(&mut self) -> Option<IoCounters> {
        self.with_counters.then_some(self.counters)
    }
}
