/// Per-block read latency statistics
///
/// One `BlockStat` exists for every block of the scanned device. It collects
/// the timed reads of the block (milliseconds), tracks whether the collected
/// timings can be trusted and counts I/O errors seen while reading it.
///
/// Quantile queries sort the samples in place. The sort order and the 9th
/// decile (the statistic the classifier asks for most often) are memoized and
/// dropped by every mutation of the sample set.

/// Below this many samples the "intelligent" estimators use untrimmed data
pub const TRIM_MIN_SAMPLES: usize = 5;

/// Fraction of samples discarded by the "intelligent" estimators (half per tail)
pub const TRIM_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockStat {
    samples: Vec<f64>,
    valid: bool,
    errors: u32,
    initialized: bool,
    last: Option<f64>,
    /// `samples` is in ascending order
    sorted: bool,
    /// memoized 9th decile, `None` when stale
    decile: Option<f64>,
}

impl BlockStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all samples and mark the block invalid.
    ///
    /// Error history and the initialized flag survive: errors are evidence of
    /// device damage that must outlive re-scoring.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.valid = false;
        self.last = None;
        self.invalidate_cache();
    }

    /// Whether the block ever received a sample or an error
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Append a read time (ms)
    pub fn add_time(&mut self, time: f64) {
        self.samples.push(time);
        self.last = Some(time);
        self.initialized = true;
        self.invalidate_cache();
    }

    /// Remove the most recently added sample.
    ///
    /// The value recorded as last is removed (swap-remove of its first
    /// occurrence), so the position may differ after a quantile sort. Removing
    /// the only sample resets the block to invalid but keeps errors.
    pub fn remove_last(&mut self) {
        if self.samples.len() > 1 {
            let position = self
                .last
                .and_then(|last| self.samples.iter().position(|&s| s == last));
            match position {
                Some(i) => {
                    self.samples.swap_remove(i);
                }
                None => {
                    self.samples.pop();
                }
            }
            self.last = None;
            self.invalidate_cache();
        } else {
            self.clear();
        }
    }

    /// Concatenate the samples of `other` and add up error counts
    pub fn add(&mut self, other: &BlockStat) {
        if !other.samples.is_empty() {
            self.samples.extend_from_slice(&other.samples);
            self.last = other.last;
            self.invalidate_cache();
        }
        self.errors = self.errors.saturating_add(other.errors);
        self.initialized |= other.initialized;
    }

    /// Merge `other` respecting validity.
    ///
    /// - same validity: plain [`add`](Self::add)
    /// - valid into invalid: the invalid samples are discarded and replaced
    /// - invalid into valid: only the error count is merged
    pub fn add_valid(&mut self, other: &BlockStat) {
        match (self.valid, other.valid) {
            (true, true) | (false, false) => self.add(other),
            (true, false) => {
                self.errors = self.errors.saturating_add(other.errors);
                self.initialized |= other.initialized;
            }
            (false, true) => {
                self.clear();
                self.add(other);
                self.valid = true;
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn make_valid(&mut self) {
        self.valid = true;
    }

    pub fn make_invalid(&mut self) {
        self.valid = false;
    }

    /// Record an I/O error on the block
    pub fn add_error(&mut self) {
        self.errors = self.errors.saturating_add(1);
        self.initialized = true;
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// Individual sample times. Order is insertion order until a quantile
    /// query sorts them.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn sum(&self) -> f64 {
        self.samples.iter().sum()
    }

    /// Arithmetic mean, NaN without samples
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return f64::NAN;
        }
        self.sum() / self.samples.len() as f64
    }

    /// Sample standard deviation (n - 1 denominator), NaN below two samples
    pub fn stdev(&self) -> f64 {
        welford(&self.samples).0
    }

    /// Standard deviation divided by mean
    pub fn rel_stdev(&self) -> f64 {
        let (stdev, mean) = welford(&self.samples);
        stdev / mean
    }

    /// Longest read, 0 without samples
    pub fn max(&self) -> f64 {
        self.samples.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }

    /// Shortest read, 0 without samples
    pub fn min(&self) -> f64 {
        self.samples.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    /// Mean after discarding `percent / 2` of the samples from each tail.
    /// Returns 0 when trimming leaves nothing.
    pub fn trunc_average(&self, percent: f64) -> f64 {
        self.with_trimmed(percent, |window| {
            window.iter().sum::<f64>() / window.len() as f64
        })
    }

    /// Standard deviation of the trimmed window, see [`trunc_average`](Self::trunc_average)
    pub fn trunc_stdev(&self, percent: f64) -> f64 {
        self.with_trimmed(percent, |window| welford(window).0)
    }

    /// Relative standard deviation of the trimmed window
    pub fn trunc_rel_stdev(&self, percent: f64) -> f64 {
        self.with_trimmed(percent, |window| {
            let (stdev, mean) = welford(window);
            stdev / mean
        })
    }

    /// Plain mean for small sample sets, 25% trimmed mean otherwise
    pub fn int_average(&self) -> f64 {
        if self.samples.len() < TRIM_MIN_SAMPLES {
            self.average()
        } else {
            self.trunc_average(TRIM_FRACTION)
        }
    }

    /// Plain relative stdev for small sample sets, 25% trimmed otherwise
    pub fn int_rel_stdev(&self) -> f64 {
        if self.samples.len() < TRIM_MIN_SAMPLES {
            self.rel_stdev()
        } else {
            self.trunc_rel_stdev(TRIM_FRACTION)
        }
    }

    /// `k`-th quantile of order `q` with linear interpolation between order
    /// statistics (R type 7). `quantile(1, 2)` is the median, `quantile(9, 10)`
    /// the 9th decile.
    ///
    /// Sorts the samples in place and memoizes the 9th decile on the way.
    /// NaN for an empty block or `k > q`.
    pub fn quantile(&mut self, k: u32, q: u32) -> f64 {
        if q == 0 || k > q || self.samples.is_empty() {
            return f64::NAN;
        }
        if self.samples.len() == 1 {
            return self.samples[0];
        }
        let p = f64::from(k) / f64::from(q);
        if u64::from(k) * 10 == u64::from(q) * 9 {
            return self.decile();
        }
        self.ensure_sorted();
        interpolate(&self.samples, p)
    }

    /// `k`-th quantile of order `q` using the nearest-rank method (no
    /// interpolation). Same side effects as [`quantile`](Self::quantile).
    pub fn quantile_exact(&mut self, k: u32, q: u32) -> f64 {
        if q == 0 || k > q || self.samples.is_empty() {
            return f64::NAN;
        }
        if self.samples.len() == 1 {
            return self.samples[0];
        }
        self.ensure_sorted();
        let p = f64::from(k) / f64::from(q);
        let rank = (self.samples.len() as f64 * p).round_ties_even() as isize - 1;
        let index = rank.clamp(0, self.samples.len() as isize - 1) as usize;
        self.samples[index]
    }

    /// 9th decile, the primary "how slow does this block get" signal
    pub fn decile(&mut self) -> f64 {
        if let Some(decile) = self.decile {
            return decile;
        }
        match self.samples.len() {
            0 => f64::NAN,
            1 => self.samples[0],
            _ => {
                self.ensure_sorted();
                let decile = interpolate(&self.samples, 0.9);
                self.decile = Some(decile);
                decile
            }
        }
    }

    /// Sort the samples once; memoize the 9th decile while they are sorted
    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.samples.sort_by(f64::total_cmp);
            self.sorted = true;
        }
        if self.decile.is_none() && self.samples.len() > 1 {
            self.decile = Some(interpolate(&self.samples, 0.9));
        }
    }

    fn invalidate_cache(&mut self) {
        self.sorted = false;
        self.decile = None;
    }

    fn with_trimmed(&self, percent: f64, f: impl FnOnce(&[f64]) -> f64) -> f64 {
        debug_assert!((0.0..=1.0).contains(&percent));
        let n = self.samples.len();
        let low = (percent / 2.0 * n as f64).ceil() as usize;
        let high = (n as f64 - percent / 2.0 * n as f64).floor() as usize;
        if high <= low {
            return 0.0;
        }

        if self.sorted {
            return f(&self.samples[low..high]);
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(f64::total_cmp);
        f(&sorted[low..high])
    }
}

/// Returns (sample stdev, mean) computed in one pass
fn welford(samples: &[f64]) -> (f64, f64) {
    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, &x) in samples.iter().enumerate() {
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }
    let n = samples.len();
    if n == 0 {
        return (f64::NAN, f64::NAN);
    }
    if n < 2 {
        return (f64::NAN, mean);
    }
    ((m2 / (n - 1) as f64).sqrt(), mean)
}

/// R type 7 quantile over ascending `sorted` (at least one element)
fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lower = h.floor() as usize;
    match sorted.get(lower + 1) {
        Some(&upper) => sorted[lower] + (h - lower as f64) * (upper - sorted[lower]),
        None => sorted[lower],
    }
}
