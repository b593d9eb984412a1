/// Outcome history of the last 16 batches, newest in bit 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessWindow {
    bits: u16,
    since_adjust: u32,
}

/// What the scheduler should do after recording a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// Every batch in the window failed
    Backoff,
    /// Too many recent failures, halve the batch length
    Shrink,
    /// A full clean window since the last change, double the batch length
    Grow,
    Hold,
}

const WINDOW: u32 = u16::BITS;
/// Fewer successes than this in the window shrinks the batches
const SHRINK_BELOW: u32 = 12;

impl SuccessWindow {
    /// Starts out full of successes
    pub fn new() -> Self {
        Self {
            bits: u16::MAX,
            since_adjust: 0,
        }
    }

    pub fn record(&mut self, success: bool) {
        self.bits = (self.bits << 1) | u16::from(success);
        self.since_adjust = self.since_adjust.saturating_add(1);
    }

    pub fn successes(&self) -> u32 {
        self.bits.count_ones()
    }

    /// Call after the batch length changed
    pub fn adjusted(&mut self) {
        self.since_adjust = 0;
    }

    pub fn decision(&self) -> WindowDecision {
        match self.successes() {
            0 => WindowDecision::Backoff,
            n if n < SHRINK_BELOW => WindowDecision::Shrink,
            WINDOW if self.since_adjust >= WINDOW => WindowDecision::Grow,
            _ => WindowDecision::Hold,
        }
    }
}

impl Default for SuccessWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_window_holds() {
        let mut window = SuccessWindow::new();
        assert_eq!(window.successes(), 16);
        window.record(true);
        assert_eq!(window.decision(), WindowDecision::Hold);
    }

    #[test]
    fn test_grows_after_sixteen_clean_batches() {
        let mut window = SuccessWindow::new();
        for _ in 0..15 {
            window.record(true);
            assert_eq!(window.decision(), WindowDecision::Hold);
        }
        window.record(true);
        assert_eq!(window.decision(), WindowDecision::Grow);

        window.adjusted();
        window.record(true);
        assert_eq!(window.decision(), WindowDecision::Hold);
    }

    #[test]
    fn test_shrinks_on_fifth_failure() {
        let mut window = SuccessWindow::new();
        for _ in 0..4 {
            window.record(false);
            assert_eq!(window.decision(), WindowDecision::Hold);
        }
        window.record(false);
        assert_eq!(window.successes(), 11);
        assert_eq!(window.decision(), WindowDecision::Shrink);
    }

    #[test]
    fn test_shrink_is_not_rate_limited() {
        let mut window = SuccessWindow::new();
        for _ in 0..5 {
            window.record(false);
        }
        window.adjusted();
        window.record(false);
        assert_eq!(window.decision(), WindowDecision::Shrink);
    }

    #[test]
    fn test_backoff_when_everything_failed() {
        let mut window = SuccessWindow::new();
        for _ in 0..16 {
            window.record(false);
        }
        assert_eq!(window.decision(), WindowDecision::Backoff);
        window.record(true);
        assert_eq!(window.decision(), WindowDecision::Shrink);
    }

    #[test]
    fn test_old_failures_slide_out() {
        let mut window = SuccessWindow::new();
        for _ in 0..5 {
            window.record(false);
        }
        for _ in 0..16 {
            window.record(true);
        }
        assert_eq!(window.successes(), 16);
        assert_eq!(window.decision(), WindowDecision::Grow);
    }
}
