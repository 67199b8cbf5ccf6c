//! Smoothed buffer occupancy.

use ringbuf::traits::{Consumer, RingBuffer};
use ringbuf::HeapRb;

/// Number of tick snapshots kept (1.6 s at the 100 ms tick).
pub const HISTORY_LEN: usize = 16;

/// Outstanding-buffer counter plus a sliding window of per-tick snapshots.
///
/// The counter moves on acquire and on buffer-emptied notifications; the
/// window only moves on [`tick`](Self::tick).
pub struct UsageHistory {
    outstanding: u32,
    window: HeapRb<u32>,
}

impl UsageHistory {
    /// Creates a history with a zeroed window.
    pub fn new() -> Self {
        let mut history = Self {
            outstanding: 0,
            window: HeapRb::new(HISTORY_LEN),
        };
        history.fill_zero();
        history
    }

    fn fill_zero(&mut self) {
        for _ in 0..HISTORY_LEN {
            self.window.push_overwrite(0);
        }
    }

    /// Buffers currently held by the pipeline or its caller.
    pub fn outstanding(&self) -> u32 {
        self.outstanding
    }

    /// Counts a buffer freshly taken from the hardware.
    pub fn increment(&mut self) {
        self.outstanding = self.outstanding.saturating_add(1);
    }

    /// Counts a buffer the hardware finished with.
    pub fn decrement(&mut self) {
        if self.outstanding == 0 {
            tracing::warn!("buffer emptied with no outstanding buffers");
        }
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    /// Records the current outstanding count, dropping the oldest snapshot.
    pub fn tick(&mut self) {
        self.window.push_overwrite(self.outstanding);
    }

    /// Sum of the window.
    pub fn sum(&self) -> u64 {
        self.window.iter().map(|&n| u64::from(n)).sum()
    }

    /// Average occupancy over the window as a percentage of `capacity`,
    /// clamped to `0..=100`. Zero capacity reports 0.
    pub fn usage_percent(&self, capacity: u32) -> u32 {
        if capacity == 0 {
            return 0;
        }
        let percent = self.sum() * 100 / (HISTORY_LEN as u64 * u64::from(capacity));
        percent.min(100) as u32
    }

    /// Zeros both the counter and the window.
    pub fn reset(&mut self) {
        self.outstanding = 0;
        self.fill_zero();
    }
}

impl Default for UsageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UsageHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageHistory")
            .field("outstanding", &self.outstanding)
            .field("window", &self.window.iter().collect::<Vec<_>>())
            .finish()
    }
}
