//! Sliding window of recent connection failures.
//!
//! Fixed-capacity ring of monotonic timestamps. Entries older than the horizon
//! are pruned before every evaluation; when the ring is full the oldest entry is
//! evicted, so the window never grows.

use heapless::Deque;

pub const FAILURE_WINDOW_CAPACITY: usize = 8;

pub struct FailureWindow {
    entries: Deque<u64, FAILURE_WINDOW_CAPACITY>,
    horizon_ms: u64,
}

impl FailureWindow {
    pub fn new(horizon_ms: u64) -> Self {
        Self {
            entries: Deque::new(),
            horizon_ms,
        }
    }

    /// Record a failure at `now_ms` and prune. Returns the pruned count.
    pub fn record(&mut self, now_ms: u64) -> usize {
        if self.entries.is_full() {
            self.entries.pop_front();
        }
        // Capacity was just ensured above.
        let _ = self.entries.push_back(now_ms);
        self.prune(now_ms)
    }

    /// Drop every entry older than the horizon. Returns the remaining count.
    pub fn prune(&mut self, now_ms: u64) -> usize {
        while let Some(&oldest) = self.entries.front() {
            if now_ms.saturating_sub(oldest) > self.horizon_ms {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        self.entries.len()
    }

    /// True once `threshold` failures fall inside the horizon.
    pub fn is_breached(&mut self, now_ms: u64, threshold: usize) -> bool {
        self.prune(now_ms) >= threshold
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &u64> {
        self.entries.iter()
    }
}
