use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source for calibration timestamps.
///
/// - now_secs(): seconds since the UNIX epoch, truncated to u32 like the
///   node's RTC counter
pub trait Clock {
    fn now_secs(&self) -> u32;
}

/// Default clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_secs(&self) -> u32 {
        // Before-epoch clocks (unset RTC) report 0
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }
}

/// Deterministic clock whose time is set by hand.
///
/// Clones share the same underlying time, so a test can keep a handle
/// after moving the clock into an engine.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    secs: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new(start: u32) -> Self {
        Self {
            secs: Rc::new(Cell::new(start)),
        }
    }

    /// Advance the clock by `secs`, saturating at `u32::MAX`.
    pub fn advance(&self, secs: u32) {
        self.secs.set(self.secs.get().saturating_add(secs));
    }

    pub fn set(&self, secs: u32) {
        self.secs.set(secs);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u32 {
        self.secs.get()
    }
}
