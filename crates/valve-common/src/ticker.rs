//! Periodic-task interval gating.
//!
//! The external event loop calls `advertise`/`fast_advertise`/`state_expire`/
//! etc. far more often than those tasks should actually run; each task gates
//! itself against its own configured interval and the timestamp it last ran,
//! using the `now` passed in by the caller (never a clock read).

/// Gates a periodic task to run at most once per `interval` (in caller-defined
/// time units — typically seconds).
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    interval: u64,
    last_run: Option<u64>,
}

impl Ticker {
    pub const fn new(interval: u64) -> Self {
        Self { interval, last_run: None }
    }

    /// Returns true and records `now` as the last-run time if `interval` has
    /// elapsed since the previous run (or this is the first call).
    pub fn ready(&mut self, now: u64) -> bool {
        let due = match self.last_run {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval,
        };
        if due {
            self.last_run = Some(now);
        }
        due
    }

    pub fn last_run(&self) -> Option<u64> {
        self.last_run
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }
}
