use crate::Callback;
use crate::timer::Timer;
use std::time::Duration;
use tracing::debug;

/// A watchdog firing, to be handed back to [`SilenceWatchdog::acknowledge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSignal {
    pub generation: u64,
}

/// Silence detection by time alone: fires when nothing reset it for `delay`.
pub struct SilenceWatchdog {
    timer: Timer,
    delay: Duration,
    threshold: u32,
    fire_count: u32,
    running: bool,
    callback: Callback<WatchdogSignal>,
}

impl SilenceWatchdog {
    pub fn new(delay: Duration, threshold: u32, callback: Callback<WatchdogSignal>) -> Self {
        Self {
            timer: Timer::default(),
            delay,
            threshold,
            fire_count: 0,
            running: false,
            callback,
        }
    }

    pub fn start(&mut self) {
        self.fire_count = 0;
        self.running = true;
        self.schedule();
    }

    /// Pushes the deadline out again. Does nothing while stopped.
    pub fn reset(&mut self) {
        if self.running {
            self.schedule();
        }
    }

    pub fn stop(&mut self) {
        self.timer.cancel();
        self.running = false;
        self.fire_count = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn fire_count(&self) -> u32 {
        self.fire_count
    }

    /// Accepts a firing. Returns `None` for stale signals, otherwise whether
    /// this elapse reached the repeat threshold.
    pub fn acknowledge(&mut self, signal: WatchdogSignal) -> Option<bool> {
        if !self.running || !self.timer.acknowledge(signal.generation) {
            debug!(generation = signal.generation, "Dropping stale watchdog firing");
            return None;
        }
        self.fire_count += 1;
        Some(self.fire_count >= self.threshold)
    }

    fn schedule(&mut self) {
        self.timer
            .schedule(self.delay, &self.callback, |generation| WatchdogSignal { generation });
    }
}

impl std::fmt::Debug for SilenceWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SilenceWatchdog")
            .field("delay", &self.delay)
            .field("fire_count", &self.fire_count)
            .field("running", &self.running)
            .finish()
    }
}
