//! Rubato-style tick interval modulation.
//!
//! Under heavy transactional-execution load, frequent timer interrupts cause transactions to
//! abort. The modulator watches the recent transaction rate and lengthens the interval used
//! while processors ask for relief, shrinking it again as the load subsides. The interval never
//! drops below the operator's base interval and never exceeds the configured maximum.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::system::IntervalSettings;
use crate::{TimerSystem, MAX_TOD_UPDATE_US};

/// Number of modulation cycles the peak rate is taken over.
pub const RUBATO_WINDOW: usize = 5;

/// Maps a peak transaction rate (per second) to a tick interval in microseconds, clamped to
/// `min_us..=max_us`.
///
/// The curve is empirical: no load gives an interval far below any sensible minimum, and the
/// interval grows logarithmically with load.
pub fn modulated_interval_us(max_rate: u64, min_us: u32, max_us: u32) -> u32 {
    let candidate = 286_000.0 * ((max_rate as f64 + 200.0) / 100.0).ln() - 212_180.0;
    clamp_interval(candidate.round(), min_us, max_us)
}

fn clamp_interval(candidate: f64, min_us: u32, max_us: u32) -> u32 {
    if candidate.is_nan() {
        return min_us;
    }
    let max_us = max_us.max(min_us);
    candidate.clamp(f64::from(min_us), f64::from(max_us)) as u32
}

/// Transaction counts of the last [`RUBATO_WINDOW`] cycles, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RubatoWindow {
    counts: [u64; RUBATO_WINDOW],
}

impl RubatoWindow {
    pub fn push(&mut self, count: u64) {
        self.counts.rotate_left(1);
        self.counts[RUBATO_WINDOW - 1] = count;
    }

    pub fn max(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn counts(&self) -> &[u64; RUBATO_WINDOW] {
        &self.counts
    }
}

/// State guarded by the adaptive-state lock.
#[derive(Debug, Default)]
pub(crate) struct RubatoState {
    pub(crate) enabled: bool,
    pub(crate) running: bool,
    pub(crate) handle: Option<JoinHandle<()>>,
    window: RubatoWindow,
    /// Base interval the current cycle length was derived from; zero forces a reset.
    starting_interval_us: u32,
    intervals_per_second: u64,
}

impl RubatoState {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    fn reset(&mut self) {
        self.window = RubatoWindow::default();
        self.starting_interval_us = 0;
        self.intervals_per_second = 0;
    }

    /// One modulation cycle: records `sample` and publishes the resulting interval.
    pub(crate) fn modulate(&mut self, intervals: &IntervalSettings, sample: u64) -> u32 {
        let base = intervals.base_us();
        if base != self.starting_interval_us {
            self.starting_interval_us = base;
            intervals.publish_effective_us(base);
            self.intervals_per_second = u64::from(MAX_TOD_UPDATE_US / base);
        }

        self.window.push(sample);
        let max_rate = self.window.max().saturating_mul(self.intervals_per_second);

        let candidate = modulated_interval_us(max_rate, base, intervals.max_us());
        let previous = intervals.effective_us();
        let interval = intervals.publish_effective_us(candidate);
        if interval != previous {
            debug!(max_rate, interval_us = interval, "rubato interval changed");
        }

        // Each sample covers one cycle of the new length.
        self.intervals_per_second = u64::from(MAX_TOD_UPDATE_US / interval);
        interval
    }
}

/// Body of the rubato thread.
pub(crate) fn run(system: TimerSystem) {
    let shared = system.shared();
    let mut state = shared.rubato.lock().expect("rubato lock poisoned");
    state.reset();
    system.take_transactions();

    while !system.is_shutdown() && state.enabled {
        let sample = system.take_transactions();
        let interval = state.modulate(&shared.intervals, sample);

        drop(state);
        thread::sleep(Duration::from_micros(u64::from(interval)));
        state = shared.rubato.lock().expect("rubato lock poisoned");
    }

    state.running = false;
    shared.intervals.reset_effective();
}
