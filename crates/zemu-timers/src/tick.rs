use std::thread;
use std::time::Duration;

use tracing::debug;
use zemu_smp::{CpuRates, CpuState, ProcessorRegistry};
use zemu_time::TOD_UNITS_PER_SEC;

use crate::{busy_percent, diffrate, SystemStats, TimerSystem};

/// Length of a statistics period in TOD units.
pub const STATS_PERIOD: u64 = TOD_UNITS_PER_SEC;

/// Assist level at which a processor asks for a longer tick interval.
pub const PPA_SOME_HELP_THRESHOLD: u32 = 1;

/// Result of one statistics sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSample {
    /// TOD units covered by the sample.
    pub elapsed: u64,
    pub total_mips: u64,
    pub total_sios: u64,
    /// Some sampled processor requested transactional relief.
    pub tx_relief: bool,
}

/// Derives per-processor and total rates for the `elapsed` TOD units ending at `now`.
///
/// Offline processors are skipped and stopped ones report zero. Each processor's lock is held
/// only while that processor is sampled. Returns `None` for an empty interval.
pub fn sample_statistics(
    registry: &ProcessorRegistry,
    stats: &SystemStats,
    now: u64,
    elapsed: u64,
) -> Option<StatsSample> {
    debug_assert!(elapsed > 0, "statistics sampled over an empty interval");
    if elapsed == 0 {
        return None;
    }

    let mut sample = StatsSample {
        elapsed,
        total_sios: stats.take_shared_device_sios(),
        ..StatsSample::default()
    };

    for cpu in 0..registry.count() {
        if !registry.is_online(cpu) {
            continue;
        }
        let mut cpu_stats = registry.lock_stats(cpu);
        if registry.state(cpu) == CpuState::Stopped {
            cpu_stats.set_rates(CpuRates::default());
            continue;
        }

        let mips_rate = diffrate(cpu_stats.take_instructions(), STATS_PERIOD, elapsed)?;
        let sios_rate = diffrate(cpu_stats.take_sios(), STATS_PERIOD, elapsed)?;
        let wait = cpu_stats.take_wait_time(now);
        let cpu_busy_percent = busy_percent(elapsed, wait)?;

        cpu_stats.set_rates(CpuRates {
            mips_rate,
            sios_rate,
            cpu_busy_percent,
        });
        sample.total_mips = sample.total_mips.saturating_add(mips_rate);
        sample.total_sios = sample.total_sios.saturating_add(sios_rate);
        sample.tx_relief |= cpu_stats.tx_assist.needs_relief(PPA_SOME_HELP_THRESHOLD);
    }

    stats.publish(sample.total_mips, sample.total_sios, now);
    debug!(
        mips = sample.total_mips,
        sios = sample.total_sios,
        elapsed,
        "statistics sampled"
    );
    Some(sample)
}

/// Body of the timer thread.
#[derive(Debug)]
pub struct TickDriver {
    system: TimerSystem,
    last_sample: u64,
}

impl TickDriver {
    pub fn new(system: TimerSystem) -> Self {
        let last_sample = system.tod().current();
        Self {
            system,
            last_sample,
        }
    }

    /// TOD of the last statistics sample.
    pub fn last_sample(&self) -> u64 {
        self.last_sample
    }

    /// One timer cycle without the sleep: advances the TOD clock, checks timer interrupts and
    /// samples statistics if a period has passed.
    ///
    /// Returns how long to sleep before the next cycle.
    pub fn tick(&mut self) -> Duration {
        let now = self.system.tod().advance();
        self.system.update_cpu_timers();

        // Relief requests are only collected while sampling.
        let relief = self.sample_if_due(now).is_some_and(|sample| sample.tx_relief);

        let interval_us = if relief {
            self.system.effective_interval_us()
        } else {
            self.system.base_interval_us()
        };
        Duration::from_micros(u64::from(interval_us))
    }

    /// Samples statistics if at least [`STATS_PERIOD`] TOD units passed since the last sample.
    pub fn sample_if_due(&mut self, now: u64) -> Option<StatsSample> {
        let elapsed = now.saturating_sub(self.last_sample);
        if elapsed < STATS_PERIOD {
            return None;
        }
        self.last_sample = now;
        sample_statistics(self.system.registry(), self.system.stats(), now, elapsed)
    }

    /// Runs until shutdown is requested.
    pub fn run(mut self) {
        while !self.system.is_shutdown() {
            let sleep = self.tick();
            thread::sleep(sleep);
        }
    }
}
