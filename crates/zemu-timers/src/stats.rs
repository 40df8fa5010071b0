use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;
use zemu_time::TOD_UNITS_PER_SEC;

/// Highest aggregate rates seen in the current and the previous reporting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HighWaterMarks {
    pub current_mips: u64,
    pub current_sios: u64,
    pub previous_mips: u64,
    pub previous_sios: u64,
    /// TOD at which the current interval began.
    pub interval_start: u64,
    pub previous_interval_start: u64,
}

impl HighWaterMarks {
    fn new(start_tod: u64) -> Self {
        Self {
            interval_start: start_tod,
            ..Self::default()
        }
    }

    fn update(&mut self, mips: u64, sios: u64, now: u64, interval: u64) {
        self.current_mips = self.current_mips.max(mips);
        self.current_sios = self.current_sios.max(sios);

        if now.saturating_sub(self.interval_start) >= interval {
            self.previous_mips = self.current_mips;
            self.previous_sios = self.current_sios;
            self.current_mips = 0;
            self.current_sios = 0;
            self.previous_interval_start = self.interval_start;
            self.interval_start = now;
        }
    }
}

/// Aggregate statistics over all processors, published once per statistics period.
#[derive(Debug)]
pub struct SystemStats {
    mips_rate: AtomicU64,
    sios_rate: AtomicU64,
    /// SIOs performed on behalf of remote systems through shared devices.
    shared_device_sios: AtomicU64,
    /// Reporting interval length in TOD units.
    report_interval: AtomicU64,
    high_water: Mutex<HighWaterMarks>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemStatsSnapshot {
    pub mips_rate: u64,
    pub sios_rate: u64,
    pub high_water: HighWaterMarks,
}

pub(crate) fn minutes_to_tod(minutes: u32) -> u64 {
    u64::from(minutes)
        .saturating_mul(60)
        .saturating_mul(TOD_UNITS_PER_SEC)
}

impl SystemStats {
    pub fn new(start_tod: u64, report_interval_minutes: u32) -> Self {
        Self {
            mips_rate: AtomicU64::new(0),
            sios_rate: AtomicU64::new(0),
            shared_device_sios: AtomicU64::new(0),
            report_interval: AtomicU64::new(minutes_to_tod(report_interval_minutes)),
            high_water: Mutex::new(HighWaterMarks::new(start_tod)),
        }
    }

    pub fn mips_rate(&self) -> u64 {
        self.mips_rate.load(Ordering::Relaxed)
    }

    pub fn sios_rate(&self) -> u64 {
        self.sios_rate.load(Ordering::Relaxed)
    }

    pub fn add_shared_device_sios(&self, count: u64) {
        self.shared_device_sios.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn take_shared_device_sios(&self) -> u64 {
        self.shared_device_sios.swap(0, Ordering::Relaxed)
    }

    pub(crate) fn set_report_interval_minutes(&self, minutes: u32) {
        self.report_interval
            .store(minutes_to_tod(minutes), Ordering::Relaxed);
    }

    pub fn high_water(&self) -> HighWaterMarks {
        *self.high_water.lock().expect("high-water lock poisoned")
    }

    /// Publishes new totals and folds them into the high-water marks.
    pub(crate) fn publish(&self, mips: u64, sios: u64, now: u64) {
        self.mips_rate.store(mips, Ordering::Relaxed);
        self.sios_rate.store(sios, Ordering::Relaxed);

        let interval = self.report_interval.load(Ordering::Relaxed);
        self.high_water
            .lock()
            .expect("high-water lock poisoned")
            .update(mips, sios, now, interval);
    }

    pub fn snapshot(&self) -> SystemStatsSnapshot {
        SystemStatsSnapshot {
            mips_rate: self.mips_rate(),
            sios_rate: self.sios_rate(),
            high_water: self.high_water(),
        }
    }
}
