use serde::Serialize;

/// Rates derived once per statistics period by the timer thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuRates {
    /// Instructions per second.
    pub mips_rate: u64,
    /// Start-I/O operations per second.
    pub sios_rate: u64,
    pub cpu_busy_percent: u8,
}

/// Transactional-execution constraint assist levels, maintained by the execution side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxAssist {
    pub host: u32,
    /// Present only while a nested context is active.
    pub nested: Option<u32>,
}

impl TxAssist {
    /// Whether either context has reached `threshold`.
    pub fn needs_relief(&self, threshold: u32) -> bool {
        self.host >= threshold || self.nested.is_some_and(|level| level >= threshold)
    }
}

/// Counters of one processor. Guarded by that processor's lock in the registry.
///
/// All times are in TOD units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub instruction_count: u64,
    pub instruction_total: u64,
    pub sio_count: u64,
    pub sio_total: u64,
    /// Idle time accumulated since the last statistics sample.
    pub wait_time: u64,
    pub wait_time_accumulated: u64,
    /// Set while the processor is in a wait state.
    pub wait_start: Option<u64>,
    pub tx_assist: TxAssist,
    rates: CpuRates,
}

impl CpuStats {
    pub fn count_instructions(&mut self, count: u64) {
        self.instruction_count = self.instruction_count.wrapping_add(count);
    }

    pub fn count_sio(&mut self) {
        self.sio_count = self.sio_count.wrapping_add(1);
    }

    pub fn begin_wait(&mut self, now: u64) {
        if self.wait_start.is_none() {
            self.wait_start = Some(now);
        }
    }

    pub fn end_wait(&mut self, now: u64) {
        if let Some(start) = self.wait_start.take() {
            self.wait_time = self.wait_time.saturating_add(now.saturating_sub(start));
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_start.is_some()
    }

    /// Moves the instruction count into the running total and returns it.
    pub fn take_instructions(&mut self) -> u64 {
        let count = std::mem::take(&mut self.instruction_count);
        self.instruction_total = self.instruction_total.wrapping_add(count);
        count
    }

    /// Moves the SIO count into the running total and returns it.
    pub fn take_sios(&mut self) -> u64 {
        let count = std::mem::take(&mut self.sio_count);
        self.sio_total = self.sio_total.wrapping_add(count);
        count
    }

    /// Idle time since the last sample, including the current wait (if any) up to `now`.
    ///
    /// An ongoing wait is re-based to `now` so the next sample only counts the remainder.
    pub fn take_wait_time(&mut self, now: u64) -> u64 {
        let mut wait = std::mem::take(&mut self.wait_time);
        self.wait_time_accumulated = self.wait_time_accumulated.saturating_add(wait);
        if let Some(start) = self.wait_start.as_mut() {
            wait = wait.saturating_add(now.saturating_sub(*start));
            *start = now;
        }
        wait
    }

    pub fn rates(&self) -> CpuRates {
        self.rates
    }

    /// Publishes freshly computed rates. Only the timer thread calls this.
    pub fn set_rates(&mut self, rates: CpuRates) {
        self.rates = rates;
    }
}
