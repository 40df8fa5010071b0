use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::{CpuRates, CpuState, CpuStats, ProcessorTimers, SmpError, TimerContext, MAX_CPUS};

#[derive(Debug)]
struct ProcessorStatus {
    online: AtomicBool,
    state: AtomicU8,
}

#[derive(Debug)]
struct InterruptState {
    timers: Vec<ProcessorTimers>,
}

/// Fixed array of processor contexts, addressed by index.
///
/// Processors start offline and stopped.
pub struct ProcessorRegistry {
    status: Box<[ProcessorStatus]>,
    interrupts: Mutex<InterruptState>,
    stats: Box<[Mutex<CpuStats>]>,
}

impl ProcessorRegistry {
    pub fn new(count: usize) -> Result<Self, SmpError> {
        if count > MAX_CPUS {
            return Err(SmpError::TooManyProcessors {
                count,
                max: MAX_CPUS,
            });
        }

        let status = (0..count)
            .map(|_| ProcessorStatus {
                online: AtomicBool::new(false),
                state: AtomicU8::new(CpuState::Stopped as u8),
            })
            .collect();
        let stats = (0..count).map(|_| Mutex::new(CpuStats::default())).collect();

        Ok(Self {
            status,
            interrupts: Mutex::new(InterruptState {
                timers: vec![ProcessorTimers::default(); count],
            }),
            stats,
        })
    }

    /// Number of configured processor slots (the highest index plus one).
    pub fn count(&self) -> usize {
        self.status.len()
    }

    pub fn is_online(&self, cpu: usize) -> bool {
        self.status
            .get(cpu)
            .is_some_and(|s| s.online.load(Ordering::Acquire))
    }

    pub fn state(&self, cpu: usize) -> CpuState {
        self.status
            .get(cpu)
            .map_or(CpuState::Stopped, |s| {
                CpuState::from_raw(s.state.load(Ordering::Acquire))
            })
    }

    /// Online and not stopped: the processor takes part in interrupt checks and statistics.
    pub fn is_runnable(&self, cpu: usize) -> bool {
        self.is_online(cpu) && self.state(cpu) != CpuState::Stopped
    }

    /// Calls `f` for every runnable processor. No lock is held during the call.
    pub fn for_each_runnable(&self, mut f: impl FnMut(usize)) {
        for cpu in 0..self.count() {
            if self.is_runnable(cpu) {
                f(cpu);
            }
        }
    }

    /// Acquires the global interrupt lock.
    pub fn lock_interrupts(&self) -> InterruptGuard<'_> {
        InterruptGuard {
            registry: self,
            state: self
                .interrupts
                .lock()
                .expect("interrupt lock poisoned"),
        }
    }

    /// Acquires the statistics lock of one processor.
    ///
    /// # Panics
    ///
    /// Panics if `cpu` is not a configured index.
    pub fn lock_stats(&self, cpu: usize) -> MutexGuard<'_, CpuStats> {
        self.stats[cpu].lock().expect("cpu stats lock poisoned")
    }

    /// Rates published by the last statistics sample.
    pub fn rates(&self, cpu: usize) -> CpuRates {
        self.lock_stats(cpu).rates()
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("count", &self.count())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Holder of the global interrupt lock.
///
/// Timer fields, pending flags and online/state transitions are changed through this guard so
/// they never race with an interrupt check.
pub struct InterruptGuard<'a> {
    registry: &'a ProcessorRegistry,
    state: MutexGuard<'a, InterruptState>,
}

impl InterruptGuard<'_> {
    pub fn count(&self) -> usize {
        self.state.timers.len()
    }

    pub fn is_runnable(&self, cpu: usize) -> bool {
        self.registry.is_runnable(cpu)
    }

    pub fn timers(&self, cpu: usize) -> &ProcessorTimers {
        &self.state.timers[cpu]
    }

    pub fn timers_mut(&mut self, cpu: usize) -> &mut ProcessorTimers {
        &mut self.state.timers[cpu]
    }

    pub fn set_online(&mut self, cpu: usize, online: bool) {
        self.registry.status[cpu]
            .online
            .store(online, Ordering::Release);
    }

    pub fn set_state(&mut self, cpu: usize, state: CpuState) {
        self.registry.status[cpu]
            .state
            .store(state as u8, Ordering::Release);
    }

    /// Activates interpretive execution on `cpu` with the given nested context.
    pub fn enter_nested(&mut self, cpu: usize, nested: TimerContext) {
        self.state.timers[cpu].nested = Some(nested);
    }

    pub fn leave_nested(&mut self, cpu: usize) -> Option<TimerContext> {
        self.state.timers[cpu].nested.take()
    }
}

impl fmt::Debug for InterruptGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptGuard")
            .field("timers", &self.state.timers)
            .finish()
    }
}
