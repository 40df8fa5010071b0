use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{info, trace, warn};
use zemu_smp::{CpuMask, NoWake, ProcessorRegistry, WakeSignal};
use zemu_time::{HostClock, StdHostClock, TodClock};

use crate::config::check_interval;
use crate::rubato::{self, RubatoState};
use crate::{
    check_timers, ConfigError, IntervalTimerCheck, LegacyIntervalTimer, SystemStats, TickDriver,
    TimerConfig, TimerError,
};

const TIMER_THREAD_NAME: &str = "zemu-timer";
const RUBATO_THREAD_NAME: &str = "zemu-rubato";

/// Tick interval settings shared between the timer and rubato threads.
///
/// `base_us <= effective_us <= max_us` holds between updates.
#[derive(Debug)]
pub(crate) struct IntervalSettings {
    base_us: AtomicU32,
    effective_us: AtomicU32,
    max_us: AtomicU32,
}

impl IntervalSettings {
    pub(crate) fn new(base_us: u32, max_us: u32) -> Self {
        Self {
            base_us: AtomicU32::new(base_us),
            effective_us: AtomicU32::new(base_us),
            max_us: AtomicU32::new(max_us),
        }
    }

    pub(crate) fn base_us(&self) -> u32 {
        self.base_us.load(Ordering::SeqCst)
    }

    pub(crate) fn effective_us(&self) -> u32 {
        self.effective_us.load(Ordering::SeqCst)
    }

    pub(crate) fn max_us(&self) -> u32 {
        self.max_us.load(Ordering::Acquire)
    }

    pub(crate) fn set_base_us(&self, base_us: u32) {
        self.base_us.store(base_us, Ordering::SeqCst);
        self.effective_us.store(base_us, Ordering::SeqCst);
    }

    pub(crate) fn set_effective_us(&self, effective_us: u32) {
        self.effective_us.store(effective_us, Ordering::SeqCst);
    }

    /// Publishes a modulated interval, never below the current base. Returns the stored value.
    pub(crate) fn publish_effective_us(&self, candidate_us: u32) -> u32 {
        let value = candidate_us.max(self.base_us());
        self.effective_us.store(value, Ordering::SeqCst);

        // A base raised between the read and the store has already written its own effective
        // value, which the store above may have overwritten.
        let base = self.base_us();
        if base > value {
            self.effective_us.fetch_max(base, Ordering::SeqCst);
            return base;
        }
        value
    }

    pub(crate) fn reset_effective(&self) {
        self.set_effective_us(self.base_us());
    }
}

pub(crate) struct Shared {
    pub(crate) registry: ProcessorRegistry,
    pub(crate) tod: TodClock,
    pub(crate) stats: SystemStats,
    pub(crate) intervals: IntervalSettings,
    /// Adaptive-state lock.
    pub(crate) rubato: Mutex<RubatoState>,
    shutdown: AtomicBool,
    transactions: AtomicU64,
    wake: Arc<dyn WakeSignal>,
    interval_timer: Arc<dyn IntervalTimerCheck>,
}

/// Shared handle to the timer core. Clones refer to the same system.
#[derive(Clone)]
pub struct TimerSystem {
    shared: Arc<Shared>,
}

/// Builder for [`TimerSystem`].
pub struct TimerSystemBuilder {
    config: TimerConfig,
    cpus: usize,
    host_clock: Arc<dyn HostClock>,
    wake: Arc<dyn WakeSignal>,
    interval_timer: Arc<dyn IntervalTimerCheck>,
}

impl TimerSystemBuilder {
    pub fn new(config: TimerConfig) -> Self {
        Self {
            config,
            cpus: 0,
            host_clock: Arc::new(StdHostClock),
            wake: Arc::new(NoWake),
            interval_timer: Arc::new(LegacyIntervalTimer),
        }
    }

    /// Number of processor slots. Zero configures a processor-less (device server) system.
    pub fn cpus(mut self, cpus: usize) -> Self {
        self.cpus = cpus;
        self
    }

    pub fn host_clock(mut self, clock: Arc<dyn HostClock>) -> Self {
        self.host_clock = clock;
        self
    }

    pub fn wake_signal(mut self, wake: Arc<dyn WakeSignal>) -> Self {
        self.wake = wake;
        self
    }

    pub fn interval_timer(mut self, interval_timer: Arc<dyn IntervalTimerCheck>) -> Self {
        self.interval_timer = interval_timer;
        self
    }

    pub fn build(self) -> Result<TimerSystem, TimerError> {
        self.config.validate()?;
        let registry = ProcessorRegistry::new(self.cpus)?;
        let tod = TodClock::new(self.host_clock);
        let stats = SystemStats::new(tod.current(), self.config.maxrates_interval_minutes);

        Ok(TimerSystem {
            shared: Arc::new(Shared {
                registry,
                tod,
                stats,
                intervals: IntervalSettings::new(
                    self.config.timer_interval_us,
                    self.config.max_interval_us,
                ),
                rubato: Mutex::new(RubatoState::new(self.config.adaptive)),
                shutdown: AtomicBool::new(false),
                transactions: AtomicU64::new(0),
                wake: self.wake,
                interval_timer: self.interval_timer,
            }),
        })
    }
}

impl TimerSystem {
    pub fn builder(config: TimerConfig) -> TimerSystemBuilder {
        TimerSystemBuilder::new(config)
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.shared.registry
    }

    pub fn tod(&self) -> &TodClock {
        &self.shared.tod
    }

    pub fn stats(&self) -> &SystemStats {
        &self.shared.stats
    }

    /// Checks every runnable processor for newly pending clock comparator, CPU timer and
    /// interval timer interrupts and wakes those processors.
    ///
    /// Returns the mask that was signalled. With no processors configured this is a no-op.
    pub fn update_cpu_timers(&self) -> CpuMask {
        let shared = &self.shared;
        if shared.registry.count() == 0 {
            return CpuMask::empty();
        }

        let mut guard = shared.registry.lock_interrupts();
        let mask = check_timers(
            &mut guard,
            shared.tod.current(),
            shared.interval_timer.as_ref(),
        );
        if !mask.is_empty() {
            trace!(mask = mask.bits(), "timer interrupt pending");
            shared.wake.wake_cpus(mask);
        }
        drop(guard);
        mask
    }

    pub fn base_interval_us(&self) -> u32 {
        self.shared.intervals.base_us()
    }

    /// Interval used while processors request transactional relief. Equals the base interval
    /// unless the rubato thread is modulating it.
    pub fn effective_interval_us(&self) -> u32 {
        self.shared.intervals.effective_us()
    }

    pub fn max_interval_us(&self) -> u32 {
        self.shared.intervals.max_us()
    }

    /// Changes the base tick interval. A running modulator picks the change up on its next
    /// cycle.
    pub fn set_base_interval_us(&self, base_us: u32) -> Result<(), ConfigError> {
        check_interval(base_us)?;
        let max = self.max_interval_us();
        if base_us > max {
            return Err(ConfigError::MaxBelowBase { base: base_us, max });
        }
        self.shared.intervals.set_base_us(base_us);
        info!(interval_us = base_us, "timer interval changed");
        Ok(())
    }

    /// Changes the rate high-water-mark reporting interval.
    pub fn set_maxrates_interval_minutes(&self, minutes: u32) -> Result<(), ConfigError> {
        if minutes == 0 {
            return Err(ConfigError::ZeroReportInterval);
        }
        self.shared.stats.set_report_interval_minutes(minutes);
        Ok(())
    }

    /// Counts transactions committed by the execution side.
    pub fn add_transactions(&self, count: u64) {
        self.shared.transactions.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn take_transactions(&self) -> u64 {
        self.shared.transactions.swap(0, Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    pub fn is_adaptive(&self) -> bool {
        self.shared
            .rubato
            .lock()
            .expect("rubato lock poisoned")
            .enabled
    }

    /// Enables or disables interval modulation at runtime.
    ///
    /// Enabling spawns the rubato thread if it is not already running. Disabling lets the thread
    /// finish its current cycle, after which the effective interval returns to the base
    /// interval.
    pub fn set_adaptive(&self, enabled: bool) -> Result<(), TimerError> {
        let mut state = self.shared.rubato.lock().expect("rubato lock poisoned");
        state.enabled = enabled;
        if enabled && !state.running && !self.is_shutdown() {
            let system = self.clone();
            let handle = spawn_named(RUBATO_THREAD_NAME, move || rubato::run(system))?;
            state.running = true;
            // A previous thread that already exited is detached here.
            state.handle = Some(handle);
        }
        Ok(())
    }

    /// Starts the timer thread and, if enabled, the rubato thread.
    pub fn start(&self) -> Result<TimerThreads, TimerError> {
        let driver = TickDriver::new(self.clone());
        let timer = spawn_named(TIMER_THREAD_NAME, move || driver.run())?;
        let threads = TimerThreads {
            system: self.clone(),
            timer: Some(timer),
        };

        if self.is_adaptive() {
            self.set_adaptive(true)?;
        }
        Ok(threads)
    }
}

impl fmt::Debug for TimerSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerSystem")
            .field("registry", &self.shared.registry)
            .field("tod", &self.shared.tod)
            .field("intervals", &self.shared.intervals)
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

fn spawn_named<F>(name: &'static str, body: F) -> Result<JoinHandle<()>, TimerError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            info!(thread = name, id = ?thread::current().id(), "thread started");
            body();
            info!(thread = name, "thread ended");
        })
        .map_err(|source| TimerError::Spawn { name, source })
}

/// Running timer threads. Dropping the handle requests shutdown without waiting.
#[derive(Debug)]
pub struct TimerThreads {
    system: TimerSystem,
    timer: Option<JoinHandle<()>>,
}

impl TimerThreads {
    pub fn system(&self) -> &TimerSystem {
        &self.system
    }

    /// Waits for the threads to exit. Returns once shutdown has been requested elsewhere and both
    /// threads have finished their current sleep.
    pub fn join(mut self) {
        self.join_all();
    }

    /// Requests shutdown, then joins.
    pub fn shutdown(self) {
        self.system.request_shutdown();
        self.join();
    }

    fn join_all(&mut self) {
        if let Some(timer) = self.timer.take() {
            if timer.join().is_err() {
                warn!(thread = TIMER_THREAD_NAME, "thread panicked");
            }
        }

        let rubato = self
            .system
            .shared
            .rubato
            .lock()
            .expect("rubato lock poisoned")
            .handle
            .take();
        if let Some(rubato) = rubato {
            if rubato.join().is_err() {
                warn!(thread = RUBATO_THREAD_NAME, "thread panicked");
            }
        }
    }
}

impl Drop for TimerThreads {
    fn drop(&mut self) {
        self.system.request_shutdown();
    }
}
