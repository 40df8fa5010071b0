//! Timer core: TOD ticking, timer-interrupt detection, processor statistics and adaptive tick
//! modulation.
//!
//! [`TimerSystem`] is the shared handle. Its background threads are started with
//! [`TimerSystem::start`]:
//!
//! - the **timer thread** ([`TickDriver`]) advances the TOD clock, runs the interrupt check and,
//!   once per second of TOD time, recomputes MIPS / SIO / busy statistics;
//! - the optional **rubato thread** stretches or shrinks the tick interval used while processors
//!   request transactional-execution relief, based on recent transaction throughput.
//!
//! Execution threads call [`TimerSystem::update_cpu_timers`] directly after changing a
//! processor's comparator or CPU timer.

#![forbid(unsafe_code)]

mod checker;
mod config;
mod error;
mod interval;
mod rates;
mod rubato;
mod stats;
mod system;
mod tick;

pub use checker::check_timers;
pub use config::{
    TimerConfig, DEFAULT_MAXRATES_INTERVAL_MINUTES, DEFAULT_TIMER_INTERVAL_US, MAX_TOD_UPDATE_US,
    MIN_TOD_UPDATE_US,
};
pub use error::{ConfigError, TimerError};
pub use interval::{IntervalTimerCheck, LegacyIntervalTimer};
pub use rates::{busy_percent, diffrate};
pub use rubato::{modulated_interval_us, RubatoWindow, RUBATO_WINDOW};
pub use stats::{HighWaterMarks, SystemStats, SystemStatsSnapshot};
pub use system::{TimerSystem, TimerSystemBuilder, TimerThreads};
pub use tick::{sample_statistics, StatsSample, TickDriver, PPA_SOME_HELP_THRESHOLD, STATS_PERIOD};
