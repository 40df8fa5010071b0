//! Per-processor state shared between the emulated CPUs and the timer core.
//!
//! Every processor is addressed by a stable index into a [`ProcessorRegistry`]. Access follows a
//! two-tier lock discipline:
//!
//! - the **global interrupt lock** ([`ProcessorRegistry::lock_interrupts`]) guards the timer
//!   fields (comparator, CPU timer, mode, pending flags) of every processor, plus the
//!   online/state transitions;
//! - a **per-processor lock** ([`ProcessorRegistry::lock_stats`]) guards that processor's
//!   counters and derived rates.
//!
//! Neither lock is ever held across more than one processor's statistics, and neither is held
//! across a sleep.

#![forbid(unsafe_code)]

mod context;
mod error;
mod mask;
mod registry;
mod stats;
mod wake;

pub use context::{ArchMode, CpuState, ProcessorTimers, TimerContext};
pub use error::SmpError;
pub use mask::{CpuMask, CpuMaskIter, MAX_CPUS};
pub use registry::{InterruptGuard, ProcessorRegistry};
pub use stats::{CpuRates, CpuStats, TxAssist};
pub use wake::{NoWake, ParkWake, WakeSignal};
