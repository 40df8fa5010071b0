//! Timing and interrupt-scheduling core of the zemu multiprocessor emulator.
//!
//! This crate re-exports the workspace pieces under one roof:
//!
//! - [`time`]: host clock abstraction and the TOD clock;
//! - [`smp`]: processor registry, timer contexts, wake signalling;
//! - [`timers`]: interrupt checker, tick driver, statistics and interval modulation.

#![forbid(unsafe_code)]

pub use zemu_smp as smp;
pub use zemu_time as time;
pub use zemu_timers as timers;

pub use zemu_timers::{TimerConfig, TimerError, TimerSystem, TimerThreads};
