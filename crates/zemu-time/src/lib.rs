//! Host time sampling and the emulated time-of-day (TOD) clock.
//!
//! All timer comparisons in the emulator are made against a single TOD clock expressed in
//! internal clock units (the top 64 bits of the extended TOD clock, 16 units per microsecond).
//! In production the clock is advanced from the host wall clock; unit tests drive it
//! deterministically through [`FakeHostClock`].

#![forbid(unsafe_code)]

mod clock;
mod tod;

pub use clock::{FakeHostClock, HostClock, StdHostClock};
pub use tod::{
    tod_from_unix_ns, tod_to_us, us_to_tod, TodClock, TOD_EPOCH_OFFSET_SECS, TOD_UNITS_PER_SEC,
    TOD_UNITS_PER_US,
};
