use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::HostClock;

/// Internal TOD units per microsecond (TOD clock bit 59 of the 64-bit internal format).
pub const TOD_UNITS_PER_US: u64 = 16;
pub const TOD_UNITS_PER_SEC: u64 = TOD_UNITS_PER_US * 1_000_000;

/// Seconds between the TOD epoch (1900-01-01) and the Unix epoch.
pub const TOD_EPOCH_OFFSET_SECS: u64 = 2_208_988_800;

const NS_PER_US: u128 = 1_000;

/// Converts a host sample (ns since the Unix epoch) into an absolute TOD value.
pub fn tod_from_unix_ns(unix_ns: u64) -> u64 {
    let since_unix = (unix_ns as u128) * (TOD_UNITS_PER_US as u128) / NS_PER_US;
    let epoch = (TOD_EPOCH_OFFSET_SECS as u128) * (TOD_UNITS_PER_SEC as u128);
    u64::try_from(since_unix + epoch).unwrap_or(u64::MAX)
}

pub fn us_to_tod(us: u64) -> u64 {
    us.saturating_mul(TOD_UNITS_PER_US)
}

pub fn tod_to_us(tod: u64) -> u64 {
    tod / TOD_UNITS_PER_US
}

#[derive(Debug)]
struct TodAnchor {
    last_host_ns: u64,
    /// Sub-unit remainder, scaled by `TOD_UNITS_PER_US` (always `< NS_PER_US`).
    carry: u128,
}

/// The emulated time-of-day clock.
///
/// [`TodClock::advance`] is called by the timer thread; every other reader uses the lock-free
/// [`TodClock::current`]. The value never decreases: a host sample that is earlier than the
/// previous one re-anchors the clock without moving it.
pub struct TodClock {
    host: Arc<dyn HostClock>,
    anchor: Mutex<TodAnchor>,
    value: AtomicU64,
}

impl TodClock {
    pub fn new(host: Arc<dyn HostClock>) -> Self {
        let now_ns = host.now_ns();
        Self {
            host,
            anchor: Mutex::new(TodAnchor {
                last_host_ns: now_ns,
                carry: 0,
            }),
            value: AtomicU64::new(tod_from_unix_ns(now_ns)),
        }
    }

    /// Samples the host clock, moves the TOD forward by the elapsed interval and returns the new
    /// value.
    pub fn advance(&self) -> u64 {
        let mut anchor = self.anchor.lock().expect("tod anchor lock poisoned");
        let host_ns = self.host.now_ns();

        let Some(delta_ns) = host_ns.checked_sub(anchor.last_host_ns) else {
            // Host clock stepped backwards; hold the TOD where it is.
            anchor.last_host_ns = host_ns;
            return self.value.load(Ordering::Acquire);
        };
        anchor.last_host_ns = host_ns;

        let scaled = (delta_ns as u128) * (TOD_UNITS_PER_US as u128) + anchor.carry;
        anchor.carry = scaled % NS_PER_US;
        let units = u64::try_from(scaled / NS_PER_US).unwrap_or(u64::MAX);

        let next = self.value.load(Ordering::Acquire).saturating_add(units);
        self.value.store(next, Ordering::Release);
        next
    }

    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TodClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodClock")
            .field("value", &self.current())
            .finish_non_exhaustive()
    }
}
