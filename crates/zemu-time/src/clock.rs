use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of host wall-clock samples.
pub trait HostClock: Send + Sync {
    /// Nanoseconds since the Unix epoch.
    ///
    /// Wall-clock time is allowed to step backwards (NTP adjustments, manual changes); consumers
    /// must not assume successive samples are ordered.
    fn now_ns(&self) -> u64;
}

/// Host wall clock backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHostClock;

impl HostClock for StdHostClock {
    fn now_ns(&self) -> u64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since_epoch) => u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX),
            // Host clock set before 1970.
            Err(_) => 0,
        }
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same underlying time value, so a test can keep one handle while the clock
/// under test owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeHostClock {
    now_ns: Arc<AtomicU64>,
}

impl FakeHostClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: Arc::new(AtomicU64::new(start_ns)),
        }
    }

    pub fn set_ns(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    pub fn advance_ns(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }

    /// Steps the clock backwards, as a host time adjustment would.
    pub fn rewind_ns(&self, delta_ns: u64) {
        let now = self.now_ns.load(Ordering::SeqCst);
        self.now_ns.store(now.saturating_sub(delta_ns), Ordering::SeqCst);
    }
}

impl HostClock for FakeHostClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}
