use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::{self, Thread};
use std::time::Duration;

use crate::{CpuMask, SmpError};

/// Resumes processors that are idle-waiting so they can take a newly pending interrupt.
pub trait WakeSignal: Send + Sync {
    fn wake_cpus(&self, mask: CpuMask);
}

impl<F> WakeSignal for F
where
    F: Fn(CpuMask) + Send + Sync,
{
    fn wake_cpus(&self, mask: CpuMask) {
        self(mask)
    }
}

/// Wake signal for configurations without processor threads (device-server mode).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWake;

impl WakeSignal for NoWake {
    fn wake_cpus(&self, _mask: CpuMask) {}
}

/// Thread-park based wake signal.
///
/// Each processor thread registers itself and idles in [`ParkWake::wait`]; a wake for its bit
/// unparks it. A wake that arrives before the thread parks is latched, so it is never lost.
#[derive(Debug)]
pub struct ParkWake {
    threads: Mutex<Vec<Option<Thread>>>,
    pending: Box<[AtomicBool]>,
}

impl ParkWake {
    pub fn new(count: usize) -> Self {
        Self {
            threads: Mutex::new(vec![None; count]),
            pending: (0..count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Registers the calling thread as the execution thread of `cpu`.
    pub fn register_current(&self, cpu: usize) -> Result<(), SmpError> {
        let mut threads = self.threads.lock().expect("wake registry lock poisoned");
        let count = threads.len();
        let slot = threads
            .get_mut(cpu)
            .ok_or(SmpError::NoSuchProcessor { cpu, count })?;
        *slot = Some(thread::current());
        Ok(())
    }

    pub fn unregister(&self, cpu: usize) {
        let mut threads = self.threads.lock().expect("wake registry lock poisoned");
        if let Some(slot) = threads.get_mut(cpu) {
            *slot = None;
        }
    }

    /// Idles the calling thread until `cpu` is woken or `timeout` elapses.
    ///
    /// Returns `true` if a wake was consumed. Spurious unparks return `false`.
    pub fn wait(&self, cpu: usize, timeout: Duration) -> bool {
        if self.pending[cpu].swap(false, Ordering::AcqRel) {
            return true;
        }
        thread::park_timeout(timeout);
        self.pending[cpu].swap(false, Ordering::AcqRel)
    }
}

impl WakeSignal for ParkWake {
    fn wake_cpus(&self, mask: CpuMask) {
        if mask.is_empty() {
            return;
        }
        let threads = self.threads.lock().expect("wake registry lock poisoned");
        for cpu in mask.iter() {
            let Some(flag) = self.pending.get(cpu) else {
                continue;
            };
            flag.store(true, Ordering::Release);
            if let Some(thread) = threads.get(cpu).and_then(Option::as_ref) {
                thread.unpark();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn wake_before_wait_is_latched() {
        let wake = ParkWake::new(2);
        wake.register_current(1).unwrap();
        wake.wake_cpus(CpuMask::bit(1));
        assert!(wake.wait(1, Duration::from_secs(5)));
        assert!(!wake.wait(1, Duration::from_millis(1)));
    }

    #[test]
    fn wake_unparks_waiting_thread() {
        let wake = Arc::new(ParkWake::new(1));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let waiter = {
            let wake = Arc::clone(&wake);
            thread::spawn(move || {
                wake.register_current(0).unwrap();
                ready_tx.send(()).unwrap();
                let start = Instant::now();
                while !wake.wait(0, Duration::from_secs(10)) {
                    assert!(start.elapsed() < Duration::from_secs(10), "never woken");
                }
            })
        };

        ready_rx.recv().unwrap();
        wake.wake_cpus(CpuMask::bit(0));
        waiter.join().unwrap();
    }

    #[test]
    fn out_of_range_bits_are_ignored() {
        let wake = ParkWake::new(1);
        wake.wake_cpus(CpuMask::bit(5));
        assert!(!wake.wait(0, Duration::from_millis(1)));
    }

    #[test]
    fn register_rejects_unknown_processor() {
        let wake = ParkWake::new(2);
        assert_eq!(
            wake.register_current(2),
            Err(SmpError::NoSuchProcessor { cpu: 2, count: 2 })
        );
    }
}
