use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use zemu_smp::{CpuMask, CpuState, TimerContext, WakeSignal};
use zemu_time::FakeHostClock;
use zemu_timers::{ConfigError, TimerConfig, TimerError, TimerSystem};

const SEC_NS: u64 = 1_000_000_000;

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<CpuMask>>>);

impl Recorder {
    fn signal(&self) -> Arc<dyn WakeSignal> {
        let log = Arc::clone(&self.0);
        Arc::new(move |mask: CpuMask| log.lock().unwrap().push(mask))
    }

    fn masks(&self) -> Vec<CpuMask> {
        self.0.lock().unwrap().clone()
    }
}

fn started_system(cpus: usize, recorder: &Recorder) -> (TimerSystem, FakeHostClock) {
    let clock = FakeHostClock::new(SEC_NS);
    let system = TimerSystem::builder(TimerConfig::default())
        .cpus(cpus)
        .host_clock(Arc::new(clock.clone()))
        .wake_signal(recorder.signal())
        .build()
        .unwrap();
    {
        let mut guard = system.registry().lock_interrupts();
        for cpu in 0..cpus {
            guard.set_online(cpu, true);
            guard.set_state(cpu, CpuState::Started);
        }
    }
    (system, clock)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
fn four_processor_scenario_wakes_first_two() {
    let recorder = Recorder::default();
    let (system, _clock) = started_system(4, &recorder);
    let now = system.tod().current();
    {
        let mut guard = system.registry().lock_interrupts();
        guard.timers_mut(0).host.clock_comparator = now - 1;
        guard.timers_mut(1).host.cpu_timer = -1;
        guard.timers_mut(3).host.clock_comparator = now - 1;
        guard.set_state(3, CpuState::Stopped);
    }

    let expected: CpuMask = [0, 1].into_iter().collect();
    assert_eq!(system.update_cpu_timers(), expected);
    assert_eq!(recorder.masks(), vec![expected]);

    let guard = system.registry().lock_interrupts();
    assert!(!guard.timers(2).host.clock_comparator_pending);
    assert!(!guard.timers(3).host.clock_comparator_pending);
}

#[test]
fn repeated_check_only_signals_new_conditions() {
    let recorder = Recorder::default();
    let (system, _clock) = started_system(2, &recorder);
    system
        .registry()
        .lock_interrupts()
        .timers_mut(0)
        .host
        .cpu_timer = -1;

    assert_eq!(system.update_cpu_timers(), CpuMask::bit(0));
    assert_eq!(system.update_cpu_timers(), CpuMask::empty());
    // Empty masks are not signalled.
    assert_eq!(recorder.masks(), vec![CpuMask::bit(0)]);
    assert!(system.registry().lock_interrupts().timers(0).host.cpu_timer_pending);
}

#[test]
fn comparator_follows_tod_and_nested_context_wakes_host() {
    let recorder = Recorder::default();
    let (system, clock) = started_system(1, &recorder);
    let deadline = system.tod().current() + 16;
    {
        let mut guard = system.registry().lock_interrupts();
        guard.enter_nested(
            0,
            TimerContext {
                clock_comparator: deadline,
                ..TimerContext::default()
            },
        );
    }

    assert_eq!(system.update_cpu_timers(), CpuMask::empty());
    clock.advance_ns(2_000);
    system.tod().advance();
    assert_eq!(system.update_cpu_timers(), CpuMask::bit(0));

    let guard = system.registry().lock_interrupts();
    let timers = guard.timers(0);
    assert!(!timers.host.clock_comparator_pending);
    assert!(timers.nested.as_ref().unwrap().clock_comparator_pending);
}

#[test]
fn processor_less_system_never_signals() {
    let recorder = Recorder::default();
    let (system, _clock) = started_system(0, &recorder);
    assert_eq!(system.update_cpu_timers(), CpuMask::empty());
    assert!(recorder.masks().is_empty());
}

#[test]
fn builder_rejects_bad_configuration() {
    let err = TimerSystem::builder(TimerConfig {
        timer_interval_us: 2_000_000,
        ..TimerConfig::default()
    })
    .build()
    .unwrap_err();
    assert!(matches!(
        err,
        TimerError::Config(ConfigError::IntervalOutOfRange { value: 2_000_000, .. })
    ));

    let err = TimerSystem::builder(TimerConfig::default())
        .cpus(65)
        .build()
        .unwrap_err();
    assert!(matches!(err, TimerError::Smp(_)));
}

#[test]
fn base_interval_changes_are_validated() {
    let system = TimerSystem::builder(TimerConfig {
        max_interval_us: 1_000,
        ..TimerConfig::default()
    })
    .build()
    .unwrap();

    assert_eq!(system.set_base_interval_us(200), Ok(()));
    assert_eq!(system.base_interval_us(), 200);
    assert_eq!(system.effective_interval_us(), 200);

    assert_eq!(
        system.set_base_interval_us(5_000),
        Err(ConfigError::MaxBelowBase {
            base: 5_000,
            max: 1_000
        })
    );
    assert!(system.set_base_interval_us(0).is_err());
    assert_eq!(
        system.set_maxrates_interval_minutes(0),
        Err(ConfigError::ZeroReportInterval)
    );
    assert_eq!(system.base_interval_us(), 200);
}

#[test]
fn threads_start_and_shut_down() {
    let system = TimerSystem::builder(TimerConfig {
        adaptive: true,
        max_interval_us: 5_000,
        ..TimerConfig::default()
    })
    .cpus(1)
    .build()
    .unwrap();

    let start = system.tod().current();
    let threads = system.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || system.tod().current() > start));

    threads.shutdown();
    assert!(system.is_shutdown());
    assert_eq!(system.effective_interval_us(), system.base_interval_us());
}

#[test]
fn modulator_stretches_interval_and_resets_on_disable() {
    let system = TimerSystem::builder(TimerConfig {
        timer_interval_us: 100,
        max_interval_us: 2_000,
        ..TimerConfig::default()
    })
    .build()
    .unwrap();
    let threads = system.start().unwrap();
    assert!(!system.is_adaptive());

    system.set_adaptive(true).unwrap();
    let stretched = wait_until(Duration::from_secs(5), || {
        system.add_transactions(1_000);
        system.effective_interval_us() == 2_000
    });
    assert!(stretched, "interval never reached the maximum");

    system.set_adaptive(false).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        system.effective_interval_us() == 100
    }));

    threads.shutdown();
}

#[test]
fn builder_carries_adaptive_setting() {
    let adaptive = TimerSystem::builder(TimerConfig {
        adaptive: true,
        ..TimerConfig::default()
    })
    .build()
    .unwrap();
    assert!(adaptive.is_adaptive());
    assert_eq!(adaptive.effective_interval_us(), adaptive.base_interval_us());

    let fixed = TimerSystem::builder(TimerConfig::default()).build().unwrap();
    assert!(!fixed.is_adaptive());
}
