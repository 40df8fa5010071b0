use zemu_smp::{ArchMode, CpuMask, InterruptGuard, TimerContext};

use crate::IntervalTimerCheck;

/// Clock comparator and CPU timer check for one context.
///
/// Pending flags track the current condition; the return value is `true` only when a flag went
/// from clear to set, so a processor is woken once per new condition.
fn check_context(ctx: &mut TimerContext, tod: u64) -> bool {
    let mut wake = false;

    if ctx.tod_clock(tod) > ctx.clock_comparator {
        if !ctx.clock_comparator_pending {
            ctx.clock_comparator_pending = true;
            wake = true;
        }
    } else {
        ctx.clock_comparator_pending = false;
    }

    if ctx.cpu_timer < 0 {
        if !ctx.cpu_timer_pending {
            ctx.cpu_timer_pending = true;
            wake = true;
        }
    } else {
        ctx.cpu_timer_pending = false;
    }

    wake
}

/// Evaluates the timer interrupt conditions of every runnable processor and returns the set of
/// processors with a newly pending interrupt.
///
/// The caller holds the global interrupt lock (`guard`) and is responsible for signalling the
/// returned mask before releasing it.
pub fn check_timers(
    guard: &mut InterruptGuard<'_>,
    tod: u64,
    interval_timer: &dyn IntervalTimerCheck,
) -> CpuMask {
    let mut mask = CpuMask::empty();

    for cpu in 0..guard.count() {
        if !guard.is_runnable(cpu) {
            continue;
        }
        let timers = guard.timers_mut(cpu);

        let mut wake = check_context(&mut timers.host, tod);
        if let Some(nested) = timers.nested.as_mut() {
            wake |= check_context(nested, tod);
        }

        if timers.host.arch_mode == ArchMode::S370 && interval_timer.check(&mut timers.host) {
            wake = true;
        }
        if let Some(nested) = timers.nested.as_mut() {
            if nested.arch_mode == ArchMode::S370
                && !nested.interval_timer_masked
                && interval_timer.check(nested)
            {
                wake = true;
            }
        }

        if wake {
            mask.insert(cpu);
        }
    }

    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LegacyIntervalTimer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use zemu_smp::{CpuState, ProcessorRegistry};

    const TOD: u64 = 1_000_000;

    fn registry(count: usize) -> ProcessorRegistry {
        let registry = ProcessorRegistry::new(count).unwrap();
        {
            let mut guard = registry.lock_interrupts();
            for cpu in 0..count {
                guard.set_online(cpu, true);
                guard.set_state(cpu, CpuState::Started);
            }
        }
        registry
    }

    fn check(registry: &ProcessorRegistry, tod: u64) -> CpuMask {
        check_timers(&mut registry.lock_interrupts(), tod, &LegacyIntervalTimer)
    }

    #[test]
    fn comparator_flag_follows_condition() {
        let registry = registry(1);
        registry.lock_interrupts().timers_mut(0).host.clock_comparator = TOD;

        assert_eq!(check(&registry, TOD), CpuMask::empty());
        assert!(!registry.lock_interrupts().timers(0).host.clock_comparator_pending);

        assert_eq!(check(&registry, TOD + 1), CpuMask::bit(0));
        assert!(registry.lock_interrupts().timers(0).host.clock_comparator_pending);

        // Comparator moved past the clock: flag clears without waking anyone.
        registry.lock_interrupts().timers_mut(0).host.clock_comparator = TOD + 10;
        assert_eq!(check(&registry, TOD + 2), CpuMask::empty());
        assert!(!registry.lock_interrupts().timers(0).host.clock_comparator_pending);
    }

    #[test]
    fn comparator_uses_context_epoch() {
        let registry = registry(1);
        {
            let mut guard = registry.lock_interrupts();
            let host = &mut guard.timers_mut(0).host;
            host.clock_comparator = TOD;
            host.tod_epoch = 5;
        }
        assert_eq!(check(&registry, TOD - 4), CpuMask::bit(0));
    }

    #[test]
    fn cpu_timer_wakes_on_transition_only() {
        let registry = registry(2);
        registry.lock_interrupts().timers_mut(1).host.cpu_timer = -1;

        assert_eq!(check(&registry, TOD), CpuMask::bit(1));
        assert_eq!(check(&registry, TOD), CpuMask::empty());
        assert!(registry.lock_interrupts().timers(1).host.cpu_timer_pending);

        registry.lock_interrupts().timers_mut(1).host.cpu_timer = 100;
        assert_eq!(check(&registry, TOD), CpuMask::empty());
        assert!(!registry.lock_interrupts().timers(1).host.cpu_timer_pending);
    }

    #[test]
    fn nested_context_wakes_host_bit() {
        let registry = registry(3);
        let nested = TimerContext {
            cpu_timer: -5,
            ..TimerContext::default()
        };
        registry.lock_interrupts().enter_nested(2, nested);

        assert_eq!(check(&registry, TOD), CpuMask::bit(2));
        {
            let guard = registry.lock_interrupts();
            let timers = guard.timers(2);
            assert!(!timers.host.cpu_timer_pending);
            assert!(timers.nested.as_ref().unwrap().cpu_timer_pending);
        }

        // Same transition semantics as the host: no second wake while still negative.
        assert_eq!(check(&registry, TOD), CpuMask::empty());
        assert!(registry.lock_interrupts().timers(2).nested.as_ref().unwrap().cpu_timer_pending);

        registry
            .lock_interrupts()
            .timers_mut(2)
            .nested
            .as_mut()
            .unwrap()
            .cpu_timer = 7;
        assert_eq!(check(&registry, TOD), CpuMask::empty());
        assert!(!registry.lock_interrupts().timers(2).nested.as_ref().unwrap().cpu_timer_pending);
    }

    #[test]
    fn nested_comparator_is_independent_of_host() {
        let registry = registry(1);
        {
            let mut guard = registry.lock_interrupts();
            guard.timers_mut(0).host.clock_comparator = TOD - 1;
            guard.enter_nested(
                0,
                TimerContext {
                    clock_comparator: TOD - 1,
                    ..TimerContext::default()
                },
            );
        }
        assert_eq!(check(&registry, TOD), CpuMask::bit(0));
        let guard = registry.lock_interrupts();
        assert!(guard.timers(0).host.clock_comparator_pending);
        assert!(guard.timers(0).nested.as_ref().unwrap().clock_comparator_pending);
    }

    #[test]
    fn interval_timer_only_checked_in_s370_mode() {
        let calls = AtomicUsize::new(0);
        let predicate = |_: &mut TimerContext| {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        };

        let registry = registry(2);
        registry.lock_interrupts().timers_mut(1).host.arch_mode = ArchMode::S370;

        let mask = check_timers(&mut registry.lock_interrupts(), TOD, &predicate);
        assert_eq!(mask, CpuMask::bit(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The predicate decides expiry on every call; the checker adds no edge detection.
        let mask = check_timers(&mut registry.lock_interrupts(), TOD, &predicate);
        assert_eq!(mask, CpuMask::bit(1));
    }

    #[test]
    fn nested_interval_timer_respects_mask_control() {
        let registry = registry(1);
        {
            let mut guard = registry.lock_interrupts();
            guard.enter_nested(
                0,
                TimerContext {
                    interval_timer: -1,
                    interval_timer_masked: true,
                    ..TimerContext::new(ArchMode::S370)
                },
            );
        }
        assert_eq!(check(&registry, TOD), CpuMask::empty());

        registry
            .lock_interrupts()
            .timers_mut(0)
            .nested
            .as_mut()
            .unwrap()
            .interval_timer_masked = false;
        assert_eq!(check(&registry, TOD), CpuMask::bit(0));
        assert!(
            registry
                .lock_interrupts()
                .timers(0)
                .nested
                .as_ref()
                .unwrap()
                .interval_timer_pending
        );
    }

    #[test]
    fn stopped_and_offline_processors_are_skipped() {
        let registry = registry(2);
        {
            let mut guard = registry.lock_interrupts();
            guard.set_state(0, CpuState::Stopped);
            guard.set_online(1, false);
            for cpu in 0..2 {
                let host = &mut guard.timers_mut(cpu).host;
                host.clock_comparator = 0;
                host.cpu_timer = -1;
            }
        }
        assert_eq!(check(&registry, TOD), CpuMask::empty());
        let guard = registry.lock_interrupts();
        for cpu in 0..2 {
            assert!(!guard.timers(cpu).host.clock_comparator_pending);
            assert!(!guard.timers(cpu).host.cpu_timer_pending);
        }
    }
}
