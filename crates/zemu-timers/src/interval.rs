use zemu_smp::TimerContext;

/// Architecture-specific interval-timer expiry test.
///
/// Called with the global interrupt lock held, for contexts running in S/370 mode. The
/// predicate may update the context's interval-timer bookkeeping fields.
pub trait IntervalTimerCheck: Send + Sync {
    /// Returns `true` if the interval timer of `ctx` expired and an interrupt became pending.
    fn check(&self, ctx: &mut TimerContext) -> bool;
}

impl<F> IntervalTimerCheck for F
where
    F: Fn(&mut TimerContext) -> bool + Send + Sync,
{
    fn check(&self, ctx: &mut TimerContext) -> bool {
        self(ctx)
    }
}

/// S/370 interval timer: an interrupt becomes pending when the timer value crosses from
/// non-negative to negative.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyIntervalTimer;

impl IntervalTimerCheck for LegacyIntervalTimer {
    fn check(&self, ctx: &mut TimerContext) -> bool {
        let value = ctx.interval_timer;
        let expired = value < 0 && ctx.interval_timer_prev >= 0;
        if expired {
            ctx.interval_timer_pending = true;
        }
        ctx.interval_timer_prev = value;
        expired
    }
}
