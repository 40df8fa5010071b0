/// Processor run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CpuState {
    Stopped = 0,
    Stopping = 1,
    Started = 2,
}

impl CpuState {
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Stopping,
            2 => Self::Started,
            _ => Self::Stopped,
        }
    }
}

/// Architecture the processor is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArchMode {
    /// System/370 compatibility; the only mode with an interval timer.
    S370,
    Esa390,
    #[default]
    ZArch,
}

/// Timer-related state of one register context.
///
/// The same shape is used for a processor's host context and for its nested (interpretive
/// execution) context, so a single check applies to both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerContext {
    pub arch_mode: ArchMode,
    /// Clock comparator, in TOD units.
    pub clock_comparator: u64,
    /// CPU timer, in TOD units. Decremented by the execution side; negative means expired.
    pub cpu_timer: i64,
    /// Offset applied to the system TOD clock when this context reads it.
    pub tod_epoch: i64,

    pub clock_comparator_pending: bool,
    pub cpu_timer_pending: bool,
    pub interval_timer_pending: bool,

    /// Legacy interval timer value, maintained by the execution side.
    pub interval_timer: i32,
    /// Interval timer value seen at the previous check.
    pub interval_timer_prev: i32,
    /// Virtualization control suppressing interval-timer delivery to a nested context.
    ///
    /// Ignored for host contexts.
    pub interval_timer_masked: bool,
}

impl TimerContext {
    /// A context with neither the comparator nor the CPU timer armed.
    pub fn new(arch_mode: ArchMode) -> Self {
        Self {
            arch_mode,
            clock_comparator: u64::MAX,
            cpu_timer: i64::MAX,
            tod_epoch: 0,
            clock_comparator_pending: false,
            cpu_timer_pending: false,
            interval_timer_pending: false,
            interval_timer: 0,
            interval_timer_prev: 0,
            interval_timer_masked: false,
        }
    }

    /// The TOD clock as seen by this context.
    pub fn tod_clock(&self, system_tod: u64) -> u64 {
        system_tod.wrapping_add_signed(self.tod_epoch)
    }
}

impl Default for TimerContext {
    fn default() -> Self {
        Self::new(ArchMode::default())
    }
}

/// Host context plus the nested context, which exists only while interpretive execution is
/// active on the processor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorTimers {
    pub host: TimerContext,
    pub nested: Option<TimerContext>,
}
