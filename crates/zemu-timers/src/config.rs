use crate::ConfigError;

/// Smallest accepted tick interval.
pub const MIN_TOD_UPDATE_US: u32 = 1;
/// Largest accepted tick interval (one second).
pub const MAX_TOD_UPDATE_US: u32 = 1_000_000;
pub const DEFAULT_TIMER_INTERVAL_US: u32 = 50;
/// One day.
pub const DEFAULT_MAXRATES_INTERVAL_MINUTES: u32 = 1440;

/// Operator settings for the timer core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    /// Base tick interval. Also the lower bound of the adaptive interval.
    pub timer_interval_us: u32,
    /// Upper bound of the adaptive interval.
    pub max_interval_us: u32,
    /// Run the rubato modulator.
    pub adaptive: bool,
    /// Length of a rate high-water-mark reporting interval.
    pub maxrates_interval_minutes: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            timer_interval_us: DEFAULT_TIMER_INTERVAL_US,
            max_interval_us: MAX_TOD_UPDATE_US,
            adaptive: false,
            maxrates_interval_minutes: DEFAULT_MAXRATES_INTERVAL_MINUTES,
        }
    }
}

impl TimerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_interval(self.timer_interval_us)?;
        check_interval(self.max_interval_us)?;
        if self.max_interval_us < self.timer_interval_us {
            return Err(ConfigError::MaxBelowBase {
                base: self.timer_interval_us,
                max: self.max_interval_us,
            });
        }
        if self.maxrates_interval_minutes == 0 {
            return Err(ConfigError::ZeroReportInterval);
        }
        Ok(())
    }
}

pub(crate) fn check_interval(value: u32) -> Result<(), ConfigError> {
    if !(MIN_TOD_UPDATE_US..=MAX_TOD_UPDATE_US).contains(&value) {
        return Err(ConfigError::IntervalOutOfRange {
            value,
            min: MIN_TOD_UPDATE_US,
            max: MAX_TOD_UPDATE_US,
        });
    }
    Ok(())
}
