use thiserror::Error;
use zemu_smp::SmpError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("timer interval {value}us outside {min}..={max}us")]
    IntervalOutOfRange { value: u32, min: u32, max: u32 },

    #[error("maximum interval {max}us is below the base interval {base}us")]
    MaxBelowBase { base: u32, max: u32 },

    #[error("maxrates reporting interval must be at least one minute")]
    ZeroReportInterval,
}

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("invalid timer configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid processor configuration: {0}")]
    Smp(#[from] SmpError),

    #[error("failed to spawn {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
