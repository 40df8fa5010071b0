#![forbid(unsafe_code)]

//! Native runner that drives the timer core with synthetic processor threads and prints the
//! resulting statistics as JSON.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use zemu_smp::{CpuRates, CpuState, ParkWake};
use zemu_time::us_to_tod;
use zemu_timers::{
    SystemStatsSnapshot, TimerConfig, TimerSystem, DEFAULT_MAXRATES_INTERVAL_MINUTES,
    DEFAULT_TIMER_INTERVAL_US, MAX_TOD_UPDATE_US,
};

/// Instructions accounted per simulated execution slice.
const SLICE_INSTRUCTIONS: u64 = 10_000;

#[derive(Debug, Parser)]
#[command(name = "zemu-tod", version, about = "Run the TOD/timer core against a synthetic workload")]
struct Args {
    /// Number of emulated processors.
    ///
    /// Environment variable: `ZEMU_CPUS`.
    #[arg(long, env = "ZEMU_CPUS", default_value_t = 2)]
    cpus: usize,

    /// Base timer tick interval in microseconds.
    ///
    /// Environment variable: `ZEMU_TIMER_INTERVAL_US`.
    #[arg(long, env = "ZEMU_TIMER_INTERVAL_US", default_value_t = DEFAULT_TIMER_INTERVAL_US)]
    timer_interval_us: u32,

    /// Upper bound for the adaptive tick interval in microseconds.
    ///
    /// Environment variable: `ZEMU_MAX_INTERVAL_US`.
    #[arg(long, env = "ZEMU_MAX_INTERVAL_US", default_value_t = MAX_TOD_UPDATE_US)]
    max_interval_us: u32,

    /// Stretch the tick interval under transactional load.
    ///
    /// Environment variable: `ZEMU_ADAPTIVE`.
    #[arg(long, env = "ZEMU_ADAPTIVE")]
    adaptive: bool,

    /// Rate high-water-mark reporting interval in minutes.
    ///
    /// Environment variable: `ZEMU_MAXRATES_INTERVAL`.
    #[arg(long, env = "ZEMU_MAXRATES_INTERVAL", default_value_t = DEFAULT_MAXRATES_INTERVAL_MINUTES)]
    maxrates_interval_minutes: u32,

    /// How long to run, in milliseconds of host time.
    ///
    /// Environment variable: `ZEMU_DURATION_MS`.
    #[arg(long, env = "ZEMU_DURATION_MS", default_value_t = 2_500)]
    duration_ms: u64,

    /// Transactions each processor commits per execution slice. Non-zero values also make the
    /// processors request transactional relief.
    ///
    /// Environment variable: `ZEMU_TX_PER_SLICE`.
    #[arg(long, env = "ZEMU_TX_PER_SLICE", default_value_t = 0)]
    tx_per_slice: u64,

    /// Clock comparator distance, in microseconds, armed by each processor before it idles.
    ///
    /// Environment variable: `ZEMU_COMPARATOR_US`.
    #[arg(long, env = "ZEMU_COMPARATOR_US", default_value_t = 1_000)]
    comparator_us: u64,

    /// Log filter (tracing-subscriber EnvFilter syntax). Falls back to `RUST_LOG`, then `info`.
    ///
    /// Environment variable: `ZEMU_LOG_LEVEL`.
    #[arg(long, env = "ZEMU_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    fn timer_config(&self) -> TimerConfig {
        TimerConfig {
            timer_interval_us: self.timer_interval_us,
            max_interval_us: self.max_interval_us,
            adaptive: self.adaptive,
            maxrates_interval_minutes: self.maxrates_interval_minutes,
        }
    }
}

#[derive(Debug, Serialize)]
struct CpuReport {
    cpu: usize,
    #[serde(flatten)]
    rates: CpuRates,
    instruction_total: u64,
    wait_time_accumulated: u64,
    timer_interrupts: u64,
}

#[derive(Debug, Serialize)]
struct Report {
    tod: u64,
    base_interval_us: u32,
    effective_interval_us: u32,
    cpus: Vec<CpuReport>,
    system: SystemStatsSnapshot,
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Synthetic execution loop of one processor: account a slice of work, arm the comparator, idle
/// until the timer core wakes us.
fn run_processor(
    cpu: usize,
    system: TimerSystem,
    wake: Arc<ParkWake>,
    stop: Arc<AtomicBool>,
    interrupts: Arc<AtomicU64>,
    args: &ProcessorArgs,
) -> Result<()> {
    wake.register_current(cpu)?;

    while !stop.load(Ordering::Acquire) {
        {
            let mut stats = system.registry().lock_stats(cpu);
            stats.count_instructions(SLICE_INSTRUCTIONS);
            stats.tx_assist.host = u32::from(args.tx_per_slice > 0);
        }
        if args.tx_per_slice > 0 {
            system.add_transactions(args.tx_per_slice);
        }

        let deadline = system.tod().current() + us_to_tod(args.comparator_us);
        system
            .registry()
            .lock_interrupts()
            .timers_mut(cpu)
            .host
            .clock_comparator = deadline;
        system.update_cpu_timers();

        system
            .registry()
            .lock_stats(cpu)
            .begin_wait(system.tod().current());
        let woken = wake.wait(cpu, Duration::from_millis(50));
        system
            .registry()
            .lock_stats(cpu)
            .end_wait(system.tod().current());

        if woken {
            // Take the interrupt: disarm the comparator and clear the pending condition.
            let mut guard = system.registry().lock_interrupts();
            let host = &mut guard.timers_mut(cpu).host;
            host.clock_comparator = u64::MAX;
            host.clock_comparator_pending = false;
            interrupts.fetch_add(1, Ordering::Relaxed);
        }
    }

    wake.unregister(cpu);
    debug!(cpu, "processor thread finished");
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct ProcessorArgs {
    tx_per_slice: u64,
    comparator_us: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref());

    let wake = Arc::new(ParkWake::new(args.cpus));
    let system = TimerSystem::builder(args.timer_config())
        .cpus(args.cpus)
        .wake_signal(wake.clone())
        .build()
        .context("invalid timer configuration")?;

    {
        let mut guard = system.registry().lock_interrupts();
        for cpu in 0..args.cpus {
            guard.set_online(cpu, true);
            guard.set_state(cpu, CpuState::Started);
        }
    }

    let threads = system.start()?;
    info!(
        cpus = args.cpus,
        interval_us = args.timer_interval_us,
        adaptive = args.adaptive,
        "timer core started"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let interrupt_counts: Vec<_> = (0..args.cpus)
        .map(|_| Arc::new(AtomicU64::new(0)))
        .collect();
    let processor_args = ProcessorArgs {
        tx_per_slice: args.tx_per_slice,
        comparator_us: args.comparator_us,
    };

    let mut processors = Vec::with_capacity(args.cpus);
    for (cpu, interrupts) in interrupt_counts.iter().enumerate() {
        let system = system.clone();
        let wake = Arc::clone(&wake);
        let stop = Arc::clone(&stop);
        let interrupts = Arc::clone(interrupts);
        let handle = thread::Builder::new()
            .name(format!("zemu-cpu{cpu}"))
            .spawn(move || run_processor(cpu, system, wake, stop, interrupts, &processor_args))
            .with_context(|| format!("failed to spawn processor thread {cpu}"))?;
        processors.push(handle);
    }

    let started = Instant::now();
    thread::sleep(Duration::from_millis(args.duration_ms));
    stop.store(true, Ordering::Release);
    for (cpu, handle) in processors.into_iter().enumerate() {
        handle
            .join()
            .map_err(|_| anyhow!("processor thread {cpu} panicked"))??;
    }
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "workload finished");

    let report = Report {
        tod: system.tod().current(),
        base_interval_us: system.base_interval_us(),
        effective_interval_us: system.effective_interval_us(),
        cpus: interrupt_counts
            .iter()
            .enumerate()
            .map(|(cpu, interrupts)| {
                let stats = system.registry().lock_stats(cpu);
                CpuReport {
                    cpu,
                    rates: stats.rates(),
                    instruction_total: stats.instruction_total,
                    wait_time_accumulated: stats.wait_time_accumulated,
                    timer_interrupts: interrupts.load(Ordering::Relaxed),
                }
            })
            .collect(),
        system: system.stats().snapshot(),
    };
    threads.shutdown();

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &report)?;
    writeln!(stdout)?;
    Ok(())
}
