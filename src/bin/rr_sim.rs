//! Drives the scheduler with a synthetic engine and prints the run statistics as JSON.
//!
//! Usage: rr-sim [config.json] [seconds]

use anyhow::{Context, Result};
use log::info;
use quantumvm::{ExecutionEngine, ExitReason, QuantumContext, SchedConfig, Scheduler};
use std::path::PathBuf;
use std::time::Duration;

/// Instructions a CPU "executes" per quantum when no round budget is in force.
const UNBOUNDED_SLICE: u64 = 10_000;
/// Each synthetic instruction costs this much budget.
const REQUIREMENT: u32 = 1;
/// Budget handed to a CPU whenever it reports depletion.
const REFILL: i64 = 50_000;

struct CountingEngine {
    retired: Vec<u64>,
    refills: u64,
}

impl CountingEngine {
    fn new(cpus: usize) -> Self {
        Self { retired: vec![0; cpus], refills: 0 }
    }
}

impl ExecutionEngine for CountingEngine {
    fn execute(&mut self, ctx: &mut QuantumContext<'_>, quantum: Option<u64>) -> ExitReason {
        let cpu = ctx.index();
        if ctx.budget().required() != REQUIREMENT {
            ctx.set_requirement(cpu, REQUIREMENT);
        }
        for _ in 0..quantum.unwrap_or(UNBOUNDED_SLICE) {
            if ctx.exit_requested() {
                return ExitReason::ExitRequested;
            }
            self.retired[cpu] += 1;
            if ctx.check_and_deduct(cpu) {
                ctx.reset_budget(cpu, REFILL);
                self.refills += 1;
            }
        }
        ExitReason::Normal
    }

    fn step_atomic(&mut self, ctx: &mut QuantumContext<'_>) {
        self.retired[ctx.index()] += 1;
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => SchedConfig::from_json_file(&PathBuf::from(&path))
            .with_context(|| format!("loading {}", path))?,
        None => SchedConfig { cpus: 2, instruction_timing: true, switch_period: 1_000, ..Default::default() },
    };
    let seconds: u64 = match args.next() {
        Some(s) => s.parse().with_context(|| format!("bad duration {:?}", s))?,
        None => 1,
    };

    let mut sched = Scheduler::new(config.clone());
    sched.register_checkpoint_callback(|delta| info!("checkpoint: {} cycles since last", delta));

    let handle = sched.handle();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(seconds));
        handle.shutdown();
    });

    let mut engine = CountingEngine::new(config.cpus);
    let stats = sched.run_epoch(&mut engine).context("scheduler failed")?;

    let report = serde_json::json!({
        "stats": stats,
        "retired": engine.retired,
        "refills": engine.refills,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
