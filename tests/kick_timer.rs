use quantumvm::{ExecutionEngine, ExitReason, IpcTable, QuantumContext, SchedConfig, Scheduler, SchedulerHandle};
use std::time::{Duration, Instant};

const KICK_PERIOD_MS: u64 = 20;

/// CPU 0 never yields on its own; CPU 1 returns immediately.
struct Hog {
    handle: SchedulerHandle,
    hog_runs: Vec<Duration>,
    timed_out: bool,
}

impl ExecutionEngine for Hog {
    fn execute(&mut self, ctx: &mut QuantumContext<'_>, quantum: Option<u64>) -> ExitReason {
        assert_eq!(quantum, None);
        if ctx.index() != 0 {
            return ExitReason::Normal;
        }

        let start = Instant::now();
        while !ctx.exit_requested() {
            if start.elapsed() > Duration::from_secs(5) {
                self.timed_out = true;
                self.handle.shutdown();
                return ExitReason::Normal;
            }
            std::hint::spin_loop();
        }
        self.hog_runs.push(start.elapsed());
        if self.hog_runs.len() == 3 {
            self.handle.shutdown();
        }
        ExitReason::ExitRequested
    }

    fn step_atomic(&mut self, _ctx: &mut QuantumContext<'_>) {}
}

#[test]
fn kick_truncates_unbounded_quantum() {
    let config = SchedConfig { cpus: 2, kick_period_ms: KICK_PERIOD_MS, ..Default::default() };
    let mut sched = Scheduler::new(config).with_ipc_table(IpcTable::uniform(2));
    let mut engine = Hog { handle: sched.handle(), hog_runs: Vec::new(), timed_out: false };

    let stats = sched.run_epoch(&mut engine).unwrap();

    assert!(!engine.timed_out, "CPU 0 was never kicked");
    assert_eq!(engine.hog_runs.len(), 3);
    for run in &engine.hog_runs {
        // generous bound: a loaded CI machine can delay the timer thread
        assert!(*run < Duration::from_millis(KICK_PERIOD_MS * 50), "quantum ran {:?}", run);
    }
    assert!(stats.kicks >= 3);
    // CPU 1 got its turn between the hog's quanta
    assert!(stats.dispatches >= 5);
}

#[test]
fn single_cpu_has_no_kick_timer() {
    struct Once(SchedulerHandle);
    impl ExecutionEngine for Once {
        fn execute(&mut self, _ctx: &mut QuantumContext<'_>, _quantum: Option<u64>) -> ExitReason {
            self.0.shutdown();
            ExitReason::Normal
        }
        fn step_atomic(&mut self, _ctx: &mut QuantumContext<'_>) {}
    }

    let config = SchedConfig { cpus: 1, kick_period_ms: 1, ..Default::default() };
    let mut sched = Scheduler::new(config).with_ipc_table(IpcTable::uniform(1));
    let mut engine = Once(sched.handle());
    let stats = sched.run_epoch(&mut engine).unwrap();

    // the only kick is the one shutdown() issues itself
    assert!(stats.kicks <= 1);
    assert_eq!(stats.dispatches, 1);
}
