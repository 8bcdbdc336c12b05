//! Round-robin driver: every vCPU shares one scheduling thread and gets one quantum per
//! round, in ascending index order.

use super::cycles::CycleAccumulator;
use super::event_loop::KickTimer;
use super::ipc::IpcTable;
use super::quantum::QuantumContext;
use super::shared::{SchedShared, SchedulerHandle};
use super::vcpu::VirtualCpu;
use crate::config::SchedConfig;
use crate::error::Result;
use crate::types::{ExitReason, RunStats};
use log::info;
use std::sync::Arc;


/// The instruction execution engine the scheduler dispatches quanta to.
pub trait ExecutionEngine {
    /// Run `ctx`'s CPU for at most `quantum` instructions, or until something stops it when
    /// `quantum` is `None`. Must return promptly once `ctx.exit_requested()` is set.
    fn execute(&mut self, ctx: &mut QuantumContext<'_>, quantum: Option<u64>) -> ExitReason;

    /// Instructions that may run before the next virtual-clock deadline.
    fn available_budget(&mut self) -> u64 { u64::MAX }

    /// Called after a `DebugTrap`; rotation resumes with the same CPU next round.
    fn handle_debug(&mut self, _cpu: usize) {}

    /// Execute a single instruction with every other CPU excluded.
    fn step_atomic(&mut self, ctx: &mut QuantumContext<'_>);

    /// Virtual time credited at the end of each full sweep.
    fn advance_virtual_time(&mut self, _instructions: u64) {}

    /// The CPU was unplugged and will never be dispatched again.
    fn teardown(&mut self, _cpu: usize) {}
}


pub struct Scheduler {
    config: SchedConfig,
    cpus: Vec<Option<VirtualCpu>>,
    ipc: Option<IpcTable>,
    cycles: CycleAccumulator,
    shared: Arc<SchedShared>,
    stats: RunStats,
}


impl Scheduler {
    pub fn new(config: SchedConfig) -> Self {
        let shared = Arc::new(SchedShared::new(config.cpus));
        let cpus = shared.cpus.iter().map(|c| Some(VirtualCpu::new(Arc::clone(c)))).collect();
        Self {
            cycles: CycleAccumulator::new(config.checkpoint_period),
            config,
            cpus,
            ipc: None,
            shared,
            stats: RunStats::default(),
        }
    }

    /// Use `table` instead of loading `config.ipc_path` when the run starts.
    pub fn with_ipc_table(mut self, table: IpcTable) -> Self {
        self.apply_weights(&table);
        self.ipc = Some(table);
        self
    }

    fn apply_weights(&mut self, table: &IpcTable) {
        for cpu in self.cpus.iter_mut().flatten() {
            cpu.set_ipc(table.weight(cpu.index()));
        }
    }

    pub fn handle(&self) -> SchedulerHandle { SchedulerHandle::new(Arc::clone(&self.shared)) }

    pub fn register_checkpoint_callback<F>(&mut self, callback: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.cycles.register_callback(Box::new(callback));
    }

    pub fn config(&self) -> &SchedConfig { &self.config }

    /// `None` once the CPU has been torn down.
    pub fn vcpu(&self, cpu: usize) -> Option<&VirtualCpu> {
        self.cpus.get(cpu).and_then(|c| c.as_ref())
    }

    pub fn ipc_table(&self) -> Option<&IpcTable> { self.ipc.as_ref() }

    pub fn stats(&self) -> &RunStats { &self.stats }

    /// Local quantum of `cpu` for a round budget: the budget scaled by the CPU's IPC weight.
    pub fn quantum_for(&self, cpu: usize, round_budget: u64) -> u64 {
        let ipc = self.vcpu(cpu).map_or(1, |c| c.ipc());
        round_budget.saturating_mul(ipc)
    }

    /// Run the scheduling loop until the handle requests shutdown.
    pub fn run_epoch<E: ExecutionEngine>(&mut self, engine: &mut E) -> Result<RunStats> {
        self.wait_for_kickoff();

        let table = match self.ipc.take() {
            Some(table) => table,
            None => IpcTable::load(self.cpus.len(), &self.config.ipc_path),
        };
        self.apply_weights(&table);
        self.ipc = Some(table);

        let kick = if self.cpus.len() > 1 {
            Some(KickTimer::spawn(self.config.kick_period(), Arc::clone(&self.shared))?)
        } else {
            None
        };
        if let Some(k) = &kick {
            k.start();
        }

        let mut cursor = self.first_cpu();
        // process pending work before the first dispatch
        if let Some(first) = cursor {
            self.shared.cpus[first].raise_exit();
        }

        while !self.shared.is_shutdown() {
            let round_budget = self.round_budget(engine);

            if cursor.is_none() {
                let credit = round_budget.unwrap_or(0);
                self.cycles.advance(credit);
                engine.advance_virtual_time(credit);
                self.stats.rounds += 1;
                cursor = self.first_cpu();
            }

            cursor = self.sweep(engine, cursor, round_budget);

            self.shared.current.clear();
            if let Some(cpu) = cursor {
                self.shared.cpus[cpu].clear_exit();
            }

            self.wait_io_event(kick.as_ref());

            if let Some(gone) = self.deal_with_unplugged(engine) {
                if cursor == Some(gone) {
                    cursor = self.next_cpu(gone);
                }
            }
        }

        drop(kick);
        self.stats.kicks = self.shared.kicks();
        self.stats.cycles = self.cycles.cycle();
        self.stats.checkpoints = self.cycles.checkpoints();
        Ok(self.stats.clone())
    }

    fn round_budget<E: ExecutionEngine>(&self, engine: &mut E) -> Option<u64> {
        if !self.config.instruction_timing {
            return None;
        }
        let available = engine.available_budget();
        Some(match self.config.switch_period {
            0 => available,
            period => period.min(available),
        })
    }

    /// Dispatch CPUs from `cursor` onwards. Returns where the next sweep resumes, `None` when
    /// the end of the CPU list was reached.
    fn sweep<E: ExecutionEngine>(
        &mut self,
        engine: &mut E,
        mut cursor: Option<usize>,
        round_budget: Option<u64>,
    ) -> Option<usize> {
        while let Some(idx) = cursor {
            if self.shared.is_shutdown() {
                break;
            }
            let control = Arc::clone(&self.shared.cpus[idx]);
            if control.exit_requested() {
                break;
            }

            self.shared.current.publish(idx);

            if control.can_run() {
                let quantum = round_budget.map(|b| self.quantum_for(idx, b));
                let accounting = self.config.quantum_accounting;
                let Some(cpu) = self.cpus[idx].as_mut() else { break };
                let mut ctx = QuantumContext::new(cpu, accounting);

                self.stats.dispatches += 1;
                match engine.execute(&mut ctx, quantum) {
                    ExitReason::Normal => {}
                    ExitReason::ExitRequested => control.clear_exit(),
                    ExitReason::DebugTrap => {
                        engine.handle_debug(idx);
                        break;
                    }
                    ExitReason::AtomicRequired => {
                        engine.step_atomic(&mut ctx);
                        break;
                    }
                }
            } else if control.stop_requested() {
                if control.unplug_requested() {
                    cursor = self.next_cpu(idx);
                }
                break;
            }

            cursor = self.next_cpu(idx);
        }
        cursor
    }

    fn wait_io_event(&mut self, kick: Option<&KickTimer>) {
        let shared = Arc::clone(&self.shared);
        {
            let mut guard = shared.lock_halt();
            while self.all_idle() && !shared.is_shutdown() {
                if let Some(k) = kick {
                    k.stop();
                }
                self.stats.idle_waits += 1;
                shared.wait_halt(&mut guard);
            }
        }

        if let Some(k) = kick {
            k.start();
        }
        for cpu in self.cpus.iter().flatten() {
            cpu.control().process_pending();
        }
    }

    fn wait_for_kickoff(&self) {
        let Some(first) = self.first_cpu() else { return };
        for cpu in self.cpus.iter().flatten() {
            cpu.control().process_pending();
        }
        let mut guard = self.shared.lock_halt();
        while self.shared.cpus[first].is_stopped() && !self.shared.is_shutdown() {
            self.shared.wait_halt(&mut guard);
        }
    }

    /// Tear down one unplugged CPU that is no longer runnable.
    fn deal_with_unplugged<E: ExecutionEngine>(&mut self, engine: &mut E) -> Option<usize> {
        let idx = self.cpus.iter().flatten().find_map(|cpu| {
            let c = cpu.control();
            (c.unplug_requested() && !c.can_run()).then(|| cpu.index())
        })?;

        self.cpus[idx] = None;
        engine.teardown(idx);
        self.stats.teardowns += 1;
        info!("vCPU {} unplugged", idx);
        Some(idx)
    }

    fn all_idle(&self) -> bool {
        self.cpus.iter().flatten().all(|c| c.control().is_idle())
    }

    fn first_cpu(&self) -> Option<usize> {
        self.cpus.iter().position(Option::is_some)
    }

    fn next_cpu(&self, after: usize) -> Option<usize> {
        (after + 1..self.cpus.len()).find(|&i| self.cpus[i].is_some())
    }
}
