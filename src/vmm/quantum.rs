//! Per-vCPU instruction budget and the guest-visible operations that consume it.
//!
//! Translated code embeds calls to these operations at instruction boundaries. They are only
//! valid inside the quantum of the CPU they name, so the engine reaches them through the
//! [`QuantumContext`] it is handed for the dispatched CPU.

use super::vcpu::VirtualCpu;

/// Budget ledger of one virtual CPU.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuantumBudget {
    budget: i64,
    required: u32,
    depleted: bool,
    target_cycle_on_instruction: u64,
}

impl QuantumBudget {
    pub fn remaining(&self) -> i64 { self.budget }
    pub fn required(&self) -> u32 { self.required }
    /// Sticky: stays set until a collaborator calls `reset_budget`.
    pub fn is_depleted(&self) -> bool { self.depleted }
    pub fn target_cycle_on_instruction(&self) -> u64 { self.target_cycle_on_instruction }

    fn deduct(&mut self) {
        self.budget -= i64::from(self.required);
    }

    fn check_and_deduct(&mut self, ipc: u64) -> bool {
        // a zero-throughput core never runs out
        if ipc == 0 {
            return false;
        }

        self.target_cycle_on_instruction += u64::from(self.required);
        self.deduct();

        if self.budget <= 0 {
            self.depleted = true;
            return true;
        }
        false
    }

    fn deplete(&mut self) {
        self.budget = 0;
        self.depleted = true;
    }

    fn reset(&mut self, budget: i64) {
        self.budget = budget;
        self.depleted = false;
    }
}

/// Execution context of the CPU currently inside a quantum.
///
/// Every operation names the CPU it was emitted for; naming any other CPU, or calling while
/// accounting is disabled, means the engine and the scheduler disagree about who is running.
/// That is not recoverable, so these operations panic.
pub struct QuantumContext<'a> {
    cpu: &'a mut VirtualCpu,
    accounting: bool,
}

impl<'a> QuantumContext<'a> {
    pub fn new(cpu: &'a mut VirtualCpu, accounting: bool) -> Self {
        Self { cpu, accounting }
    }

    pub fn index(&self) -> usize { self.cpu.index() }
    pub fn cpu(&self) -> &VirtualCpu { &*self.cpu }
    pub fn budget(&self) -> &QuantumBudget { &self.cpu.budget }

    /// Polled by the engine at its check points; set by kicks and explicit exit requests.
    pub fn exit_requested(&self) -> bool {
        self.cpu.control().exit_requested()
    }

    #[track_caller]
    fn enter(&mut self, cpu: usize) -> &mut VirtualCpu {
        assert!(self.accounting, "quantum accounting is disabled");
        assert_eq!(
            cpu,
            self.cpu.index(),
            "budget operation for vCPU {} issued while vCPU {} is running",
            cpu,
            self.cpu.index()
        );
        &mut *self.cpu
    }

    #[track_caller]
    pub fn deduct(&mut self, cpu: usize) {
        self.enter(cpu).budget.deduct();
    }

    /// Deducts the requirement and reports whether the budget is now exhausted.
    #[track_caller]
    pub fn check_and_deduct(&mut self, cpu: usize) -> bool {
        let vcpu = self.enter(cpu);
        let ipc = vcpu.ipc();
        vcpu.budget.check_and_deduct(ipc)
    }

    #[track_caller]
    pub fn deplete(&mut self, cpu: usize) {
        self.enter(cpu).budget.deplete();
    }

    #[track_caller]
    pub fn set_requirement(&mut self, cpu: usize, required: u32) {
        self.enter(cpu).budget.required = required;
    }

    /// Refill the budget and clear depletion. When this happens is the caller's policy.
    #[track_caller]
    pub fn reset_budget(&mut self, cpu: usize, budget: i64) {
        self.enter(cpu).budget.reset(budget);
    }
}
