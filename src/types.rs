use serde::{Deserialize, Serialize};


/// Why the execution engine handed control back to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// The quantum ran out (or the CPU halted); rotate to the next CPU.
    Normal,
    /// A breakpoint or watchpoint fired.
    DebugTrap,
    /// The next instruction needs exclusive, single-CPU execution.
    AtomicRequired,
    /// An exit request (usually a kick) truncated the quantum.
    ExitRequested,
}


/// Counters collected by one `run_epoch` call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub rounds: u64,
    pub dispatches: u64,
    pub kicks: u64,
    pub checkpoints: u64,
    pub cycles: u64,
    pub teardowns: u64,
    pub idle_waits: u64,
}
