//! Single-threaded round-robin scheduling of emulated vCPUs.
//!
//! All vCPUs share one scheduling thread. Each round every runnable vCPU gets one quantum,
//! sized from the global instruction budget and scaled by the core's IPC weight. A kick timer
//! truncates quanta that run too long, and a cycle accumulator fires periodic checkpoints.

pub mod vmm;
pub mod types;
pub mod error;
pub mod config;


pub use crate::config::SchedConfig;
pub use crate::error::{Result, SchedError};
pub use crate::types::{ExitReason, RunStats};
pub use crate::vmm::ipc::IpcTable;
pub use crate::vmm::quantum::{QuantumBudget, QuantumContext};
pub use crate::vmm::run::{ExecutionEngine, Scheduler};
pub use crate::vmm::vcpu::{VcpuControl, VirtualCpu};
pub use crate::vmm::SchedulerHandle;
