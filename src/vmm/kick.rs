//! Publish/observe protocol for the currently dispatched vCPU.
//!
//! The scheduling thread is the only writer. The kick path never takes a lock: it reads the
//! slot, raises the exit request of whatever it saw, and re-reads until the slot is stable so a
//! swap that raced with the kick cannot leave the new CPU unkicked.

use super::vcpu::VcpuControl;
use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::sync::Arc;

const NO_CPU: usize = usize::MAX;

#[derive(Debug)]
pub struct CurrentCpu {
    slot: AtomicUsize,
}

impl Default for CurrentCpu {
    fn default() -> Self { Self { slot: AtomicUsize::new(NO_CPU) } }
}

impl CurrentCpu {
    /// Must happen before the CPU's run state is evaluated, so a kick issued from then on
    /// reaches it.
    pub fn publish(&self, cpu: usize) {
        self.slot.store(cpu, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    pub fn clear(&self) {
        // a spurious kick of the previous CPU is harmless
        self.slot.store(NO_CPU, Ordering::Release);
    }

    pub fn get(&self) -> Option<usize> {
        match self.slot.load(Ordering::Acquire) {
            NO_CPU => None,
            cpu => Some(cpu),
        }
    }
}

/// Kick the published CPU. Returns the number of exit requests raised.
pub fn kick_current(current: &CurrentCpu, cpus: &[Arc<VcpuControl>]) -> u64 {
    let mut kicks = 0;
    loop {
        let seen = current.get();
        if let Some(control) = seen.and_then(|i| cpus.get(i)) {
            control.raise_exit();
            kicks += 1;
        }
        // finish kicking this CPU before reading again
        fence(Ordering::SeqCst);
        if seen == current.get() {
            return kicks;
        }
    }
}
