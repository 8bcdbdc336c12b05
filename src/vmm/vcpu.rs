use super::quantum::QuantumBudget;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;


/// Run-state flags of one virtual CPU.
///
/// Shared between the scheduling thread, the kick timer and collaborators (devices, the
/// machine) that halt, wake, stop or unplug the CPU. Budget state is not here; it lives in
/// [`VirtualCpu`], which only the scheduling thread touches.
#[derive(Debug)]
pub struct VcpuControl {
    index: usize,
    stopped: AtomicBool,
    halted: AtomicBool,
    stop: AtomicBool,
    unplug: AtomicBool,
    exit_request: AtomicBool,
}

impl VcpuControl {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            stopped: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            unplug: AtomicBool::new(false),
            exit_request: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> usize { self.index }

    pub fn is_stopped(&self) -> bool { self.stopped.load(Ordering::Acquire) }
    pub fn is_halted(&self) -> bool { self.halted.load(Ordering::Acquire) }
    pub fn stop_requested(&self) -> bool { self.stop.load(Ordering::Acquire) }
    pub fn unplug_requested(&self) -> bool { self.unplug.load(Ordering::Acquire) }
    pub fn exit_requested(&self) -> bool { self.exit_request.load(Ordering::Acquire) }

    /// The CPU may be dispatched this round.
    pub fn can_run(&self) -> bool {
        !self.stop_requested() && !self.is_stopped() && !self.is_halted()
    }

    /// Nothing for the scheduler to do with this CPU until an event arrives.
    pub fn is_idle(&self) -> bool {
        if self.stop_requested() {
            return false;
        }
        self.is_stopped() || self.is_halted()
    }

    pub(crate) fn set_halted(&self, halted: bool) { self.halted.store(halted, Ordering::Release) }
    pub(crate) fn set_stopped(&self, stopped: bool) { self.stopped.store(stopped, Ordering::Release) }
    pub(crate) fn set_stop(&self, stop: bool) { self.stop.store(stop, Ordering::Release) }
    pub(crate) fn set_unplug(&self) { self.unplug.store(true, Ordering::Release) }

    /// Ask the engine to leave the current quantum at its next check point.
    pub(crate) fn raise_exit(&self) {
        self.exit_request.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_exit(&self) {
        self.exit_request.store(false, Ordering::SeqCst);
    }

    /// Turn a pending stop request into the stopped state.
    pub(crate) fn process_pending(&self) {
        if self.stop.swap(false, Ordering::AcqRel) {
            self.stopped.store(true, Ordering::Release);
        }
    }
}


/// Scheduler-owned record for one emulated core.
#[derive(Debug)]
pub struct VirtualCpu {
    control: Arc<VcpuControl>,
    ipc: u64,
    pub(crate) budget: QuantumBudget,
}

impl VirtualCpu {
    pub fn new(control: Arc<VcpuControl>) -> Self {
        Self { control, ipc: 1, budget: QuantumBudget::default() }
    }

    /// Standalone CPU with its own control block, for engines driving a context directly.
    pub fn detached(index: usize) -> Self {
        Self::new(Arc::new(VcpuControl::new(index)))
    }

    pub fn index(&self) -> usize { self.control.index() }
    pub fn control(&self) -> &VcpuControl { &self.control }

    /// Relative throughput used to scale the round budget.
    pub fn ipc(&self) -> u64 { self.ipc }
    pub fn set_ipc(&mut self, ipc: u64) { self.ipc = ipc; }

    pub fn budget(&self) -> &QuantumBudget { &self.budget }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_run_requires_no_stop_stopped_or_halt() {
        let c = VcpuControl::new(0);
        assert!(c.can_run());
        assert!(!c.is_idle());

        c.set_halted(true);
        assert!(!c.can_run());
        assert!(c.is_idle());
        c.set_halted(false);

        c.set_stop(true);
        assert!(!c.can_run());
        // a pending stop is work, not idleness
        assert!(!c.is_idle());

        c.process_pending();
        assert!(!c.stop_requested());
        assert!(c.is_stopped());
        assert!(c.is_idle());
        assert!(!c.can_run());
    }

    #[test]
    fn process_pending_without_stop_is_noop() {
        let c = VcpuControl::new(3);
        c.process_pending();
        assert!(!c.is_stopped());
        assert_eq!(c.index(), 3);
    }
}
