use super::kick::{self, CurrentCpu};
use super::vcpu::VcpuControl;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;


/// State reachable from threads other than the scheduling thread.
#[derive(Debug)]
pub(crate) struct SchedShared {
    pub(crate) current: CurrentCpu,
    pub(crate) cpus: Vec<Arc<VcpuControl>>,
    halt_lock: Mutex<()>,
    halt_cond: Condvar,
    shutdown: AtomicBool,
    kicks: AtomicU64,
}


impl SchedShared {
    pub(crate) fn new(cpu_count: usize) -> Self {
        Self {
            current: CurrentCpu::default(),
            cpus: (0..cpu_count).map(|i| Arc::new(VcpuControl::new(i))).collect(),
            halt_lock: Mutex::new(()),
            halt_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            kicks: AtomicU64::new(0),
        }
    }

    pub(crate) fn lock_halt(&self) -> MutexGuard<'_, ()> { self.halt_lock.lock() }

    pub(crate) fn wait_halt(&self, guard: &mut MutexGuard<'_, ()>) { self.halt_cond.wait(guard); }

    /// Flag changes are made before the lock is taken, so a waiter that checked its
    /// condition under the lock cannot miss this wakeup.
    pub(crate) fn notify(&self) {
        let _guard = self.halt_lock.lock();
        self.halt_cond.notify_all();
    }

    pub(crate) fn kick_current(&self) {
        let n = kick::kick_current(&self.current, &self.cpus);
        self.kicks.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn kicks(&self) -> u64 { self.kicks.load(Ordering::Relaxed) }

    pub(crate) fn is_shutdown(&self) -> bool { self.shutdown.load(Ordering::Acquire) }
}


/// Cloneable handle for collaborators running on other threads: device models that halt
/// and wake CPUs, the machine that pauses or unplugs them, the host that shuts down.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    shared: Arc<SchedShared>,
}


impl SchedulerHandle {
    pub(crate) fn new(shared: Arc<SchedShared>) -> Self { Self { shared } }

    pub fn cpu_count(&self) -> usize { self.shared.cpus.len() }

    pub fn vcpu(&self, cpu: usize) -> Option<&VcpuControl> {
        self.shared.cpus.get(cpu).map(|c| c.as_ref())
    }

    /// CPU currently inside a quantum, if any.
    pub fn current(&self) -> Option<usize> { self.shared.current.get() }

    pub fn halt(&self, cpu: usize) {
        if let Some(c) = self.vcpu(cpu) {
            c.set_halted(true);
        }
    }

    /// Clear the halt state and wake the scheduler if it is idle.
    pub fn wake(&self, cpu: usize) {
        if let Some(c) = self.vcpu(cpu) {
            c.set_halted(false);
            self.shared.notify();
        }
    }

    /// Stop takes effect once the CPU leaves its current quantum.
    pub fn request_stop(&self, cpu: usize) {
        if let Some(c) = self.vcpu(cpu) {
            c.set_stop(true);
            c.raise_exit();
            self.shared.notify();
        }
    }

    pub fn resume(&self, cpu: usize) {
        if let Some(c) = self.vcpu(cpu) {
            c.set_stop(false);
            c.set_stopped(false);
            self.shared.notify();
        }
    }

    /// Stop every CPU at the end of its current quantum.
    pub fn pause_all(&self) {
        for c in &self.shared.cpus {
            c.set_stop(true);
            c.raise_exit();
        }
        self.shared.notify();
    }

    pub fn resume_all(&self) {
        for c in &self.shared.cpus {
            c.set_stop(false);
            c.set_stopped(false);
        }
        self.shared.notify();
    }

    /// Remove the CPU from future rounds. Teardown waits for any in-flight quantum.
    pub fn unplug(&self, cpu: usize) {
        if let Some(c) = self.vcpu(cpu) {
            c.set_unplug();
            c.set_stop(true);
            c.raise_exit();
            self.shared.notify();
        }
    }

    /// Ends the CPU's current quantum, or its next one if it is not running.
    pub fn request_exit(&self, cpu: usize) {
        if let Some(c) = self.vcpu(cpu) {
            c.raise_exit();
            self.shared.notify();
        }
    }

    pub fn kick_current(&self) { self.shared.kick_current(); }

    pub fn kick_all(&self) {
        for c in &self.shared.cpus {
            c.raise_exit();
        }
    }

    pub fn kicks(&self) -> u64 { self.shared.kicks() }

    /// Make `run_epoch` return after the current quantum.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.kick_current();
        self.shared.notify();
    }

    pub fn is_shutdown(&self) -> bool { self.shared.is_shutdown() }
}
