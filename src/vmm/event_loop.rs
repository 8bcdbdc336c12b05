//! Kick timer thread.
//!
//! One thread sleeps in epoll on a timerfd and a control eventfd. Every expiry re-arms the
//! timer for one more period and then kicks whichever vCPU is published as current. The
//! scheduling thread arms and disarms the timer through the eventfd.

use super::shared::SchedShared;
use crate::error::Result;
use log::{debug, error};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use vmm_sys_util::epoll::{ControlOperation, Epoll, EpollEvent, EventSet};
use vmm_sys_util::eventfd::{EventFd, EFD_NONBLOCK};
use vmm_sys_util::timerfd::TimerFd;


const TIMER_TOKEN: u64 = 0;
const CTL_TOKEN: u64 = 1;

const DISARMED: u8 = 0;
const ARMED: u8 = 1;
const SHUTDOWN: u8 = 2;


struct KickCtl {
    event: EventFd,
    state: AtomicU8,
}


impl KickCtl {
    fn set(&self, state: u8) -> bool {
        if self.state.swap(state, Ordering::AcqRel) == state {
            return false;
        }
        if let Err(e) = self.event.write(1) {
            error!("kick timer: control write failed: {}", e);
        }
        true
    }
}


pub struct KickTimer {
    ctl: Arc<KickCtl>,
    thread: Option<JoinHandle<()>>,
}


impl KickTimer {
    pub(crate) fn spawn(period: Duration, shared: Arc<SchedShared>) -> Result<Self> {
        let timer = TimerFd::new()?;
        let ctl = Arc::new(KickCtl { event: EventFd::new(EFD_NONBLOCK)?, state: AtomicU8::new(DISARMED) });

        let epoll = Epoll::new()?;
        epoll.ctl(ControlOperation::Add, timer.as_raw_fd(), EpollEvent::new(EventSet::IN, TIMER_TOKEN))?;
        epoll.ctl(ControlOperation::Add, ctl.event.as_raw_fd(), EpollEvent::new(EventSet::IN, CTL_TOKEN))?;

        let thread_ctl = Arc::clone(&ctl);
        let thread = std::thread::Builder::new()
            .name("vcpu-kick".to_string())
            .spawn(move || kick_loop(epoll, timer, period, &thread_ctl, &shared))?;

        Ok(Self { ctl, thread: Some(thread) })
    }

    /// Arm the timer unless it is already pending.
    pub fn start(&self) {
        if self.ctl.set(ARMED) {
            debug!("kick timer armed");
        }
    }

    pub fn stop(&self) {
        if self.ctl.set(DISARMED) {
            debug!("kick timer disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.ctl.state.load(Ordering::Acquire) == ARMED
    }
}


impl Drop for KickTimer {
    fn drop(&mut self) {
        self.ctl.set(SHUTDOWN);
        if let Some(t) = self.thread.take() {
            reap(t);
        }
    }
}

/// Join the kick thread. Returns false if it panicked.
fn reap(thread: JoinHandle<()>) -> bool {
    match thread.join() {
        Ok(()) => true,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("kick timer thread panicked: {}", msg);
            false
        }
    }
}


fn kick_loop(epoll: Epoll, mut timer: TimerFd, period: Duration, ctl: &KickCtl, shared: &SchedShared) {
    let mut events = [EpollEvent::default(); 2];
    loop {
        let n = match epoll.wait(-1, &mut events) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("kick timer: epoll wait failed: {}", e);
                return;
            }
        };

        let mut fired = false;
        let mut ctl_changed = false;
        for ev in &events[..n] {
            match ev.data() {
                TIMER_TOKEN => fired = true,
                CTL_TOKEN => ctl_changed = true,
                _ => {}
            }
        }

        // Drain the expiry before any control change can disarm the timer, otherwise the
        // read would block on a cleared timerfd.
        if fired {
            if let Err(e) = timer.wait() {
                error!("kick timer: read failed: {}", e);
                return;
            }
            if ctl.state.load(Ordering::Acquire) == ARMED {
                if let Err(e) = timer.reset(period, None) {
                    error!("kick timer: re-arm failed: {}", e);
                    return;
                }
                shared.kick_current();
            }
        }

        if ctl_changed {
            let _ = ctl.event.read();
            let armed = match timer.is_armed() {
                Ok(armed) => armed,
                Err(e) => {
                    error!("kick timer: state query failed: {}", e);
                    return;
                }
            };
            let res = match ctl.state.load(Ordering::Acquire) {
                SHUTDOWN => return,
                ARMED if !armed => timer.reset(period, None),
                DISARMED if armed => timer.clear(),
                _ => Ok(()),
            };
            if let Err(e) = res {
                error!("kick timer: control failed: {}", e);
                return;
            }
        }
    }
}
