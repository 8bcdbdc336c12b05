use log::debug;

pub type CheckpointFn = Box<dyn FnMut(u64) + Send>;

/// Virtual cycles elapsed across rounds, with a periodic checkpoint hook.
pub struct CycleAccumulator {
    period: u64,
    cycle: u64,
    next_check_threshold: u64,
    last_cycle: u64,
    checkpoints: u64,
    callback: Option<CheckpointFn>,
}

impl CycleAccumulator {
    /// `period == 0` disables checkpoints.
    pub fn new(period: u64) -> Self {
        Self { period, cycle: 0, next_check_threshold: period, last_cycle: 0, checkpoints: 0, callback: None }
    }

    pub fn register_callback(&mut self, callback: CheckpointFn) {
        self.callback = Some(callback);
    }

    /// Saturates at `u64::MAX`; an unbounded round budget is credited as is.
    pub fn advance(&mut self, n: u64) {
        self.cycle = self.cycle.saturating_add(n);
        if self.period == 0 || self.cycle < self.next_check_threshold || self.cycle == self.last_cycle {
            return;
        }

        let delta = self.cycle - self.last_cycle;
        debug!("checkpoint at cycle {} (+{})", self.cycle, delta);
        if let Some(cb) = self.callback.as_mut() {
            cb(delta);
        }
        self.checkpoints += 1;
        self.next_check_threshold = self.next_check_threshold.saturating_add(self.period);
        self.last_cycle = self.cycle;
    }

    pub fn cycle(&self) -> u64 { self.cycle }
    pub fn checkpoints(&self) -> u64 { self.checkpoints }
}

impl std::fmt::Debug for CycleAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CycleAccumulator")
            .field("period", &self.period)
            .field("cycle", &self.cycle)
            .field("next_check_threshold", &self.next_check_threshold)
            .field("last_cycle", &self.last_cycle)
            .finish_non_exhaustive()
    }
}
