pub mod vcpu;
pub mod quantum;
pub mod ipc;
pub mod kick;
pub mod cycles;
pub mod event_loop;
pub mod run;
mod shared;

pub use shared::SchedulerHandle;
