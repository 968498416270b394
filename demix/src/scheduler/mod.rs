//! Job scheduling: coalescing wakeup signal + the claim-and-dispatch loop.

pub mod service;
pub mod wakeup;

pub use service::{Scheduler, SchedulerConfig};
pub use wakeup::WakeupSignal;
