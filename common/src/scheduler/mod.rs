// Scheduler module: fires monitor runs on a cadence or on manual dispatch

pub mod engine;

pub use engine::{DispatchHandle, Scheduler, SchedulerEngine};
