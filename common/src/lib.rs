// Common library shared by the ticket monitor and scheduler binaries

pub mod bootstrap;
pub mod config;
pub mod detector;
pub mod errors;
pub mod fetch;
pub mod models;
pub mod monitor;
pub mod notifier;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod telemetry;
pub mod webhook;
pub mod workflow;
