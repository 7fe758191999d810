//! Profiling plumbing around the reader
//!
//! - Record types the reader observes from the sampling stream
//! - Periodic trigger and the interval scheduler that drives it

pub mod record;
pub mod scheduler;

pub use record::Record;
pub use scheduler::{IntervalHandle, IntervalScheduler, PeriodicScheduler, PeriodicTrigger};
