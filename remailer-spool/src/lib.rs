//! Spool scanning and cross-process work tracking.
//!
//! The spool is a directory of `df<id>` (body) and `qf<id>` (control) file
//! pairs. [`Scanner`] lists the pairs and hands them out one at a time, and
//! [`Tracker`] records each pair's lifecycle in a shared key/value store so
//! that no two workers, in this process or another, deliver the same file.

pub mod error;
pub mod scanner;
pub mod tracker;
pub mod unit;

pub use error::{Result, SkipReason, SpoolError, TrackerError, ValidationError};
pub use scanner::Scanner;
pub use tracker::{MemoryStore, RedisStore, TRACKER_TTL, Tracker, TrackerStore};
pub use unit::{FileUnit, SpoolPair};
