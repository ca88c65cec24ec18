//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the client is up.
//!
//! # Tasks
//! - GC sweep: evicts idle cache entries past their `gc_time`

mod cleanup;

pub use cleanup::spawn_gc_task;
