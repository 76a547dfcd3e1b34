//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the store.
//!
//! # Tasks
//! - Expiry Sweep: Removes expired entries at a configured interval, bounded per tick

mod sweep;

pub(crate) use sweep::spawn_sweep_task;
