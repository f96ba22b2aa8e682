//! Background Tasks Module
//!
//! Contains the background task that drives entry expiration.
//!
//! # Tasks
//! - Reaper: removes each cache entry as soon as its TTL elapses

mod reaper;

pub(crate) use reaper::spawn_reaper;
