//! Core engine: fixture sync, round resolution and the scheduler loop
//! that drives them.

pub mod competition;
pub mod resolution;
pub mod scheduler;
pub mod sync;
