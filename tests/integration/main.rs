//! Integration tests: full round lifecycle and the scheduler loop, run
//! against an in-memory store and an in-memory fixture source.

mod fixture_source;
mod scheduler_loop;
mod simulation;
