//! LMS: Last Man Standing football pool
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod clock;
pub mod config;
pub mod data;
pub mod engine;
pub mod storage;
pub mod types;
