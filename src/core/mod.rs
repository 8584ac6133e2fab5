//! Configuration and solve-control plumbing.

pub mod cancel;
pub mod config;
