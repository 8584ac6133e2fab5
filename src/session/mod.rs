//! Arbitration session
//!
//! The session owns the pool, the registered agents, the priority
//! economy and the embargo queue, and drives the round loop: batch →
//! detect → group → solve → commit → emit.

pub mod engine;

pub use engine::{ArbitrationError, ArbitrationSession};
