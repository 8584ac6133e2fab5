//! Domain models
//!
//! Core types shared by every subsystem:
//! - `resource`: resource kinds and the capacity pool
//! - `agent`: competing agents with requests, weights and balances
//! - `request`: inbound request contracts
//! - `event`: event stream, log and sink

pub mod agent;
pub mod event;
pub mod request;
pub mod resource;

pub use agent::Agent;
pub use event::{Event, EventLog};
pub use request::{ArbitrationRequest, Mechanism, ResourceRequest};
pub use resource::{ResourcePool, ResourceType};
