//! Safety and validation
//!
//! Two layers: static configuration validation (run once per ingest) and
//! the runtime emergence monitor (observational A/G/I scoring). Neither
//! mutates allocations.

pub mod emergence;
pub mod validation;

pub use emergence::{
    BehaviorHistory, EmergenceAdvisory, EmergenceMonitor, EmergenceScores, Intervention,
    RiskLevel,
};
pub use validation::{has_errors, validate, Issue, Severity};
