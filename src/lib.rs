//! Multi-Agent Resource Arbitration Engine
//!
//! Computes allocations of scarce resources to competing agents under
//! weighted proportional fairness, with deterministic execution.
//!
//! # Architecture
//!
//! - **core**: Configuration, cancellation and deadline plumbing
//! - **models**: Domain types (ResourcePool, Agent, events, requests)
//! - **economy**: Priority economy (currency → weights, mint/burn, earnings)
//! - **utility**: Closed-form utility functions with analytic gradients
//! - **contention**: Contention detection, grouping policy, pool partition
//! - **arbitration**: Water-filling, sequential, gradient and interior-point solvers
//! - **commit**: Transactional atomic commit of allocation results
//! - **safety**: Static validation and runtime emergence monitoring
//! - **embargo**: Request batching window
//! - **metrics**: Contention histograms and per-round metrics
//! - **session**: Arbitration session driving the round loop
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. All currency values are i64 (millicredits)
//! 2. Allocations never exceed pool capacity or per-agent bounds
//! 3. State mutations happen only inside the transaction manager
//! 4. Identical inputs yield identical outputs (total tie-break orders)

// Module declarations
pub mod arbitration;
pub mod commit;
pub mod contention;
pub mod core;
pub mod economy;
pub mod embargo;
pub mod metrics;
pub mod models;
pub mod rng;
pub mod safety;
pub mod session;
pub mod utility;

// Re-exports for convenience
pub use crate::core::{
    cancel::{CancellationToken, Deadline, SolveLimits},
    config::{ArbitrationConfig, EmergenceThresholds},
};
pub use arbitration::{
    log_welfare, AllocationResult, JointAllocationResult, SolveError, SolverKind,
};
pub use commit::{CommitError, CommitReceipt, TransactionManager};
pub use contention::{
    detector::Contention,
    grouping::{CompatibilityMatrix, ContentionGroup, GroupingPolicy, SplitStrategy},
};
pub use economy::{EconomyError, PriorityEconomy};
pub use embargo::{EmbargoEntry, EmbargoQueue};
pub use metrics::{ContentionHistogram, MetricsRegistry, RoundMetrics};
pub use models::{
    agent::{Agent, AgentError},
    event::{Event, EventLog, EventSink},
    request::{ArbitrationRequest, Mechanism, ResourceRequest},
    resource::{PoolError, ResourcePool, ResourceType},
};
pub use rng::XorShift64;
pub use safety::{
    emergence::{
        BehaviorHistory, EmergenceAdvisory, EmergenceMonitor, EmergenceScores, Intervention,
        RiskLevel,
    },
    validation::{validate, Issue, Severity},
};
pub use session::{ArbitrationError, ArbitrationSession};
pub use utility::{CesNest, UtilityFunction};
