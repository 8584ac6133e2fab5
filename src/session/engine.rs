//! Session engine
//!
//! Drives one arbitration round end to end:
//!
//! ```text
//! For each round:
//! 1. Flush the embargo queue (deterministic batch order)
//! 2. Detect contentions (emit ContentionDetected, update histograms)
//! 3. Form resource-conserving groups under the grouping policy
//! 4. Solve each group with the requested mechanism
//!    (convex falls back to gradient when refused)
//! 5. Commit each result atomically (emit AllocationEnforced)
//! 6. Emit ArbitrationComplete per group and SimulationTick
//! ```
//!
//! Within a session everything is single-threaded and cooperative:
//! solvers only read, the transaction manager is the only writer, and
//! the `&mut self` receiver serializes commits. Sessions over disjoint
//! pools may run in parallel.

use crate::arbitration::sequential::WeightMode;
use crate::arbitration::{
    convex, gradient, sequential, JointAllocationResult, SolveError,
};
use crate::commit::TransactionManager;
use crate::contention::detector::detect_contentions;
use crate::contention::grouping::{form_groups, ContentionGroup, GroupingPolicy};
use crate::core::cancel::SolveLimits;
use crate::core::config::ArbitrationConfig;
use crate::economy::{EconomyError, PriorityEconomy};
use crate::embargo::EmbargoQueue;
use crate::metrics::{MetricsRegistry, RoundMetrics};
use crate::models::agent::Agent;
use crate::models::event::{Event, EventClock, EventLog, EventSink};
use crate::models::request::{ArbitrationRequest, Mechanism};
use crate::models::resource::{PoolError, ResourcePool, ResourceType};
use crate::safety::emergence::{BehaviorHistory, EmergenceAdvisory, EmergenceMonitor};
use crate::safety::validation::{self, Issue};
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Top-level error surface. Every session call returns a tagged result;
/// nothing is thrown across the boundary.
#[derive(Debug, Error)]
pub enum ArbitrationError {
    #[error("validation failed with {} issue(s)", .0.len())]
    ValidationFailed(Vec<Issue>),

    #[error("infeasible: {0}")]
    Infeasible(String),

    #[error("solver failed: {0}")]
    SolverFailed(String),

    #[error("timed out; best objective {best_objective}")]
    TimedOut { best_objective: f64 },

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PoolError> for ArbitrationError {
    fn from(err: PoolError) -> Self {
        ArbitrationError::Infeasible(err.to_string())
    }
}

impl From<EconomyError> for ArbitrationError {
    fn from(err: EconomyError) -> Self {
        ArbitrationError::Infeasible(err.to_string())
    }
}

fn from_solve(err: SolveError) -> ArbitrationError {
    match err {
        SolveError::Cancelled => ArbitrationError::Cancelled,
        SolveError::InfeasibleMinimums { .. } => ArbitrationError::Infeasible(err.to_string()),
        other => ArbitrationError::SolverFailed(other.to_string()),
    }
}

fn mechanism_name(mechanism: Mechanism) -> &'static str {
    match mechanism {
        Mechanism::ProportionalFairness => "proportional_fairness",
        Mechanism::SequentialJoint => "sequential_joint",
        Mechanism::GradientJoint => "gradient_joint",
        Mechanism::ConvexJoint => "convex_joint",
    }
}

/// One arbitration session over a pool and a set of agents.
///
/// # Example
/// ```
/// use arbitration_core::{
///     Agent, ArbitrationConfig, ArbitrationRequest, ArbitrationSession, Mechanism,
///     ResourcePool, ResourceRequest, ResourceType, SolveLimits,
/// };
/// use std::collections::BTreeMap;
///
/// let pool = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 100)]));
/// let agents = vec![
///     Agent::new(
///         "a1".to_string(),
///         "A1".to_string(),
///         BTreeMap::from([(ResourceType::Compute, 1.0)]),
///         BTreeMap::from([(ResourceType::Compute, ResourceRequest::new(40, 80))]),
///         0,
///     ),
///     Agent::new(
///         "a2".to_string(),
///         "A2".to_string(),
///         BTreeMap::from([(ResourceType::Compute, 1.0)]),
///         BTreeMap::from([(ResourceType::Compute, ResourceRequest::new(30, 70))]),
///         0,
///     ),
/// ];
///
/// let mut session =
///     ArbitrationSession::new(ArbitrationConfig::default(), pool, agents).unwrap();
/// let results = session
///     .arbitrate(
///         &ArbitrationRequest::new(Mechanism::ProportionalFairness),
///         &SolveLimits::unlimited(),
///     )
///     .unwrap();
/// assert_eq!(results.len(), 1);
/// let total: u64 = session.pool().reserved(ResourceType::Compute);
/// assert!(total <= 100);
/// ```
pub struct ArbitrationSession {
    config: ArbitrationConfig,
    pool: ResourcePool,
    agents: BTreeMap<String, Agent>,
    economy: PriorityEconomy,
    manager: TransactionManager,
    embargo: EmbargoQueue,
    monitor: EmergenceMonitor,
    events: EventLog,
    sink: Option<Box<dyn EventSink>>,
    metrics: MetricsRegistry,
    clock: EventClock,
    round: u64,
}

impl std::fmt::Debug for ArbitrationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrationSession")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("agents", &self.agents)
            .field("economy", &self.economy)
            .field("manager", &self.manager)
            .field("embargo", &self.embargo)
            .field("monitor", &self.monitor)
            .field("events", &self.events)
            .field("sink", &self.sink.is_some())
            .field("metrics", &self.metrics)
            .field("clock", &self.clock)
            .field("round", &self.round)
            .finish()
    }
}

impl ArbitrationSession {
    /// Create a session, validating the configuration first. Any
    /// error-severity issue rejects the whole setup with no state kept.
    pub fn new(
        config: ArbitrationConfig,
        pool: ResourcePool,
        agents: Vec<Agent>,
    ) -> Result<Self, ArbitrationError> {
        let issues = validation::validate(&agents, &pool, &config);
        if validation::has_errors(&issues) {
            return Err(ArbitrationError::ValidationFailed(issues));
        }

        let economy = PriorityEconomy::new(&config);
        let embargo = EmbargoQueue::new(config.embargo_window_ms);
        let monitor = EmergenceMonitor::new(config.emergence);
        let agents_map = agents
            .into_iter()
            .map(|a| (a.id().to_string(), a))
            .collect();

        Ok(Self {
            config,
            pool,
            agents: agents_map,
            economy,
            manager: TransactionManager::new(),
            embargo,
            monitor,
            events: EventLog::new(),
            sink: None,
            metrics: MetricsRegistry::new(),
            clock: EventClock::new(),
            round: 0,
        })
    }

    /// Attach a streaming event sink (builder pattern).
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &ArbitrationConfig {
        &self.config
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn agents(&self) -> &BTreeMap<String, Agent> {
        &self.agents
    }

    pub fn economy(&self) -> &PriorityEconomy {
        &self.economy
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    fn emit(&mut self, event: Event) {
        if let Some(sink) = &mut self.sink {
            sink.emit(&event);
        }
        self.events.log(event);
    }

    /// Submit a resource request into the embargo queue. Returns the
    /// request id (generated when the host passes `None`).
    pub fn submit_request(
        &mut self,
        request_id: Option<String>,
        agent_id: &str,
        burn_mc: i64,
    ) -> Result<String, ArbitrationError> {
        if !self.agents.contains_key(agent_id) {
            return Err(ArbitrationError::Internal(format!(
                "unknown agent '{}'",
                agent_id
            )));
        }
        let id = request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = self.clock.now_ms();
        self.embargo
            .submit(id.clone(), agent_id.to_string(), burn_mc, now);
        self.emit(Event::ResourceRequest {
            timestamp_ms: now,
            request_id: id.clone(),
            agent_id: agent_id.to_string(),
            burn_mc,
        });
        Ok(id)
    }

    /// Flush the embargo queue and arbitrate the flushed batch.
    ///
    /// Returns an empty result set when the window has not elapsed yet
    /// (or nothing is queued) — the caller simply tries again later.
    pub fn run_round(
        &mut self,
        policy: &GroupingPolicy,
        mechanism: Mechanism,
        limits: &SolveLimits,
    ) -> Result<Vec<JointAllocationResult>, ArbitrationError> {
        let now = self.clock.now_ms();
        let batch = self.embargo.flush(now);
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut burns: BTreeMap<String, i64> = BTreeMap::new();
        let mut agent_ids: Vec<String> = Vec::new();
        for entry in &batch {
            if !agent_ids.contains(&entry.agent_id) {
                agent_ids.push(entry.agent_id.clone());
            }
            *burns.entry(entry.agent_id.clone()).or_insert(0) += entry.burn_mc.max(0);
        }

        let request = ArbitrationRequest {
            id: uuid::Uuid::new_v4().to_string(),
            agent_ids,
            burns_mc: burns,
            policy: policy.clone(),
            mechanism,
        };
        self.arbitrate(&request, limits)
    }

    /// Run a full arbitration round for a request.
    ///
    /// Per-group failures (infeasible minimums, commit rejections) are
    /// reported through `ArbitrationComplete` events and skipped; the
    /// round errors only when cancelled or when every group failed.
    pub fn arbitrate(
        &mut self,
        request: &ArbitrationRequest,
        limits: &SolveLimits,
    ) -> Result<Vec<JointAllocationResult>, ArbitrationError> {
        let started = Instant::now();

        // Read-only snapshot of the participants for the solvers.
        let participants: Vec<Agent> = if request.agent_ids.is_empty() {
            self.agents.values().cloned().collect()
        } else {
            let mut missing = Vec::new();
            let selected: Vec<Agent> = request
                .agent_ids
                .iter()
                .filter_map(|id| match self.agents.get(id) {
                    Some(agent) => Some(agent.clone()),
                    None => {
                        missing.push(id.clone());
                        None
                    }
                })
                .collect();
            if !missing.is_empty() {
                return Err(ArbitrationError::Internal(format!(
                    "unknown agents in request: {}",
                    missing.join(", ")
                )));
            }
            selected
        };

        let contentions = detect_contentions(&participants, &self.pool);
        for contention in &contentions {
            let capacity = self.pool.capacity(contention.resource);
            if capacity > 0 {
                self.metrics.record_contention_ratio(
                    contention.resource,
                    contention.total_demand as f64 / capacity as f64,
                );
            }
            let timestamp_ms = self.clock.now_ms();
            self.emit(Event::ContentionDetected {
                timestamp_ms,
                resource: contention.resource,
                competitors: contention.competitors.clone(),
                available: contention.available,
                total_demand: contention.total_demand,
            });
        }

        let groups = form_groups(
            &participants,
            &self.pool,
            &request.policy,
            self.config.cluster_seed,
        );
        info!(
            round = self.round,
            contentions = contentions.len(),
            groups = groups.len(),
            mechanism = mechanism_name(request.mechanism),
            "arbitration round started"
        );

        let mut results = Vec::new();
        let mut round_metrics = RoundMetrics {
            round: self.round,
            contentions: contentions.len(),
            groups_formed: groups.len(),
            ..RoundMetrics::default()
        };
        let mut first_failure: Option<ArbitrationError> = None;

        for group in &groups {
            let solved = self.solve_group(group, &participants, request, limits);
            match solved {
                Ok(result) => {
                    match self
                        .manager
                        .commit(&mut self.pool, &mut self.agents, &mut self.economy, &result)
                    {
                        Ok(receipt) => {
                            let timestamp_ms = self.clock.now_ms();
                            self.emit(Event::AllocationEnforced {
                                timestamp_ms,
                                agent_ids: group.agent_ids.clone(),
                                total_units: receipt.total_units(),
                                total_burned_mc: receipt.total_burned_mc(),
                            });
                            for (resource, units) in receipt.total_units() {
                                *round_metrics.committed_units.entry(resource).or_insert(0) +=
                                    units;
                            }
                            round_metrics.burned_mc += receipt.total_burned_mc();
                            *round_metrics
                                .solver_outcomes
                                .entry(result.solver.as_str().to_string())
                                .or_insert(0) += 1;
                            self.emit_complete(request.mechanism, group, &result, None);
                            results.push(result);
                        }
                        Err(commit_err) => {
                            warn!(%commit_err, "commit rejected");
                            let failure = if result.timed_out {
                                ArbitrationError::TimedOut {
                                    best_objective: result.objective,
                                }
                            } else {
                                ArbitrationError::Infeasible(format!(
                                    "commit rejected: {}",
                                    commit_err
                                ))
                            };
                            self.emit_complete(
                                request.mechanism,
                                group,
                                &result,
                                Some(failure.to_string()),
                            );
                            first_failure.get_or_insert(failure);
                        }
                    }
                }
                Err(SolveError::Cancelled) => return Err(ArbitrationError::Cancelled),
                Err(err) => {
                    warn!(%err, "group solve failed");
                    let failure = from_solve(err);
                    let timestamp_ms = self.clock.now_ms();
                    self.emit(Event::ArbitrationComplete {
                        timestamp_ms,
                        mechanism: mechanism_name(request.mechanism).to_string(),
                        solver: "none".to_string(),
                        agent_ids: group.agent_ids.clone(),
                        allocations: BTreeMap::new(),
                        burns_mc: BTreeMap::new(),
                        objective: 0.0,
                        elapsed_ms: 0,
                        success: false,
                        failure: Some(failure.to_string()),
                    });
                    first_failure.get_or_insert(failure);
                }
            }
        }

        round_metrics.elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_round(round_metrics);
        let timestamp_ms = self.clock.now_ms();
        let round = self.round;
        self.emit(Event::SimulationTick {
            timestamp_ms,
            round,
        });
        self.round += 1;

        if results.is_empty() {
            if let Some(failure) = first_failure {
                return Err(failure);
            }
        }
        Ok(results)
    }

    fn solve_group(
        &self,
        group: &ContentionGroup,
        participants: &[Agent],
        request: &ArbitrationRequest,
        limits: &SolveLimits,
    ) -> Result<JointAllocationResult, SolveError> {
        let base_weight = self.config.base_weight;
        match request.mechanism {
            Mechanism::ProportionalFairness => sequential::arbitrate(
                group,
                participants,
                &request.burns_mc,
                base_weight,
                WeightMode::Priority,
                limits,
            ),
            Mechanism::SequentialJoint => sequential::arbitrate(
                group,
                participants,
                &request.burns_mc,
                base_weight,
                WeightMode::PreferenceScaled,
                limits,
            ),
            Mechanism::GradientJoint => gradient::arbitrate(
                group,
                participants,
                &request.burns_mc,
                base_weight,
                self.config.gradient_tol,
                self.config.max_iterations,
                limits,
            ),
            Mechanism::ConvexJoint => {
                match convex::arbitrate(
                    group,
                    participants,
                    &request.burns_mc,
                    base_weight,
                    self.config.ipm_tol,
                    limits,
                ) {
                    Ok(result) => Ok(result),
                    Err(err @ SolveError::Cancelled)
                    | Err(err @ SolveError::InfeasibleMinimums { .. }) => Err(err),
                    Err(fallback_reason) => {
                        // Interior point refused or broke down; the
                        // first-order solver handles everything.
                        warn!(%fallback_reason, "falling back to gradient solver");
                        gradient::arbitrate(
                            group,
                            participants,
                            &request.burns_mc,
                            base_weight,
                            self.config.gradient_tol,
                            self.config.max_iterations,
                            limits,
                        )
                    }
                }
            }
        }
    }

    fn emit_complete(
        &mut self,
        mechanism: Mechanism,
        group: &ContentionGroup,
        result: &JointAllocationResult,
        failure: Option<String>,
    ) {
        let timestamp_ms = self.clock.now_ms();
        self.emit(Event::ArbitrationComplete {
            timestamp_ms,
            mechanism: mechanism_name(mechanism).to_string(),
            solver: result.solver.as_str().to_string(),
            agent_ids: group.agent_ids.clone(),
            allocations: result.allocations.clone(),
            burns_mc: result.burns_mc.clone(),
            objective: result.objective,
            elapsed_ms: result.elapsed_ms,
            success: failure.is_none(),
            failure,
        });
    }

    /// Return held units to the pool, earning currency scaled by
    /// scarcity and remaining grant time.
    pub fn release(
        &mut self,
        agent_id: &str,
        resource: ResourceType,
        quantity: u64,
        time_remaining_fraction: f64,
    ) -> Result<i64, ArbitrationError> {
        let held = self
            .agents
            .get(agent_id)
            .ok_or_else(|| ArbitrationError::Internal(format!("unknown agent '{}'", agent_id)))?
            .allocated(resource);
        if quantity > held {
            return Err(ArbitrationError::Infeasible(format!(
                "agent '{}' holds {} {} but tried to release {}",
                agent_id, held, resource, quantity
            )));
        }

        // Earnings reflect scarcity at the moment of release.
        let earnings =
            self.economy
                .release_earnings(resource, quantity, time_remaining_fraction, &self.pool);
        self.pool.release(resource, quantity)?;
        let agent = self
            .agents
            .get_mut(agent_id)
            .expect("agent presence checked above");
        agent.reduce_allocation(resource, quantity);
        if earnings > 0 {
            self.economy.mint(agent, earnings)?;
        }

        let timestamp_ms = self.clock.now_ms();
        self.emit(Event::ResourceRelease {
            timestamp_ms,
            agent_id: agent_id.to_string(),
            resource,
            quantity,
            earnings_mc: earnings,
        });
        Ok(earnings)
    }

    /// Mint platform-reward currency into an agent's balance.
    pub fn mint_currency(&mut self, agent_id: &str, amount_mc: i64) -> Result<(), ArbitrationError> {
        let agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| ArbitrationError::Internal(format!("unknown agent '{}'", agent_id)))?;
        self.economy.mint(agent, amount_mc)?;
        let timestamp_ms = self.clock.now_ms();
        self.emit(Event::CurrencyMinted {
            timestamp_ms,
            agent_id: agent_id.to_string(),
            amount_mc,
        });
        Ok(())
    }

    /// Burn currency from an agent's balance.
    pub fn burn_currency(&mut self, agent_id: &str, amount_mc: i64) -> Result<(), ArbitrationError> {
        let agent = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| ArbitrationError::Internal(format!("unknown agent '{}'", agent_id)))?;
        self.economy.burn(agent, amount_mc)?;
        let timestamp_ms = self.clock.now_ms();
        self.emit(Event::CurrencyBurned {
            timestamp_ms,
            agent_id: agent_id.to_string(),
            amount_mc,
        });
        Ok(())
    }

    /// Score an agent's observed behavior and emit the advisory. Purely
    /// observational: allocations are never touched.
    pub fn advise_emergence(
        &mut self,
        agent_id: &str,
        history: &BehaviorHistory,
    ) -> EmergenceAdvisory {
        let advisory = self.monitor.advise(agent_id, history);
        let timestamp_ms = self.clock.now_ms();
        self.emit(Event::EmergenceAdvisory {
            timestamp_ms,
            agent_id: agent_id.to_string(),
            risk: advisory.risk.as_str().to_string(),
            intervention: advisory.intervention.as_str().to_string(),
            details: advisory.details(),
        });
        advisory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::ResourceRequest;

    fn agent(id: &str, min: u64, ideal: u64, balance_mc: i64) -> Agent {
        Agent::new(
            id.to_string(),
            id.to_string(),
            BTreeMap::from([(ResourceType::Compute, 1.0)]),
            BTreeMap::from([(ResourceType::Compute, ResourceRequest::new(min, ideal))]),
            balance_mc,
        )
    }

    fn session() -> ArbitrationSession {
        let pool = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 100)]));
        ArbitrationSession::new(
            ArbitrationConfig::default(),
            pool,
            vec![agent("a1", 40, 80, 0), agent("a2", 30, 70, 0)],
        )
        .unwrap()
    }

    #[test]
    fn test_round_commits_within_capacity() {
        let mut s = session();
        let results = s
            .arbitrate(
                &ArbitrationRequest::new(Mechanism::ProportionalFairness),
                &SolveLimits::unlimited(),
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(s.pool().reserved(ResourceType::Compute) <= 100);
        assert!(s.agent("a1").unwrap().allocated(ResourceType::Compute) >= 40);
        assert!(s.agent("a2").unwrap().allocated(ResourceType::Compute) >= 30);
        assert_eq!(s.events().count_of("simulation_tick"), 1);
        assert_eq!(s.events().count_of("allocation_enforced"), 1);
    }

    #[test]
    fn test_validation_rejects_bad_setup() {
        let pool = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 10)]));
        let err = ArbitrationSession::new(
            ArbitrationConfig::default(),
            pool,
            vec![agent("a1", 40, 80, 0)],
        )
        .unwrap_err();
        assert!(matches!(err, ArbitrationError::ValidationFailed(_)));
    }

    #[test]
    fn test_cancelled_round_propagates() {
        let mut s = session();
        let limits = SolveLimits::unlimited();
        limits.cancel.cancel();
        let err = s
            .arbitrate(
                &ArbitrationRequest::new(Mechanism::GradientJoint),
                &limits,
            )
            .unwrap_err();
        assert!(matches!(err, ArbitrationError::Cancelled));
        // Nothing committed.
        assert_eq!(s.pool().reserved(ResourceType::Compute), 0);
    }

    #[test]
    fn test_release_earns_and_frees_capacity() {
        let mut s = session();
        s.arbitrate(
            &ArbitrationRequest::new(Mechanism::ProportionalFairness),
            &SolveLimits::unlimited(),
        )
        .unwrap();
        let held = s.agent("a1").unwrap().allocated(ResourceType::Compute);
        let reserved_before = s.pool().reserved(ResourceType::Compute);
        let earned = s
            .release("a1", ResourceType::Compute, held, 0.5)
            .unwrap();
        assert!(earned > 0);
        assert_eq!(
            s.pool().reserved(ResourceType::Compute),
            reserved_before - held
        );
        assert_eq!(s.agent("a1").unwrap().allocated(ResourceType::Compute), 0);
        assert_eq!(s.events().count_of("resource_release"), 1);
    }
}
