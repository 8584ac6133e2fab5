//! Sequential joint arbitrator
//!
//! Runs the single-resource water-filling solver once per group
//! resource, treating each contention independently. Each agent's weight
//! on a resource is its priority weight scaled by its preference weight
//! for that resource, so the per-resource solves still reflect what
//! agents care about — but no cross-resource trade is ever discovered.
//! That is the gradient and interior-point solvers' job; this one is the
//! fast baseline.

use crate::arbitration::proportional::water_fill;
use crate::arbitration::{Claim, GroupProblem, JointAllocationResult, SolveError, SolverKind};
use crate::contention::grouping::ContentionGroup;
use crate::core::cancel::{Interrupt, SolveLimits};
use crate::models::agent::Agent;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

/// Preference weights are floored here so an agent that requested a
/// resource but weighted it zero still water-fills at its minimum.
const PREF_FLOOR: f64 = 1e-6;

/// How per-resource weights are formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightMode {
    /// Priority weight only (`base_weight + burn`): the plain
    /// proportional-fairness mechanism applied resource by resource.
    Priority,

    /// Priority weight scaled by the agent's preference weight for the
    /// resource: the sequential-joint mechanism.
    PreferenceScaled,
}

/// Solve a group one resource at a time.
///
/// The reported objective is the sum of the per-resource log objectives.
/// For comparison against joint solvers, re-evaluate both results with
/// [`crate::arbitration::log_welfare`].
pub fn arbitrate(
    group: &ContentionGroup,
    agents: &[Agent],
    burns_mc: &BTreeMap<String, i64>,
    base_weight: f64,
    mode: WeightMode,
    limits: &SolveLimits,
) -> Result<JointAllocationResult, SolveError> {
    let started = Instant::now();
    let problem = GroupProblem::build(group, agents, burns_mc, base_weight)?;

    let mut allocations: BTreeMap<String, BTreeMap<_, u64>> = problem
        .members
        .iter()
        .map(|a| (a.id().to_string(), BTreeMap::new()))
        .collect();
    let mut objective = 0.0;
    let mut timed_out = false;

    for (j, resource) in problem.resources.iter().enumerate() {
        match limits.interrupted() {
            Some(Interrupt::Cancelled) => return Err(SolveError::Cancelled),
            Some(Interrupt::DeadlineExpired) => {
                // Out of time: the untouched resources fall back to the
                // minimums, which build() proved feasible.
                timed_out = true;
                for agent in &problem.members {
                    let min = agent.request(*resource).min;
                    if min > 0 || agent.request(*resource).ideal > 0 {
                        allocations
                            .get_mut(agent.id())
                            .expect("allocations covers members")
                            .insert(*resource, min);
                    }
                }
                continue;
            }
            None => {}
        }

        let claims: Vec<Claim> = problem
            .members
            .iter()
            .enumerate()
            .filter(|(_, a)| a.request(*resource).ideal > 0)
            .map(|(i, a)| {
                let request = a.request(*resource);
                let weight = match mode {
                    WeightMode::Priority => problem.weights[i],
                    WeightMode::PreferenceScaled => {
                        problem.weights[i] * a.weight(*resource).max(PREF_FLOOR)
                    }
                };
                Claim {
                    id: a.id().to_string(),
                    min: request.min,
                    ideal: request.ideal,
                    weight,
                }
            })
            .collect();
        if claims.is_empty() {
            continue;
        }

        let (per_resource, resource_objective) =
            water_fill(*resource, problem.share[j] as u64, &claims)?;
        debug!(
            resource = %resource,
            objective = resource_objective,
            "sequential pass solved"
        );
        objective += resource_objective;
        for (id, units) in per_resource {
            allocations
                .get_mut(&id)
                .expect("allocations covers members")
                .insert(*resource, units);
        }
    }

    Ok(JointAllocationResult {
        allocations,
        burns_mc: problem.member_burns(burns_mc),
        objective,
        feasible: true,
        solver: match mode {
            WeightMode::Priority => SolverKind::WaterFilling,
            WeightMode::PreferenceScaled => SolverKind::Sequential,
        },
        converged: true,
        timed_out,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}
