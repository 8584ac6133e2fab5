//! Arbitration solvers
//!
//! Four solver families over the same contract:
//! - `proportional`: single-resource weighted proportional fairness
//!   (water-filling with a log barrier),
//! - `sequential`: per-resource water-filling with preference-scaled
//!   weights — fast, blind to cross-resource trades,
//! - `gradient`: projected gradient ascent on the joint log-welfare,
//! - `convex`: interior-point solve of the convex reformulation, with
//!   gradient fallback.
//!
//! All solvers are read-only over agents and pool; results are applied
//! separately by the transaction manager.

use crate::economy::credits;
use crate::models::agent::Agent;
use crate::models::resource::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod convex;
pub mod gradient;
pub mod proportional;
pub mod rounding;
pub mod sequential;

/// Floor added inside logarithms so empty allocations stay finite.
pub(crate) const WELFARE_EPS: f64 = 1e-9;

/// Which solver produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    WaterFilling,
    Sequential,
    Gradient,
    InteriorPoint,
}

impl SolverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverKind::WaterFilling => "water_filling",
            SolverKind::Sequential => "sequential",
            SolverKind::Gradient => "gradient",
            SolverKind::InteriorPoint => "interior_point",
        }
    }
}

/// Errors from arbitration solves
#[derive(Debug, Error, PartialEq)]
pub enum SolveError {
    #[error("minimum demands for {resource} total {required}, only {available} available")]
    InfeasibleMinimums {
        resource: ResourceType,
        required: u64,
        available: u64,
    },

    #[error("all {count} competitor weights are zero")]
    DegenerateWeights { count: usize },

    #[error("solver cannot handle this problem: {detail}")]
    Unsupported { detail: String },

    #[error("numerical failure: {detail}")]
    Numerical { detail: String },

    #[error("solver diverged: {detail}")]
    Divergence { detail: String },

    #[error("solve cancelled")]
    Cancelled,
}

/// Allocation of a single contended resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub resource: ResourceType,

    /// Integer units per agent id.
    pub allocations: BTreeMap<String, u64>,

    /// Millicredits burned per agent id for priority.
    pub burns_mc: BTreeMap<String, i64>,

    /// `Σ w_i · ln(x_i)` at the rounded allocation.
    pub objective: f64,
}

/// Joint allocation across all resources of one contention group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointAllocationResult {
    /// Integer units per agent id and resource.
    pub allocations: BTreeMap<String, BTreeMap<ResourceType, u64>>,

    /// Millicredits burned per agent id.
    pub burns_mc: BTreeMap<String, i64>,

    /// Solver objective at the rounded allocation.
    pub objective: f64,

    /// All bounds and capacity constraints hold.
    pub feasible: bool,

    /// Which solver produced this result (records fallbacks).
    pub solver: SolverKind,

    /// The solver reached its tolerance. `false` means the best feasible
    /// iterate found is returned instead.
    pub converged: bool,

    /// The deadline expired and the best feasible iterate was returned.
    pub timed_out: bool,

    /// Wall-clock solve time.
    pub elapsed_ms: u64,
}

/// One competitor's view of a single-resource contention.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Claim {
    pub id: String,
    pub min: u64,
    pub ideal: u64,
    pub weight: f64,
}

/// Joint log-welfare `Σ_i W_i · ln(U_i(x_i) + ε)` of an integer
/// allocation, with `W_i = base_weight + burned credits`.
///
/// This is the criterion every joint solver maximizes; evaluating both a
/// joint and a sequential result through it makes their objectives
/// directly comparable.
pub fn log_welfare(
    agents: &[Agent],
    allocations: &BTreeMap<String, BTreeMap<ResourceType, u64>>,
    burns_mc: &BTreeMap<String, i64>,
    base_weight: f64,
) -> f64 {
    let mut welfare = 0.0;
    for (agent_id, units) in allocations {
        let Some(agent) = agents.iter().find(|a| a.id() == agent_id) else {
            continue;
        };
        let x: BTreeMap<ResourceType, f64> =
            units.iter().map(|(r, q)| (*r, *q as f64)).collect();
        let utility = agent.utility().evaluate(&x);
        let burn = burns_mc.get(agent_id).copied().unwrap_or(0);
        let weight = base_weight + credits(burn.max(0));
        welfare += weight * (utility + WELFARE_EPS).ln();
    }
    welfare
}

/// Flattened joint optimization problem for one contention group: agent
/// × resource variables with box bounds and per-resource capacity.
#[derive(Debug, Clone)]
pub(crate) struct GroupProblem<'a> {
    /// Member agents, sorted by id.
    pub members: Vec<&'a Agent>,

    /// Group resources in canonical order.
    pub resources: Vec<ResourceType>,

    /// Per-resource group share, parallel to `resources`.
    pub share: Vec<f64>,

    /// Priority weight per member.
    pub weights: Vec<f64>,

    /// Box bounds, indexed `member * resources.len() + resource`.
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl<'a> GroupProblem<'a> {
    /// Build the problem, verifying per-resource feasibility of the
    /// minimum demands against the group share.
    pub fn build(
        group: &crate::contention::grouping::ContentionGroup,
        agents: &'a [Agent],
        burns_mc: &BTreeMap<String, i64>,
        base_weight: f64,
    ) -> Result<Self, SolveError> {
        let members: Vec<&Agent> = group
            .agent_ids
            .iter()
            .filter_map(|id| agents.iter().find(|a| a.id() == id))
            .collect();
        let resources: Vec<ResourceType> = group.resources.iter().copied().collect();

        let mut share = Vec::with_capacity(resources.len());
        for resource in &resources {
            let available = group.share.get(resource).copied().unwrap_or(0);
            let required: u64 = members.iter().map(|a| a.request(*resource).min).sum();
            if required > available {
                return Err(SolveError::InfeasibleMinimums {
                    resource: *resource,
                    required,
                    available,
                });
            }
            share.push(available as f64);
        }

        let weights: Vec<f64> = members
            .iter()
            .map(|a| {
                let burn = burns_mc.get(a.id()).copied().unwrap_or(0);
                base_weight + credits(burn.max(0))
            })
            .collect();

        let r = resources.len();
        let mut lower = vec![0.0; members.len() * r];
        let mut upper = vec![0.0; members.len() * r];
        for (i, agent) in members.iter().enumerate() {
            for (j, resource) in resources.iter().enumerate() {
                let request = agent.request(*resource);
                lower[i * r + j] = request.min as f64;
                upper[i * r + j] = request.ideal as f64;
            }
        }

        Ok(Self {
            members,
            resources,
            share,
            weights,
            lower,
            upper,
        })
    }

    pub fn var_count(&self) -> usize {
        self.lower.len()
    }

    pub fn index(&self, member: usize, resource: usize) -> usize {
        member * self.resources.len() + resource
    }

    /// A member's allocation slice as a resource map.
    pub fn member_alloc(&self, x: &[f64], member: usize) -> BTreeMap<ResourceType, f64> {
        self.resources
            .iter()
            .enumerate()
            .map(|(j, r)| (*r, x[self.index(member, j)]))
            .collect()
    }

    /// Joint log-welfare objective at a continuous point.
    pub fn objective(&self, x: &[f64]) -> f64 {
        self.members
            .iter()
            .enumerate()
            .map(|(i, agent)| {
                let utility = agent.utility().evaluate(&self.member_alloc(x, i));
                self.weights[i] * (utility + WELFARE_EPS).ln()
            })
            .sum()
    }

    /// Gradient of the objective.
    pub fn objective_gradient(&self, x: &[f64]) -> Vec<f64> {
        let mut grad = vec![0.0; self.var_count()];
        for (i, agent) in self.members.iter().enumerate() {
            let alloc = self.member_alloc(x, i);
            let utility = agent.utility().evaluate(&alloc);
            let scale = self.weights[i] / (utility + WELFARE_EPS);
            let u_grad = agent.utility().gradient(&alloc);
            for (j, resource) in self.resources.iter().enumerate() {
                if let Some(g) = u_grad.get(resource) {
                    grad[self.index(i, j)] = scale * g;
                }
            }
        }
        grad
    }

    /// Project onto the feasible set: clamp to the box, then scale each
    /// resource's mass above the minimums down to its share.
    pub fn project(&self, x: &mut [f64]) {
        for (v, value) in x.iter_mut().enumerate() {
            *value = value.clamp(self.lower[v], self.upper[v]);
        }
        for (j, &share) in self.share.iter().enumerate() {
            let total: f64 = (0..self.members.len())
                .map(|i| x[self.index(i, j)])
                .sum();
            if total <= share {
                continue;
            }
            let floor: f64 = (0..self.members.len())
                .map(|i| self.lower[self.index(i, j)])
                .sum();
            let free = total - floor;
            let scale = if free > 0.0 {
                ((share - floor) / free).max(0.0)
            } else {
                0.0
            };
            for i in 0..self.members.len() {
                let v = self.index(i, j);
                x[v] = self.lower[v] + (x[v] - self.lower[v]) * scale;
            }
        }
    }

    /// Round a continuous point to integer allocations per agent.
    pub fn round(&self, x: &[f64]) -> BTreeMap<String, BTreeMap<ResourceType, u64>> {
        let mut result: BTreeMap<String, BTreeMap<ResourceType, u64>> = self
            .members
            .iter()
            .map(|a| (a.id().to_string(), BTreeMap::new()))
            .collect();
        for (j, resource) in self.resources.iter().enumerate() {
            let entries: Vec<rounding::RoundEntry> = self
                .members
                .iter()
                .enumerate()
                .map(|(i, agent)| rounding::RoundEntry {
                    id: agent.id().to_string(),
                    value: x[self.index(i, j)],
                    min: self.lower[self.index(i, j)] as u64,
                    ideal: self.upper[self.index(i, j)] as u64,
                })
                .collect();
            let rounded = rounding::round_to_capacity(self.share[j] as u64, &entries);
            for (id, units) in rounded {
                if let Some(per_agent) = result.get_mut(&id) {
                    per_agent.insert(*resource, units);
                }
            }
        }
        result
    }

    /// Burns restricted to this group's members, clamped non-negative.
    pub fn member_burns(&self, burns_mc: &BTreeMap<String, i64>) -> BTreeMap<String, i64> {
        self.members
            .iter()
            .map(|a| {
                (
                    a.id().to_string(),
                    burns_mc.get(a.id()).copied().unwrap_or(0).max(0),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contention::grouping::ContentionGroup;
    use crate::models::request::ResourceRequest;
    use std::collections::BTreeSet;

    fn agent(id: &str, min: u64, ideal: u64) -> Agent {
        Agent::new(
            id.to_string(),
            id.to_string(),
            BTreeMap::from([(ResourceType::Compute, 1.0)]),
            BTreeMap::from([(ResourceType::Compute, ResourceRequest::new(min, ideal))]),
            0,
        )
    }

    fn group(ids: &[&str], share: u64) -> ContentionGroup {
        ContentionGroup {
            agent_ids: ids.iter().map(|s| s.to_string()).collect(),
            resources: BTreeSet::from([ResourceType::Compute]),
            share: BTreeMap::from([(ResourceType::Compute, share)]),
        }
    }

    #[test]
    fn test_build_rejects_infeasible_minimums() {
        let agents = vec![agent("a", 60, 80), agent("b", 50, 90)];
        let err = GroupProblem::build(
            &group(&["a", "b"], 100),
            &agents,
            &BTreeMap::new(),
            10.0,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SolveError::InfeasibleMinimums {
                resource: ResourceType::Compute,
                required: 110,
                available: 100,
            }
        );
    }

    #[test]
    fn test_projection_respects_share_and_bounds() {
        let agents = vec![agent("a", 10, 80), agent("b", 10, 80)];
        let problem = GroupProblem::build(
            &group(&["a", "b"], 100),
            &agents,
            &BTreeMap::new(),
            10.0,
        )
        .unwrap();
        let mut x = vec![200.0, 200.0];
        problem.project(&mut x);
        assert!(x.iter().all(|&v| (10.0..=80.0).contains(&v)));
        assert!(x.iter().sum::<f64>() <= 100.0 + 1e-9);
    }

    #[test]
    fn test_log_welfare_weights_by_burn() {
        let agents = vec![agent("a", 0, 100)];
        let alloc = BTreeMap::from([(
            "a".to_string(),
            BTreeMap::from([(ResourceType::Compute, 50u64)]),
        )]);
        let zero_burn = log_welfare(&agents, &alloc, &BTreeMap::new(), 10.0);
        let with_burn = log_welfare(
            &agents,
            &alloc,
            &BTreeMap::from([("a".to_string(), 10_000)]),
            10.0,
        );
        // Same allocation, higher weight: welfare scales up.
        assert!(with_burn > zero_burn);
    }
}
