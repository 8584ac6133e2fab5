//! Projected gradient ascent on the joint log-welfare
//!
//! Maximizes `Σ_i W_i · ln(U_i(x_i))` over the box `[min, ideal]` and the
//! per-resource capacity simplex. Handles every utility kind — including
//! the non-concave and kinked ones the interior-point solver refuses —
//! at the cost of first-order convergence.
//!
//! Step sizes come from backtracking Armijo line search (initial 1.0,
//! shrink 0.5, c₁ = 1e-4). The projection clamps to the box first, then
//! uniformly scales each resource's mass above the minimums back inside
//! the group share, so every iterate is feasible and the best one seen
//! is always a valid answer.

use crate::arbitration::{
    log_welfare, GroupProblem, JointAllocationResult, SolveError, SolverKind,
};
use crate::contention::grouping::ContentionGroup;
use crate::core::cancel::{Interrupt, SolveLimits};
use crate::models::agent::Agent;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

const ARMIJO_C1: f64 = 1e-4;
const ARMIJO_SHRINK: f64 = 0.5;
const MIN_STEP: f64 = 1e-12;

/// Solve a group by projected gradient ascent.
pub fn arbitrate(
    group: &ContentionGroup,
    agents: &[Agent],
    burns_mc: &BTreeMap<String, i64>,
    base_weight: f64,
    tolerance: f64,
    max_iterations: usize,
    limits: &SolveLimits,
) -> Result<JointAllocationResult, SolveError> {
    let started = Instant::now();
    let problem = GroupProblem::build(group, agents, burns_mc, base_weight)?;
    let n = problem.var_count();

    // Start in the middle of the box, projected feasible.
    let mut x: Vec<f64> = (0..n)
        .map(|v| 0.5 * (problem.lower[v] + problem.upper[v]))
        .collect();
    problem.project(&mut x);

    let mut best_x = x.clone();
    let mut best_value = problem.objective(&x);
    let mut converged = false;
    let mut timed_out = false;
    let mut iterations = 0usize;

    for iteration in 0..max_iterations {
        iterations = iteration;
        match limits.interrupted() {
            Some(Interrupt::Cancelled) => return Err(SolveError::Cancelled),
            Some(Interrupt::DeadlineExpired) => {
                timed_out = true;
                break;
            }
            None => {}
        }

        let gradient = problem.objective_gradient(&x);

        // Projected ascent direction at unit step.
        let mut probe = x.clone();
        for v in 0..n {
            probe[v] += gradient[v];
        }
        problem.project(&mut probe);
        let direction_norm: f64 = probe
            .iter()
            .zip(&x)
            .map(|(p, xi)| (p - xi) * (p - xi))
            .sum::<f64>()
            .sqrt();
        if direction_norm < tolerance {
            converged = true;
            break;
        }

        // Backtracking Armijo on the projected arc.
        let value = problem.objective(&x);
        let mut step = 1.0;
        let mut accepted = None;
        while step >= MIN_STEP {
            let mut candidate = x.clone();
            for v in 0..n {
                candidate[v] += step * gradient[v];
            }
            problem.project(&mut candidate);
            let candidate_value = problem.objective(&candidate);
            let predicted: f64 = gradient
                .iter()
                .zip(candidate.iter().zip(&x))
                .map(|(g, (c, xi))| g * (c - xi))
                .sum();
            if candidate_value >= value + ARMIJO_C1 * predicted && candidate_value > value {
                accepted = Some((candidate, candidate_value));
                break;
            }
            step *= ARMIJO_SHRINK;
        }

        match accepted {
            Some((candidate, candidate_value)) => {
                x = candidate;
                if candidate_value > best_value {
                    best_value = candidate_value;
                    best_x = x.clone();
                }
            }
            None => {
                // No step improves the objective: first-order stationary
                // up to line-search resolution.
                converged = direction_norm < tolerance.max(1e-4);
                break;
            }
        }
    }

    debug!(
        iterations,
        converged, best_value, "gradient ascent finished"
    );

    let allocations = problem.round(&best_x);
    let burns = problem.member_burns(burns_mc);
    let objective = log_welfare(agents, &allocations, &burns, base_weight);

    Ok(JointAllocationResult {
        allocations,
        burns_mc: burns,
        objective,
        feasible: true,
        solver: SolverKind::Gradient,
        converged,
        timed_out,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}
