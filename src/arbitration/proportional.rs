//! Single-resource weighted proportional fairness
//!
//! Maximizes `Σ w_i · ln(x_i)` subject to `min_i ≤ x_i ≤ ideal_i` and
//! `Σ x_i ≤ available`, with `w_i = base_weight + burned credits`.
//!
//! The log barrier diverges as any allocation approaches zero, so no
//! competitor with positive weight is ever starved; the bounded weights
//! mean no coalition of burners can push a victim below its minimum.
//!
//! # Algorithm
//!
//! Water-filling: start everyone at their minimum, then close the
//! capacity with the Lagrangian form `x_i = clamp(w_i / λ, min_i,
//! ideal_i)`, solving the dual λ by bisection (the filled capacity is
//! monotone decreasing in λ).

use crate::arbitration::rounding::{round_to_capacity, RoundEntry};
use crate::arbitration::{AllocationResult, Claim, SolveError, WELFARE_EPS};
use crate::contention::detector::Contention;
use crate::economy::credits;
use crate::models::agent::Agent;
use crate::models::resource::ResourceType;
use std::collections::BTreeMap;
use tracing::debug;

/// Capacity-residual tolerance for the dual bisection.
const BISECTION_TOL: f64 = 1e-6;
const BISECTION_MAX_ITERS: usize = 200;

/// Arbitrate one contended resource.
///
/// Weights are `base_weight + credits(burn)`; burns for agents outside
/// the contention are ignored.
pub fn arbitrate(
    contention: &Contention,
    agents: &[Agent],
    burns_mc: &BTreeMap<String, i64>,
    base_weight: f64,
) -> Result<AllocationResult, SolveError> {
    let claims: Vec<Claim> = contention
        .competitors
        .iter()
        .filter_map(|id| agents.iter().find(|a| a.id() == id))
        .map(|agent| {
            let request = agent.request(contention.resource);
            let burn = burns_mc.get(agent.id()).copied().unwrap_or(0);
            Claim {
                id: agent.id().to_string(),
                min: request.min,
                ideal: request.ideal,
                weight: base_weight + credits(burn.max(0)),
            }
        })
        .collect();

    let (allocations, objective) = water_fill(contention.resource, contention.available, &claims)?;

    let burns: BTreeMap<String, i64> = claims
        .iter()
        .map(|c| (c.id.clone(), burns_mc.get(&c.id).copied().unwrap_or(0)))
        .collect();

    Ok(AllocationResult {
        resource: contention.resource,
        allocations,
        burns_mc: burns,
        objective,
    })
}

/// Water-filling core shared by the proportional and sequential
/// arbitrators. Returns rounded allocations and the log objective.
pub(crate) fn water_fill(
    resource: ResourceType,
    available: u64,
    claims: &[Claim],
) -> Result<(BTreeMap<String, u64>, f64), SolveError> {
    let required: u64 = claims.iter().map(|c| c.min).sum();
    if required > available {
        return Err(SolveError::InfeasibleMinimums {
            resource,
            required,
            available,
        });
    }
    if claims.is_empty() {
        return Ok((BTreeMap::new(), 0.0));
    }
    if claims.iter().all(|c| c.weight <= 0.0) {
        return Err(SolveError::DegenerateWeights {
            count: claims.len(),
        });
    }

    let total_ideal: u64 = claims.iter().map(|c| c.ideal).sum();
    let continuous: Vec<f64> = if total_ideal <= available {
        // Nothing to fight over: everyone gets their ideal.
        claims.iter().map(|c| c.ideal as f64).collect()
    } else if available == 0 {
        // Feasible (all minimums are zero) but nothing to hand out.
        vec![0.0; claims.len()]
    } else {
        solve_dual(available, claims)
    };

    let entries: Vec<RoundEntry> = claims
        .iter()
        .zip(&continuous)
        .map(|(c, x)| RoundEntry {
            id: c.id.clone(),
            value: *x,
            min: c.min,
            ideal: c.ideal,
        })
        .collect();
    let allocations = round_to_capacity(available, &entries);

    let objective = claims
        .iter()
        .map(|c| {
            let x = allocations.get(&c.id).copied().unwrap_or(0) as f64;
            c.weight * (x + WELFARE_EPS).ln()
        })
        .sum();

    Ok((allocations, objective))
}

/// Filled capacity at a given dual value.
fn filled(lambda: f64, claims: &[Claim]) -> f64 {
    claims
        .iter()
        .map(|c| (c.weight / lambda).clamp(c.min as f64, c.ideal as f64))
        .sum()
}

/// Bisect the dual λ until the filled capacity matches `available`.
fn solve_dual(available: u64, claims: &[Claim]) -> Vec<f64> {
    let target = available as f64;

    // Bracket: filled() is monotone decreasing in λ. A tiny λ gives
    // everyone their ideal (too much); grow λ until the fill fits.
    let mut lo = 1e-12;
    let mut hi = 1.0;
    let mut guard = 0;
    while filled(hi, claims) > target && guard < 200 {
        lo = hi;
        hi *= 2.0;
        guard += 1;
    }

    for _ in 0..BISECTION_MAX_ITERS {
        let mid = 0.5 * (lo + hi);
        let fill = filled(mid, claims);
        if (fill - target).abs() < BISECTION_TOL {
            lo = mid;
            hi = mid;
            break;
        }
        if fill > target {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let lambda = 0.5 * (lo + hi);
    debug!(lambda, target, "water-fill dual solved");
    claims
        .iter()
        .map(|c| (c.weight / lambda).clamp(c.min as f64, c.ideal as f64))
        .collect()
}
