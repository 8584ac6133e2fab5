//! Interior-point joint arbitrator
//!
//! When every utility in a group is smooth and concave, the joint
//! problem `max Σ W_i · ln(U_i(x_i))` over box and capacity constraints
//! is convex. This solver runs a log-barrier interior-point method:
//! Newton inner iterations on the barrier-augmented objective, barrier
//! parameter scaled by μ = 10 per outer step, until the duality gap
//! `m/t` falls below the configured tolerance.
//!
//! Newton systems are small and dense (group size × resource count
//! variables), solved by Cholesky with ridge escalation. Any numerical
//! failure — loss of positive definiteness, a dead line search, hitting
//! the outer iteration cap — surfaces as an error so the caller can fall
//! back to the gradient solver. Utilities that are kinked, gated or can
//! go negative are rejected upfront for the same reason.

use crate::arbitration::{
    log_welfare, GroupProblem, JointAllocationResult, SolveError, SolverKind,
};
use crate::contention::grouping::ContentionGroup;
use crate::core::cancel::{Interrupt, SolveLimits};
use crate::models::agent::Agent;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

const MU: f64 = 10.0;
const MAX_OUTER: usize = 60;
const MAX_NEWTON: usize = 50;
const NEWTON_DECREMENT_TOL: f64 = 1e-10;
const ARMIJO_C1: f64 = 1e-4;

/// Solve a group via the convex reformulation.
///
/// Errors with [`SolveError::Unsupported`] when a utility is not
/// smooth-concave and with [`SolveError::Numerical`] on solver
/// breakdown; the session maps both to a gradient fallback.
pub fn arbitrate(
    group: &ContentionGroup,
    agents: &[Agent],
    burns_mc: &BTreeMap<String, i64>,
    base_weight: f64,
    tolerance: f64,
    limits: &SolveLimits,
) -> Result<JointAllocationResult, SolveError> {
    let started = Instant::now();
    let problem = GroupProblem::build(group, agents, burns_mc, base_weight)?;

    for agent in &problem.members {
        if !agent.utility().is_smooth_concave() {
            return Err(SolveError::Unsupported {
                detail: format!(
                    "utility '{}' of agent '{}' is not smooth-concave",
                    agent.utility().kind_name(),
                    agent.id()
                ),
            });
        }
    }

    let solver = BarrierSolver::new(&problem);
    if solver.active.is_empty() {
        // Every variable pinned by its bounds or a tight share: the
        // minimums are the whole answer.
        let x = problem.lower.clone();
        let allocations = problem.round(&x);
        let burns = problem.member_burns(burns_mc);
        let objective = log_welfare(agents, &allocations, &burns, base_weight);
        return Ok(JointAllocationResult {
            allocations,
            burns_mc: burns,
            objective,
            feasible: true,
            solver: SolverKind::InteriorPoint,
            converged: true,
            timed_out: false,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }

    let mut z = solver.initial_point();
    let m = solver.inequality_count() as f64;
    let mut t = 1.0;
    let mut converged = false;
    let mut timed_out = false;

    for outer in 0..MAX_OUTER {
        match limits.interrupted() {
            Some(Interrupt::Cancelled) => return Err(SolveError::Cancelled),
            Some(Interrupt::DeadlineExpired) => {
                timed_out = true;
                break;
            }
            None => {}
        }

        solver.newton_minimize(&mut z, t)?;
        debug!(outer, t, gap = m / t, "barrier stage complete");
        if m / t <= tolerance {
            converged = true;
            break;
        }
        t *= MU;
    }

    if !converged && !timed_out {
        return Err(SolveError::Numerical {
            detail: format!("barrier method did not close the gap below {}", tolerance),
        });
    }

    let x = solver.full_point(&z);
    let allocations = problem.round(&x);
    let burns = problem.member_burns(burns_mc);
    let objective = log_welfare(agents, &allocations, &burns, base_weight);

    Ok(JointAllocationResult {
        allocations,
        burns_mc: burns,
        objective,
        feasible: true,
        solver: SolverKind::InteriorPoint,
        converged,
        timed_out,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

/// Barrier subproblem state: which variables can move, and the capacity
/// slack bookkeeping per resource.
struct BarrierSolver<'p, 'a> {
    problem: &'p GroupProblem<'a>,

    /// Global indices of free variables.
    active: Vec<usize>,

    /// For each group resource: remaining capacity once pinned variables
    /// take their lower bounds, and the active variables on it (as
    /// positions into `active`).
    capacities: Vec<(f64, Vec<usize>)>,
}

impl<'p, 'a> BarrierSolver<'p, 'a> {
    fn new(problem: &'p GroupProblem<'a>) -> Self {
        let member_count = problem.members.len();
        let resource_count = problem.resources.len();

        // A resource whose share is exhausted by the minimums pins all
        // of its variables.
        let mut resource_open = vec![false; resource_count];
        for j in 0..resource_count {
            let floor: f64 = (0..member_count)
                .map(|i| problem.lower[problem.index(i, j)])
                .sum();
            resource_open[j] = problem.share[j] - floor > 1e-9;
        }

        let mut active = Vec::new();
        for i in 0..member_count {
            for j in 0..resource_count {
                let v = problem.index(i, j);
                if resource_open[j] && problem.upper[v] - problem.lower[v] > 1e-9 {
                    active.push(v);
                }
            }
        }

        let position: BTreeMap<usize, usize> = active
            .iter()
            .enumerate()
            .map(|(pos, &v)| (v, pos))
            .collect();

        let mut capacities = Vec::with_capacity(resource_count);
        for j in 0..resource_count {
            let mut cap = problem.share[j];
            let mut vars = Vec::new();
            for i in 0..member_count {
                let v = problem.index(i, j);
                match position.get(&v) {
                    Some(&pos) => vars.push(pos),
                    None => cap -= problem.lower[v],
                }
            }
            capacities.push((cap, vars));
        }

        Self {
            problem,
            active,
            capacities,
        }
    }

    fn inequality_count(&self) -> usize {
        2 * self.active.len()
            + self
                .capacities
                .iter()
                .filter(|(_, vars)| !vars.is_empty())
                .count()
    }

    /// Strictly interior start: a bounded fraction of each resource's
    /// slack, spread over its free variables in proportion to span.
    fn initial_point(&self) -> Vec<f64> {
        let mut z: Vec<f64> = self
            .active
            .iter()
            .map(|&v| self.problem.lower[v])
            .collect();
        for (cap, vars) in &self.capacities {
            if vars.is_empty() {
                continue;
            }
            let floor: f64 = vars.iter().map(|&pos| self.problem.lower[self.active[pos]]).sum();
            let budget = 0.9 * (cap - floor);
            let span_total: f64 = vars
                .iter()
                .map(|&pos| {
                    let v = self.active[pos];
                    self.problem.upper[v] - self.problem.lower[v]
                })
                .sum();
            for &pos in vars {
                let v = self.active[pos];
                let span = self.problem.upper[v] - self.problem.lower[v];
                let delta = (budget * span / span_total).min(0.99 * span);
                z[pos] = self.problem.lower[v] + delta;
            }
        }
        z
    }

    /// Expand active values into a full variable vector.
    fn full_point(&self, z: &[f64]) -> Vec<f64> {
        let mut x = self.problem.lower.clone();
        for (pos, &v) in self.active.iter().enumerate() {
            x[v] = z[pos];
        }
        x
    }

    /// Capacity slacks at a point; `None` if any is non-positive.
    fn slacks(&self, z: &[f64]) -> Option<Vec<f64>> {
        let mut slacks = Vec::with_capacity(self.capacities.len());
        for (cap, vars) in &self.capacities {
            if vars.is_empty() {
                slacks.push(f64::INFINITY);
                continue;
            }
            let used: f64 = vars.iter().map(|&pos| z[pos]).sum();
            let s = cap - used;
            if s <= 0.0 {
                return None;
            }
            slacks.push(s);
        }
        Some(slacks)
    }

    /// Barrier objective `−t·F(x) − Σ ln(slacks)`; +∞ outside the
    /// interior.
    fn barrier_value(&self, z: &[f64], t: f64) -> f64 {
        let Some(slacks) = self.slacks(z) else {
            return f64::INFINITY;
        };
        let mut value = -t * self.problem.objective(&self.full_point(z));
        for (pos, &v) in self.active.iter().enumerate() {
            let lo = z[pos] - self.problem.lower[v];
            let hi = self.problem.upper[v] - z[pos];
            if lo <= 0.0 || hi <= 0.0 {
                return f64::INFINITY;
            }
            value -= lo.ln() + hi.ln();
        }
        for s in slacks {
            if s.is_finite() {
                value -= s.ln();
            }
        }
        value
    }

    /// Gradient of the utility part of one member, over its active
    /// variable positions.
    fn member_objective_gradient(&self, x: &[f64], member: usize) -> Vec<(usize, f64)> {
        let problem = self.problem;
        let alloc = problem.member_alloc(x, member);
        let utility = problem.members[member].utility().evaluate(&alloc);
        let scale = problem.weights[member] / (utility + crate::arbitration::WELFARE_EPS);
        let u_grad = problem.members[member].utility().gradient(&alloc);
        let mut out = Vec::new();
        for (j, resource) in problem.resources.iter().enumerate() {
            let v = problem.index(member, j);
            if let Some(pos) = self.active.iter().position(|&a| a == v) {
                let g = u_grad.get(resource).copied().unwrap_or(0.0);
                out.push((pos, scale * g));
            }
        }
        out
    }

    /// One Newton minimization of the barrier objective at fixed `t`.
    fn newton_minimize(&self, z: &mut Vec<f64>, t: f64) -> Result<(), SolveError> {
        let n = self.active.len();
        for _ in 0..MAX_NEWTON {
            let x = self.full_point(z);
            let slacks = self.slacks(z).ok_or_else(|| SolveError::Numerical {
                detail: "iterate left the interior".to_string(),
            })?;

            // Gradient of the barrier objective.
            let obj_grad = self.problem.objective_gradient(&x);
            let mut g = vec![0.0; n];
            for (pos, &v) in self.active.iter().enumerate() {
                let lo = z[pos] - self.problem.lower[v];
                let hi = self.problem.upper[v] - z[pos];
                g[pos] = -t * obj_grad[v] - 1.0 / lo + 1.0 / hi;
            }
            for (r, (_, vars)) in self.capacities.iter().enumerate() {
                if vars.is_empty() {
                    continue;
                }
                let inv = 1.0 / slacks[r];
                for &pos in vars {
                    g[pos] += inv;
                }
            }

            // Hessian: −t·∇²F (finite-differenced per agent block) plus
            // barrier curvature.
            let mut h = Array2::<f64>::zeros((n, n));
            self.accumulate_objective_hessian(&x, t, &mut h);
            for (pos, &v) in self.active.iter().enumerate() {
                let lo = z[pos] - self.problem.lower[v];
                let hi = self.problem.upper[v] - z[pos];
                h[[pos, pos]] += 1.0 / (lo * lo) + 1.0 / (hi * hi);
            }
            for (r, (_, vars)) in self.capacities.iter().enumerate() {
                if vars.is_empty() {
                    continue;
                }
                let inv_sq = 1.0 / (slacks[r] * slacks[r]);
                for &a in vars {
                    for &b in vars {
                        h[[a, b]] += inv_sq;
                    }
                }
            }

            let delta = solve_spd(&h, &g)?;
            let decrement: f64 = g.iter().zip(&delta).map(|(gi, di)| -gi * di).sum();
            if decrement / 2.0 < NEWTON_DECREMENT_TOL {
                return Ok(());
            }

            // Largest step keeping every slack strictly positive.
            let mut step_cap = 1.0f64;
            for (pos, &v) in self.active.iter().enumerate() {
                if delta[pos] > 0.0 {
                    step_cap =
                        step_cap.min((self.problem.upper[v] - z[pos]) / delta[pos]);
                } else if delta[pos] < 0.0 {
                    step_cap =
                        step_cap.min((z[pos] - self.problem.lower[v]) / -delta[pos]);
                }
            }
            for (r, (_, vars)) in self.capacities.iter().enumerate() {
                if vars.is_empty() {
                    continue;
                }
                let along: f64 = vars.iter().map(|&pos| delta[pos]).sum();
                if along > 0.0 {
                    step_cap = step_cap.min(slacks[r] / along);
                }
            }

            let value = self.barrier_value(z, t);
            let slope: f64 = g.iter().zip(&delta).map(|(gi, di)| gi * di).sum();
            let mut step = 0.99 * step_cap.min(1.0);
            let mut moved = false;
            while step > 1e-12 {
                let candidate: Vec<f64> = z
                    .iter()
                    .zip(&delta)
                    .map(|(zi, di)| zi + step * di)
                    .collect();
                if self.barrier_value(&candidate, t) <= value + ARMIJO_C1 * step * slope {
                    *z = candidate;
                    moved = true;
                    break;
                }
                step *= 0.5;
            }
            if !moved {
                // The quadratic model stopped matching the landscape.
                warn!("newton line search stalled");
                return Ok(());
            }
        }
        Ok(())
    }

    /// Add `−t·∇²F` into `h`. The welfare is separable per agent, so the
    /// Hessian is block diagonal; blocks are centered finite differences
    /// of the analytic per-agent gradient.
    fn accumulate_objective_hessian(&self, x: &[f64], t: f64, h: &mut Array2<f64>) {
        for member in 0..self.problem.members.len() {
            let block: Vec<usize> = self
                .member_objective_gradient(x, member)
                .iter()
                .map(|(pos, _)| *pos)
                .collect();
            if block.is_empty() {
                continue;
            }
            let k = block.len();
            let mut fd = vec![vec![0.0; k]; k];
            for (col, &pos) in block.iter().enumerate() {
                let v = self.active[pos];
                let step = 1e-5 * (1.0 + x[v].abs());
                let mut hi_x = x.to_vec();
                hi_x[v] += step;
                let mut lo_x = x.to_vec();
                lo_x[v] -= step;
                let hi_g = self.member_objective_gradient(&hi_x, member);
                let lo_g = self.member_objective_gradient(&lo_x, member);
                for (row, &row_pos) in block.iter().enumerate() {
                    let hi = hi_g
                        .iter()
                        .find(|(p, _)| *p == row_pos)
                        .map(|(_, g)| *g)
                        .unwrap_or(0.0);
                    let lo = lo_g
                        .iter()
                        .find(|(p, _)| *p == row_pos)
                        .map(|(_, g)| *g)
                        .unwrap_or(0.0);
                    fd[row][col] = (hi - lo) / (2.0 * step);
                }
            }
            // Symmetrize and accumulate −t·block.
            for (row, &a) in block.iter().enumerate() {
                for (col, &b) in block.iter().enumerate() {
                    let sym = 0.5 * (fd[row][col] + fd[col][row]);
                    h[[a, b]] += -t * sym;
                }
            }
        }
    }
}

/// Solve `H·d = −g` for symmetric positive-definite `H`, escalating a
/// diagonal ridge when the factorization fails.
fn solve_spd(h: &Array2<f64>, g: &[f64]) -> Result<Vec<f64>, SolveError> {
    let n = g.len();
    let mut ridge = 0.0f64;
    loop {
        let mut attempt = h.clone();
        if ridge > 0.0 {
            for i in 0..n {
                attempt[[i, i]] += ridge;
            }
        }
        if let Some(l) = cholesky(&attempt) {
            let neg_g: Vec<f64> = g.iter().map(|v| -v).collect();
            return Ok(cholesky_solve(&l, &neg_g));
        }
        ridge = if ridge == 0.0 { 1e-8 } else { ridge * 10.0 };
        if ridge > 1e-2 {
            return Err(SolveError::Numerical {
                detail: "newton system lost positive definiteness".to_string(),
            });
        }
    }
}

/// Dense Cholesky factorization; `None` if not positive definite.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `L·Lᵀ·x = b` by forward then backward substitution.
fn cholesky_solve(l: &Array2<f64>, b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}
