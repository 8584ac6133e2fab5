//! Static configuration validation
//!
//! Run once when agents and pool are handed to a session. Errors reject
//! the configuration outright (never producing partial state); warnings
//! flag smells worth a look — heavy over-subscription, deep utility
//! compositions — without blocking.
//!
//! Constructors assert most structural invariants, but agents and pools
//! can also arrive through deserialization, which asserts nothing; this
//! pass is the safety net for that path.

use crate::core::config::ArbitrationConfig;
use crate::models::agent::Agent;
use crate::models::resource::{ResourcePool, ResourceType};
use crate::utility::UtilityFunction;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// How bad an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Worth a look; does not block the configuration.
    Warning,

    /// The configuration is rejected.
    Error,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub category: String,
    pub field: String,
    pub message: String,
    pub recommendation: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {}/{}: {} ({})",
            self.severity, self.category, self.field, self.message, self.recommendation
        )
    }
}

impl Issue {
    fn error(category: &str, field: String, message: String, recommendation: &str) -> Self {
        Self {
            severity: Severity::Error,
            category: category.to_string(),
            field,
            message,
            recommendation: recommendation.to_string(),
        }
    }

    fn warning(category: &str, field: String, message: String, recommendation: &str) -> Self {
        Self {
            severity: Severity::Warning,
            category: category.to_string(),
            field,
            message,
            recommendation: recommendation.to_string(),
        }
    }
}

/// Whether a set of issues contains any hard error.
pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

/// Validate agents and pool against the configuration.
pub fn validate(agents: &[Agent], pool: &ResourcePool, config: &ArbitrationConfig) -> Vec<Issue> {
    let mut issues = Vec::new();

    for agent in agents {
        validate_agent(agent, config, &mut issues);
    }
    validate_pool(agents, pool, config, &mut issues);

    for issue in issues.iter().filter(|i| i.severity == Severity::Warning) {
        warn!(%issue, "validation warning");
    }
    issues
}

fn validate_agent(agent: &Agent, config: &ArbitrationConfig, issues: &mut Vec<Issue>) {
    let id = agent.id();

    if agent.id().is_empty() {
        issues.push(Issue::error(
            "agent",
            "id".to_string(),
            "agent id is empty".to_string(),
            "give every agent a stable non-empty id",
        ));
    }

    let weight_sum: f64 = agent.weights().values().sum();
    if agent.weights().values().any(|w| *w < 0.0) {
        issues.push(Issue::error(
            "agent",
            format!("{}.weights", id),
            "negative preference weight".to_string(),
            "weights must be non-negative",
        ));
    } else if !agent.weights().is_empty() && (weight_sum - 1.0).abs() > 1e-3 {
        issues.push(Issue::warning(
            "agent",
            format!("{}.weights", id),
            format!("weights sum to {:.4}, expected 1.0 ± 1e-3", weight_sum),
            "normalize preference weights",
        ));
    }

    for (resource, request) in agent.requests() {
        if request.min > request.ideal {
            issues.push(Issue::error(
                "agent",
                format!("{}.requests.{}", id, resource),
                format!("min {} exceeds ideal {}", request.min, request.ideal),
                "keep min <= ideal",
            ));
        }
    }

    if agent.balance_mc() < config.min_balance_mc {
        issues.push(Issue::error(
            "agent",
            format!("{}.balance", id),
            format!(
                "balance {} mc below the floor {} mc",
                agent.balance_mc(),
                config.min_balance_mc
            ),
            "fund the agent to at least the minimum balance",
        ));
    }

    let depth = agent.utility().depth();
    if depth > config.hard_composition_depth {
        issues.push(Issue::error(
            "utility",
            format!("{}.utility", id),
            format!(
                "composition depth {} exceeds the hard limit {}",
                depth, config.hard_composition_depth
            ),
            "flatten the utility composition",
        ));
    } else if depth > config.soft_composition_depth {
        issues.push(Issue::warning(
            "utility",
            format!("{}.utility", id),
            format!(
                "composition depth {} exceeds the advisory limit {}",
                depth, config.soft_composition_depth
            ),
            "consider flattening the utility composition",
        ));
    }

    validate_utility(agent, agent.utility(), issues);
}

fn validate_utility(agent: &Agent, utility: &UtilityFunction, issues: &mut Vec<Issue>) {
    let field = format!("{}.utility.{}", agent.id(), utility.kind_name());
    match utility {
        UtilityFunction::Linear { weights }
        | UtilityFunction::Sqrt { weights }
        | UtilityFunction::Log { weights } => {
            if weights.values().any(|w| *w < 0.0) {
                issues.push(Issue::error(
                    "utility",
                    field,
                    "negative utility weight".to_string(),
                    "utility weights must be non-negative",
                ));
            }
        }

        UtilityFunction::CobbDouglas { exponents } => {
            if exponents.values().any(|w| *w < 0.0) {
                issues.push(Issue::error(
                    "utility",
                    field,
                    "negative Cobb-Douglas exponent".to_string(),
                    "exponents must be non-negative",
                ));
            }
        }

        UtilityFunction::Ces { rho, .. } => {
            validate_rho(*rho, &field, issues);
        }

        UtilityFunction::NestedCes { nests, outer_rho } => {
            validate_rho(*outer_rho, &field, issues);
            for (i, nest) in nests.iter().enumerate() {
                validate_rho(nest.rho, &format!("{}.nests[{}]", field, i), issues);
                if nest.weight < 0.0 {
                    issues.push(Issue::error(
                        "utility",
                        format!("{}.nests[{}]", field, i),
                        "negative nest weight".to_string(),
                        "nest weights must be non-negative",
                    ));
                }
            }
        }

        UtilityFunction::Leontief { proportions } => {
            if proportions.values().any(|w| *w <= 0.0) {
                issues.push(Issue::error(
                    "utility",
                    field,
                    "non-positive Leontief proportion".to_string(),
                    "proportions must be strictly positive",
                ));
            }
        }

        UtilityFunction::Threshold {
            base,
            threshold,
            sharpness,
        } => {
            let total_ideal = agent.total_ideal() as f64;
            if *threshold >= total_ideal && total_ideal > 0.0 {
                issues.push(Issue::error(
                    "utility",
                    field.clone(),
                    format!(
                        "threshold {} is unreachable within total ideal demand {}",
                        threshold, total_ideal
                    ),
                    "keep the threshold below the agent's total ideal",
                ));
            }
            if *sharpness <= 0.0 {
                issues.push(Issue::error(
                    "utility",
                    field,
                    "non-positive threshold sharpness".to_string(),
                    "sharpness must be positive",
                ));
            }
            validate_utility(agent, base, issues);
        }

        UtilityFunction::Satiation { base, v_max, k }
        | UtilityFunction::HyperbolicSatiation { base, v_max, k } => {
            if *v_max <= 0.0 {
                issues.push(Issue::error(
                    "utility",
                    field.clone(),
                    "satiation ceiling must be positive".to_string(),
                    "set v_max > 0",
                ));
            }
            if *k <= 0.0 {
                issues.push(Issue::error(
                    "utility",
                    field,
                    "satiation rate must be positive".to_string(),
                    "set k > 0",
                ));
            }
            validate_utility(agent, base, issues);
        }

        UtilityFunction::SoftplusLossAversion {
            reference,
            lambda,
            beta,
        }
        | UtilityFunction::AsymmetricLogLossAversion {
            reference,
            lambda,
            beta,
        } => {
            if *lambda <= 1.0 {
                issues.push(Issue::error(
                    "utility",
                    field.clone(),
                    format!("loss multiplier {} must exceed 1", lambda),
                    "set lambda > 1 (losses weigh more than gains)",
                ));
            }
            if *beta <= 0.0 {
                issues.push(Issue::error(
                    "utility",
                    field.clone(),
                    "loss-aversion slope must be positive".to_string(),
                    "set beta > 0",
                ));
            }
            for (resource, level) in reference {
                let ideal = agent.request(*resource).ideal as f64;
                if *level > ideal {
                    issues.push(Issue::error(
                        "utility",
                        format!("{}.reference.{}", field, resource),
                        format!(
                            "reference point {} exceeds ideal request {}",
                            level, ideal
                        ),
                        "keep reference points within the requested range",
                    ));
                }
            }
        }
    }
}

fn validate_rho(rho: f64, field: &str, issues: &mut Vec<Issue>) {
    if rho >= 1.0 || rho == 0.0 {
        issues.push(Issue::error(
            "utility",
            field.to_string(),
            format!("CES rho {} outside (-inf, 1) \\ {{0}}", rho),
            "choose rho < 1 and rho != 0",
        ));
    }
}

fn validate_pool(
    agents: &[Agent],
    pool: &ResourcePool,
    config: &ArbitrationConfig,
    issues: &mut Vec<Issue>,
) {
    if pool.resource_types().is_empty() {
        issues.push(Issue::error(
            "pool",
            "capacity".to_string(),
            "pool carries no resources".to_string(),
            "configure at least one resource capacity",
        ));
    }

    for resource in ResourceType::ALL {
        let capacity = pool.capacity(resource);
        let total_min: u64 = agents.iter().map(|a| a.request(resource).min).sum();
        let total_ideal: u64 = agents.iter().map(|a| a.request(resource).ideal).sum();

        if capacity == 0 {
            if total_ideal > 0 {
                issues.push(Issue::error(
                    "pool",
                    format!("capacity.{}", resource),
                    format!("agents request {} but the pool has none", resource),
                    "add capacity for the resource or drop the requests",
                ));
            }
            continue;
        }

        if total_min > capacity {
            issues.push(Issue::error(
                "pool",
                format!("capacity.{}", resource),
                format!(
                    "total minimum demand {} exceeds capacity {} for {}",
                    total_min, capacity, resource
                ),
                "raise capacity or lower minimum demands",
            ));
        }

        let ratio = total_ideal as f64 / capacity as f64;
        if ratio > config.contention_warning_ratio {
            issues.push(Issue::warning(
                "pool",
                format!("capacity.{}", resource),
                format!(
                    "ideal demand is {:.1}x capacity for {}",
                    ratio, resource
                ),
                "expect heavy contention; consider raising capacity",
            ));
        }
    }
}
