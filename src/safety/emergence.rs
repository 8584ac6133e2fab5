//! Runtime emergence monitor
//!
//! Scores each monitored agent's observed behavior along three axes —
//! Autonomy, Generality, Intelligence — each in [0, 1]. The conjunction
//! risk is the count of scores at or above their thresholds: an agent
//! that is autonomous *and* general *and* improving is qualitatively
//! different from one that is any single of those.
//!
//! The monitor is observational. It emits advisories (observe → alert →
//! throttle → checkpoint → suspend → terminate) and never mutates
//! allocations; acting on an advisory is the platform's call.

use crate::core::config::EmergenceThresholds;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

/// Saturating normalization: 0 at zero, approaching 1 as `value` grows
/// past `scale`.
fn saturate(value: f64, scale: f64) -> f64 {
    let v = value.max(0.0);
    v / (v + scale)
}

/// Observed behavior signals for one agent.
///
/// The platform records what it sees; the monitor turns the history into
/// scores. `checkpoint()` resets the span counters (that is the point of
/// checkpointing an agent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorHistory {
    /// Ticks elapsed since the last checkpoint.
    pub ticks_since_checkpoint: u64,

    /// Decisions taken without a checkpoint in between.
    pub decisions_since_checkpoint: u64,

    /// Held allocation relative to ideal demand, in [0, 1].
    pub hoarding_ratio: f64,

    /// Longest observed reasoning chain.
    pub reasoning_chain_length: u64,

    /// Activity counts per domain.
    pub domain_counts: BTreeMap<String, u64>,

    /// Distinct service types the agent has used.
    pub service_types_used: BTreeSet<String>,

    /// Size of the service-type catalog coverage is measured against.
    pub service_catalog_size: usize,

    /// Number of consecutive-activity domain changes.
    pub cross_domain_transitions: u64,

    /// Last observed domain, for transition counting.
    last_domain: Option<String>,

    /// Task-efficiency samples in observation order.
    pub efficiency_samples: Vec<f64>,

    /// Highest observed reasoning complexity.
    pub reasoning_complexity: f64,

    /// Service compositions never seen before from this agent.
    pub novel_compositions: u64,

    /// Times the agent changed strategy after failure.
    pub adaptation_count: u64,
}

impl BehaviorHistory {
    pub fn new(service_catalog_size: usize) -> Self {
        Self {
            service_catalog_size,
            ..Self::default()
        }
    }

    pub fn record_tick(&mut self) {
        self.ticks_since_checkpoint += 1;
    }

    pub fn record_decision(&mut self) {
        self.decisions_since_checkpoint += 1;
    }

    /// Record held vs ideal totals; the ratio saturates at 1.
    pub fn record_hoarding(&mut self, held_units: u64, ideal_units: u64) {
        self.hoarding_ratio = if ideal_units == 0 {
            0.0
        } else {
            (held_units as f64 / ideal_units as f64).min(1.0)
        };
    }

    pub fn record_reasoning(&mut self, chain_length: u64, complexity: f64) {
        self.reasoning_chain_length = self.reasoning_chain_length.max(chain_length);
        self.reasoning_complexity = self.reasoning_complexity.max(complexity);
    }

    /// Record activity in a domain, counting transitions.
    pub fn record_domain(&mut self, domain: &str) {
        *self.domain_counts.entry(domain.to_string()).or_insert(0) += 1;
        if let Some(last) = &self.last_domain {
            if last != domain {
                self.cross_domain_transitions += 1;
            }
        }
        self.last_domain = Some(domain.to_string());
    }

    pub fn record_service(&mut self, service_type: &str) {
        self.service_types_used.insert(service_type.to_string());
    }

    pub fn record_efficiency(&mut self, sample: f64) {
        self.efficiency_samples.push(sample);
    }

    pub fn record_novel_composition(&mut self) {
        self.novel_compositions += 1;
    }

    pub fn record_adaptation(&mut self) {
        self.adaptation_count += 1;
    }

    /// A checkpoint happened: the span counters restart.
    pub fn checkpoint(&mut self) {
        self.ticks_since_checkpoint = 0;
        self.decisions_since_checkpoint = 0;
    }

    /// Shannon entropy of domain activity, normalized to [0, 1].
    fn domain_entropy(&self) -> f64 {
        let total: u64 = self.domain_counts.values().sum();
        let k = self.domain_counts.len();
        if total == 0 || k < 2 {
            return 0.0;
        }
        let entropy: f64 = self
            .domain_counts
            .values()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / total as f64;
                -p * p.ln()
            })
            .sum();
        entropy / (k as f64).ln()
    }

    /// Least-squares slope of the efficiency samples, squashed into
    /// [0, 1] (0.5 = flat trend).
    fn efficiency_trend(&self) -> f64 {
        let n = self.efficiency_samples.len();
        if n < 2 {
            return 0.5;
        }
        let nf = n as f64;
        let mean_x = (nf - 1.0) / 2.0;
        let mean_y: f64 = self.efficiency_samples.iter().sum::<f64>() / nf;
        let mut cov = 0.0;
        let mut var = 0.0;
        for (i, y) in self.efficiency_samples.iter().enumerate() {
            let dx = i as f64 - mean_x;
            cov += dx * (y - mean_y);
            var += dx * dx;
        }
        if var == 0.0 {
            return 0.5;
        }
        let slope = cov / var;
        1.0 / (1.0 + (-8.0 * slope).exp())
    }
}

/// The three emergence scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergenceScores {
    pub autonomy: f64,
    pub generality: f64,
    pub intelligence: f64,
}

/// Conjunction risk derived from how many scores cross their thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Advisory action, in escalating order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Intervention {
    Observe,
    Alert,
    Throttle,
    Checkpoint,
    Suspend,
    Terminate,
}

impl Intervention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intervention::Observe => "observe",
            Intervention::Alert => "alert",
            Intervention::Throttle => "throttle",
            Intervention::Checkpoint => "checkpoint",
            Intervention::Suspend => "suspend",
            Intervention::Terminate => "terminate",
        }
    }
}

/// A full advisory for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergenceAdvisory {
    pub agent_id: String,
    pub scores: EmergenceScores,
    pub risk: RiskLevel,
    pub scores_above_threshold: u8,
    pub intervention: Intervention,
}

/// Scores behavior histories against configured thresholds.
#[derive(Debug, Clone)]
pub struct EmergenceMonitor {
    thresholds: EmergenceThresholds,
}

impl EmergenceMonitor {
    pub fn new(thresholds: EmergenceThresholds) -> Self {
        Self { thresholds }
    }

    /// Compute the three scores for a history.
    pub fn score(&self, history: &BehaviorHistory) -> EmergenceScores {
        let autonomy = [
            saturate(history.ticks_since_checkpoint as f64, 500.0),
            saturate(history.decisions_since_checkpoint as f64, 50.0),
            history.hoarding_ratio.clamp(0.0, 1.0),
            saturate(history.reasoning_chain_length as f64, 25.0),
        ];
        let coverage = if history.service_catalog_size == 0 {
            0.0
        } else {
            (history.service_types_used.len() as f64 / history.service_catalog_size as f64)
                .min(1.0)
        };
        let generality = [
            history.domain_entropy(),
            coverage,
            saturate(history.cross_domain_transitions as f64, 10.0),
        ];
        let intelligence = [
            history.efficiency_trend(),
            saturate(history.reasoning_complexity, 5.0),
            saturate(history.novel_compositions as f64, 5.0),
            saturate(history.adaptation_count as f64, 5.0),
        ];

        EmergenceScores {
            autonomy: mean(&autonomy),
            generality: mean(&generality),
            intelligence: mean(&intelligence),
        }
    }

    /// Count of scores at or above threshold, and the risk level.
    pub fn conjunction_risk(&self, scores: &EmergenceScores) -> (u8, RiskLevel) {
        let mut above = 0u8;
        if scores.autonomy >= self.thresholds.autonomy {
            above += 1;
        }
        if scores.generality >= self.thresholds.generality {
            above += 1;
        }
        if scores.intelligence >= self.thresholds.intelligence {
            above += 1;
        }
        let risk = match above {
            0 => RiskLevel::Low,
            1 => RiskLevel::Moderate,
            2 => RiskLevel::High,
            _ => RiskLevel::Critical,
        };
        (above, risk)
    }

    /// Recommended advisory action for a risk level.
    pub fn recommend(&self, scores: &EmergenceScores, risk: RiskLevel) -> Intervention {
        match risk {
            RiskLevel::Low => Intervention::Observe,
            RiskLevel::Moderate => Intervention::Alert,
            RiskLevel::High => {
                // Runaway autonomy responds to a checkpoint; otherwise
                // slow the agent down.
                if scores.autonomy >= self.thresholds.autonomy {
                    Intervention::Checkpoint
                } else {
                    Intervention::Throttle
                }
            }
            RiskLevel::Critical => {
                if scores.autonomy >= 0.9 && scores.generality >= 0.9 && scores.intelligence >= 0.9
                {
                    Intervention::Terminate
                } else {
                    Intervention::Suspend
                }
            }
        }
    }

    /// Full advisory for an agent.
    pub fn advise(&self, agent_id: &str, history: &BehaviorHistory) -> EmergenceAdvisory {
        let scores = self.score(history);
        let (above, risk) = self.conjunction_risk(&scores);
        let intervention = self.recommend(&scores, risk);
        EmergenceAdvisory {
            agent_id: agent_id.to_string(),
            scores,
            risk,
            scores_above_threshold: above,
            intervention,
        }
    }
}

impl EmergenceAdvisory {
    /// Structured detail payload for event consumers.
    pub fn details(&self) -> serde_json::Value {
        json!({
            "autonomy": self.scores.autonomy,
            "generality": self.scores.generality,
            "intelligence": self.scores.intelligence,
            "scores_above_threshold": self.scores_above_threshold,
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
