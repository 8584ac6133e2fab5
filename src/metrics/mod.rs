//! Contention histograms and per-round metrics
//!
//! Lightweight counters the session updates as it runs. Nothing here
//! influences arbitration; this is the observability surface for hosts
//! that want to chart contention pressure and solver behavior over time.

use crate::models::resource::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper edges of the demand/capacity ratio buckets. The last bucket is
/// open-ended.
const RATIO_BUCKETS: [f64; 7] = [0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0];

/// Histogram of observed demand/capacity ratios for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentionHistogram {
    counts: [u64; 8],
    samples: u64,
}

impl ContentionHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed demand/capacity ratio.
    pub fn record(&mut self, ratio: f64) {
        let bucket = RATIO_BUCKETS
            .iter()
            .position(|&edge| ratio <= edge)
            .unwrap_or(RATIO_BUCKETS.len());
        self.counts[bucket] += 1;
        self.samples += 1;
    }

    /// Bucket counts; index i covers ratios up to `RATIO_BUCKETS[i]`,
    /// the last bucket everything beyond.
    pub fn counts(&self) -> &[u64; 8] {
        &self.counts
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Fraction of samples that were over-subscribed (ratio > 1).
    pub fn oversubscribed_fraction(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        let over: u64 = self.counts[2..].iter().sum();
        over as f64 / self.samples as f64
    }
}

/// What one arbitration round did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    pub round: u64,

    /// Contentions detected this round.
    pub contentions: usize,

    /// Groups formed by the grouping policy.
    pub groups_formed: usize,

    /// Units committed per resource.
    pub committed_units: BTreeMap<ResourceType, u64>,

    /// Millicredits burned across all commits.
    pub burned_mc: i64,

    /// Results per solver kind (by stable name).
    pub solver_outcomes: BTreeMap<String, u64>,

    /// Wall-clock round time.
    pub elapsed_ms: u64,
}

/// Accumulated metrics across a session.
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    histograms: BTreeMap<ResourceType, ContentionHistogram>,
    rounds: Vec<RoundMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a demand/capacity observation for a resource.
    pub fn record_contention_ratio(&mut self, resource: ResourceType, ratio: f64) {
        self.histograms.entry(resource).or_default().record(ratio);
    }

    /// Record a finished round.
    pub fn record_round(&mut self, metrics: RoundMetrics) {
        self.rounds.push(metrics);
    }

    pub fn histogram(&self, resource: ResourceType) -> Option<&ContentionHistogram> {
        self.histograms.get(&resource)
    }

    pub fn rounds(&self) -> &[RoundMetrics] {
        &self.rounds
    }

    /// Total units committed per resource across all rounds.
    pub fn total_committed(&self) -> BTreeMap<ResourceType, u64> {
        let mut totals = BTreeMap::new();
        for round in &self.rounds {
            for (resource, units) in &round.committed_units {
                *totals.entry(*resource).or_insert(0) += units;
            }
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_buckets() {
        let mut h = ContentionHistogram::new();
        h.record(0.3); // bucket 0
        h.record(0.9); // bucket 1
        h.record(1.2); // bucket 2
        h.record(25.0); // open-ended bucket
        assert_eq!(h.samples(), 4);
        assert_eq!(h.counts()[0], 1);
        assert_eq!(h.counts()[1], 1);
        assert_eq!(h.counts()[2], 1);
        assert_eq!(h.counts()[7], 1);
        assert!((h.oversubscribed_fraction() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_registry_accumulates_rounds() {
        let mut registry = MetricsRegistry::new();
        registry.record_round(RoundMetrics {
            round: 0,
            committed_units: BTreeMap::from([(ResourceType::Compute, 40)]),
            ..RoundMetrics::default()
        });
        registry.record_round(RoundMetrics {
            round: 1,
            committed_units: BTreeMap::from([(ResourceType::Compute, 25)]),
            ..RoundMetrics::default()
        });
        assert_eq!(registry.total_committed()[&ResourceType::Compute], 65);
        assert_eq!(registry.rounds().len(), 2);
    }
}
