//! Engine configuration
//!
//! All tunable knobs live here, passed by reference into the components
//! that need them. There is no mutable global state: the base weight,
//! solver tolerances and safety thresholds are configuration values owned
//! by the session.

use serde::{Deserialize, Serialize};

/// Thresholds for the runtime emergence monitor.
///
/// Each score is compared against its threshold; the conjunction risk is
/// the count of scores at or above threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergenceThresholds {
    pub autonomy: f64,
    pub generality: f64,
    pub intelligence: f64,
}

impl Default for EmergenceThresholds {
    fn default() -> Self {
        Self {
            autonomy: 0.7,
            generality: 0.7,
            intelligence: 0.7,
        }
    }
}

/// Complete engine configuration
///
/// # Example
/// ```
/// use arbitration_core::ArbitrationConfig;
///
/// let config = ArbitrationConfig::default();
/// assert_eq!(config.base_weight, 10.0);
/// assert_eq!(config.embargo_window_ms, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationConfig {
    /// Additive weight every agent receives regardless of burn.
    ///
    /// Must be positive: this is what keeps zero-balance agents from
    /// starving (together with the log barrier in the welfare function).
    pub base_weight: f64,

    /// Floor on agent balances in millicredits. Burns that would drop a
    /// balance below this floor are rejected.
    pub min_balance_mc: i64,

    /// How long the embargo queue holds a batch before flushing (ms).
    pub embargo_window_ms: u64,

    /// Convergence tolerance for the projected-gradient solver.
    pub gradient_tol: f64,

    /// Duality-gap tolerance for the interior-point solver.
    pub ipm_tol: f64,

    /// Iteration cap for the gradient solver's outer loop.
    pub max_iterations: usize,

    /// Utility composition depth that triggers a validation warning.
    pub soft_composition_depth: u32,

    /// Utility composition depth that is rejected outright.
    pub hard_composition_depth: u32,

    /// Emergence monitor score thresholds.
    pub emergence: EmergenceThresholds,

    /// Millicredits earned per released unit at full scarcity and a full
    /// remaining-time fraction.
    pub release_rate_mc: f64,

    /// Upper bound on the earnings from a single release (millicredits).
    pub earnings_cap_mc: i64,

    /// Seed for the deterministic RNG used by cluster splitting.
    pub cluster_seed: u64,

    /// Demand/capacity ratio above which validation emits a warning.
    pub contention_warning_ratio: f64,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            base_weight: 10.0,
            min_balance_mc: 0,
            embargo_window_ms: 50,
            gradient_tol: 1e-6,
            ipm_tol: 1e-8,
            max_iterations: 1000,
            soft_composition_depth: 10,
            hard_composition_depth: 15,
            emergence: EmergenceThresholds::default(),
            release_rate_mc: 100.0,
            earnings_cap_mc: 50_000,
            cluster_seed: 0x5EED_0F_A1,
            contention_warning_ratio: 3.0,
        }
    }
}

impl ArbitrationConfig {
    /// Builder-style override of the base weight.
    pub fn with_base_weight(mut self, base_weight: f64) -> Self {
        assert!(base_weight > 0.0, "base_weight must be positive");
        self.base_weight = base_weight;
        self
    }

    /// Builder-style override of the embargo window.
    pub fn with_embargo_window_ms(mut self, window_ms: u64) -> Self {
        self.embargo_window_ms = window_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_knobs() {
        let config = ArbitrationConfig::default();
        assert_eq!(config.gradient_tol, 1e-6);
        assert_eq!(config.ipm_tol, 1e-8);
        assert_eq!(config.max_iterations, 1000);
        assert_eq!(config.soft_composition_depth, 10);
        assert_eq!(config.hard_composition_depth, 15);
        assert_eq!(config.emergence.autonomy, 0.7);
    }

    #[test]
    #[should_panic(expected = "base_weight must be positive")]
    fn test_zero_base_weight_panics() {
        ArbitrationConfig::default().with_base_weight(0.0);
    }
}
