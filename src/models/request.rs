//! Inbound request contracts
//!
//! These are the types a host (config loader, simulation harness) hands to
//! the session: per-resource bounded requests, the arbitration mechanism
//! selector, and the round-level arbitration request.

use crate::contention::grouping::GroupingPolicy;
use crate::models::resource::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bounded request for one resource: the agent needs at least `min` units
/// to function and gains nothing beyond `ideal`.
///
/// # Example
/// ```
/// use arbitration_core::ResourceRequest;
///
/// let req = ResourceRequest::new(40, 80);
/// assert_eq!(req.span(), 40);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Minimum acceptable allocation (individual-rationality floor).
    pub min: u64,

    /// Allocation beyond which the agent gains nothing.
    pub ideal: u64,
}

impl ResourceRequest {
    /// Create a request.
    ///
    /// # Panics
    /// Panics if `min > ideal`.
    pub fn new(min: u64, ideal: u64) -> Self {
        assert!(min <= ideal, "min must not exceed ideal");
        Self { min, ideal }
    }

    /// Width of the negotiable range.
    pub fn span(&self) -> u64 {
        self.ideal - self.min
    }
}

/// Which arbitrator family resolves a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mechanism {
    /// Per-resource weighted proportional fairness; weights come from
    /// currency burns only.
    ProportionalFairness,

    /// Per-resource water-filling with preference-scaled weights. Fast;
    /// cannot discover cross-resource trades.
    SequentialJoint,

    /// Projected gradient ascent on the joint log-welfare.
    GradientJoint,

    /// Interior-point solve of the convex reformulation, falling back to
    /// gradient ascent when utilities are not smooth-concave or the solve
    /// fails numerically.
    ConvexJoint,
}

/// One arbitration round's worth of input.
///
/// The pool is owned by the session; the request names the participating
/// agents (empty = every registered agent), the currency each is willing
/// to burn, and how groups are formed and solved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationRequest {
    /// Stable request identity, generated if the host does not supply one.
    pub id: String,

    /// Participating agent ids; empty means all registered agents.
    pub agent_ids: Vec<String>,

    /// Millicredits each agent burns for priority this round. Missing
    /// entries burn nothing.
    pub burns_mc: BTreeMap<String, i64>,

    /// How contention groups are formed.
    pub policy: GroupingPolicy,

    /// Which solver family resolves each group.
    pub mechanism: Mechanism,
}

impl ArbitrationRequest {
    /// Request covering all registered agents with no burns.
    pub fn new(mechanism: Mechanism) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_ids: Vec::new(),
            burns_mc: BTreeMap::new(),
            policy: GroupingPolicy::default(),
            mechanism,
        }
    }

    /// Builder-style burn entry.
    pub fn with_burn(mut self, agent_id: &str, burn_mc: i64) -> Self {
        self.burns_mc.insert(agent_id.to_string(), burn_mc);
        self
    }

    /// Builder-style grouping policy.
    pub fn with_policy(mut self, policy: GroupingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builder-style participant restriction.
    pub fn with_agents(mut self, agent_ids: Vec<String>) -> Self {
        self.agent_ids = agent_ids;
        self
    }

    /// Burn for one agent, defaulting to zero.
    pub fn burn_for(&self, agent_id: &str) -> i64 {
        self.burns_mc.get(agent_id).copied().unwrap_or(0)
    }
}

/// Map from resource to requested bounds, as used on [`crate::Agent`].
pub type RequestMap = BTreeMap<ResourceType, ResourceRequest>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "min must not exceed ideal")]
    fn test_inverted_bounds_panic() {
        ResourceRequest::new(10, 5);
    }

    #[test]
    fn test_burn_defaults_to_zero() {
        let req = ArbitrationRequest::new(Mechanism::ProportionalFairness).with_burn("a1", 500);
        assert_eq!(req.burn_for("a1"), 500);
        assert_eq!(req.burn_for("a2"), 0);
    }
}
