//! Agent model
//!
//! An agent competes for pool resources with:
//! - preference weights over resource kinds (sum ≈ 1 by convention),
//! - per-resource `(min, ideal)` bounded requests,
//! - a currency balance used to buy priority,
//! - a utility function over allocations (defaults to linear).
//!
//! CRITICAL: All currency values are i64 (millicredits)

use crate::models::request::{RequestMap, ResourceRequest};
use crate::models::resource::ResourceType;
use crate::utility::UtilityFunction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from agent balance operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("debit of {debit} mc would drop balance {balance} mc below minimum {minimum} mc")]
    BalanceBelowMinimum {
        balance: i64,
        debit: i64,
        minimum: i64,
    },

    #[error("currency amount must be non-negative, got {amount} mc")]
    NegativeAmount { amount: i64 },
}

/// A competing agent.
///
/// Arbitrators read an agent's requests, weights and balance; only the
/// transaction manager writes its allocation, and only the priority
/// economy moves its balance.
///
/// # Example
/// ```
/// use arbitration_core::{Agent, ResourceRequest, ResourceType};
/// use std::collections::BTreeMap;
///
/// let agent = Agent::new(
///     "planner-1".to_string(),
///     "Planner".to_string(),
///     BTreeMap::from([(ResourceType::Compute, 1.0)]),
///     BTreeMap::from([(ResourceType::Compute, ResourceRequest::new(40, 80))]),
///     5_000,
/// );
/// assert_eq!(agent.balance_mc(), 5_000);
/// assert_eq!(agent.request(ResourceType::Compute).ideal, 80);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique, stable identity.
    id: String,

    /// Human-readable name (metadata only).
    display_name: String,

    /// Preference weights per resource; all ≥ 0, sum ≈ 1 by convention.
    weights: BTreeMap<ResourceType, f64>,

    /// Bounded request per resource.
    requests: RequestMap,

    /// Currency balance in millicredits.
    balance_mc: i64,

    /// Allocation currently held, written by commit.
    current_allocation: BTreeMap<ResourceType, u64>,

    /// Utility over allocations; linear over `weights` unless overridden.
    utility: UtilityFunction,
}

impl Agent {
    /// Create an agent with a linear utility derived from its weights.
    ///
    /// # Panics
    /// Panics if `balance_mc` is negative or any weight is negative.
    /// Request bounds are asserted by [`ResourceRequest::new`]; weight-sum
    /// conventions are checked by validation, not here.
    pub fn new(
        id: String,
        display_name: String,
        weights: BTreeMap<ResourceType, f64>,
        requests: RequestMap,
        balance_mc: i64,
    ) -> Self {
        assert!(balance_mc >= 0, "balance must be non-negative");
        assert!(
            weights.values().all(|w| *w >= 0.0),
            "weights must be non-negative"
        );
        let utility = UtilityFunction::Linear {
            weights: weights.clone(),
        };
        Self {
            id,
            display_name,
            weights,
            requests,
            balance_mc,
            current_allocation: BTreeMap::new(),
            utility,
        }
    }

    /// Override the utility function (builder pattern).
    pub fn with_utility(mut self, utility: UtilityFunction) -> Self {
        self.utility = utility;
        self
    }

    /// Agent id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// All preference weights.
    pub fn weights(&self) -> &BTreeMap<ResourceType, f64> {
        &self.weights
    }

    /// Preference weight for one resource (0 when absent).
    pub fn weight(&self, resource: ResourceType) -> f64 {
        self.weights.get(&resource).copied().unwrap_or(0.0)
    }

    /// All bounded requests.
    pub fn requests(&self) -> &RequestMap {
        &self.requests
    }

    /// Request for one resource; `(0, 0)` when the agent never asked.
    pub fn request(&self, resource: ResourceType) -> ResourceRequest {
        self.requests
            .get(&resource)
            .copied()
            .unwrap_or(ResourceRequest { min: 0, ideal: 0 })
    }

    /// Resources this agent actually wants (`ideal > 0`), canonical order.
    pub fn wanted_resources(&self) -> Vec<ResourceType> {
        self.requests
            .iter()
            .filter(|(_, r)| r.ideal > 0)
            .map(|(t, _)| *t)
            .collect()
    }

    /// Sum of ideal demands across all resources.
    pub fn total_ideal(&self) -> u64 {
        self.requests.values().map(|r| r.ideal).sum()
    }

    /// Current balance (millicredits).
    pub fn balance_mc(&self) -> i64 {
        self.balance_mc
    }

    /// Current balance in credits.
    pub fn balance_credits(&self) -> f64 {
        self.balance_mc as f64 / 1000.0
    }

    /// Allocation currently held.
    pub fn current_allocation(&self) -> &BTreeMap<ResourceType, u64> {
        &self.current_allocation
    }

    /// Units currently held for one resource.
    pub fn allocated(&self, resource: ResourceType) -> u64 {
        self.current_allocation
            .get(&resource)
            .copied()
            .unwrap_or(0)
    }

    /// The agent's utility function.
    pub fn utility(&self) -> &UtilityFunction {
        &self.utility
    }

    /// Credit (increase) balance.
    pub fn credit(&mut self, amount_mc: i64) -> Result<(), AgentError> {
        if amount_mc < 0 {
            return Err(AgentError::NegativeAmount { amount: amount_mc });
        }
        self.balance_mc += amount_mc;
        Ok(())
    }

    /// Debit (decrease) balance, refusing to cross `floor_mc`.
    pub fn debit(&mut self, amount_mc: i64, floor_mc: i64) -> Result<(), AgentError> {
        if amount_mc < 0 {
            return Err(AgentError::NegativeAmount { amount: amount_mc });
        }
        if self.balance_mc - amount_mc < floor_mc {
            return Err(AgentError::BalanceBelowMinimum {
                balance: self.balance_mc,
                debit: amount_mc,
                minimum: floor_mc,
            });
        }
        self.balance_mc -= amount_mc;
        Ok(())
    }

    /// Overwrite the held allocation. Called by the transaction manager
    /// on commit; not part of the public mutation surface.
    pub(crate) fn set_allocation(&mut self, allocation: BTreeMap<ResourceType, u64>) {
        self.current_allocation = allocation;
    }

    /// Reduce the held allocation for one resource by `quantity`,
    /// saturating at zero. Called on release.
    pub(crate) fn reduce_allocation(&mut self, resource: ResourceType, quantity: u64) {
        if let Some(held) = self.current_allocation.get_mut(&resource) {
            *held = held.saturating_sub(quantity);
            if *held == 0 {
                self.current_allocation.remove(&resource);
            }
        }
    }
}
