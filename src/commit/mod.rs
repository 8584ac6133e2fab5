//! Transactional commit of arbitration results
//!
//! The only place in the engine where the pool and agent allocations are
//! written. Every check runs before any mutation, so a rejected commit
//! leaves no partial state; a successful commit reserves pool units,
//! debits burns, and writes each agent's current allocation in one
//! critical section (guaranteed by the `&mut` borrows it takes).
//!
//! # Critical Invariants
//!
//! - **Atomicity**: all mutations happen, or none do
//! - **Bounds**: every committed allocation is within `[min, ideal]`
//! - **Capacity**: per-resource totals never exceed availability
//! - **Conservation**: rollback of a receipt restores the exact
//!   pre-commit state

use crate::arbitration::JointAllocationResult;
use crate::economy::PriorityEconomy;
use crate::models::agent::Agent;
use crate::models::resource::{PoolError, ResourcePool, ResourceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Reasons a commit is rejected. Nothing is mutated when these surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("unknown agent '{agent}' in result")]
    UnknownAgent { agent: String },

    #[error(
        "allocation of {amount} {resource} for '{agent}' outside bounds [{min}, {ideal}]"
    )]
    OutOfBounds {
        agent: String,
        resource: ResourceType,
        amount: u64,
        min: u64,
        ideal: u64,
    },

    #[error("capacity exceeded for {resource}: allocating {requested}, available {available}")]
    CapacityExceeded {
        resource: ResourceType,
        requested: u64,
        available: u64,
    },

    #[error("burn of {burn_mc} mc exceeds headroom {headroom_mc} mc for '{agent}'")]
    BurnExceedsBalance {
        agent: String,
        burn_mc: i64,
        headroom_mc: i64,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Record of a successful commit, sufficient to roll it back exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub allocations: BTreeMap<String, BTreeMap<ResourceType, u64>>,
    pub burns_mc: BTreeMap<String, i64>,
}

impl CommitReceipt {
    /// Total units committed per resource.
    pub fn total_units(&self) -> BTreeMap<ResourceType, u64> {
        let mut totals = BTreeMap::new();
        for per_agent in self.allocations.values() {
            for (resource, units) in per_agent {
                *totals.entry(*resource).or_insert(0) += units;
            }
        }
        totals
    }

    /// Total millicredits burned.
    pub fn total_burned_mc(&self) -> i64 {
        self.burns_mc.values().sum()
    }
}

/// Serialized, atomic application of joint results.
///
/// Stateless: exclusivity comes from the `&mut` borrows of the pool and
/// agent map, so two commits can never interleave within a session and
/// parallel sessions must own disjoint pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionManager;

impl TransactionManager {
    pub fn new() -> Self {
        Self
    }

    /// Verify and apply a joint result.
    ///
    /// Checks, in order: agents exist; allocations within `[min,
    /// ideal]`; per-resource totals within pool availability; burns
    /// within balance headroom. Only after all checks pass does any
    /// state move.
    pub fn commit(
        &self,
        pool: &mut ResourcePool,
        agents: &mut BTreeMap<String, Agent>,
        economy: &mut PriorityEconomy,
        result: &JointAllocationResult,
    ) -> Result<CommitReceipt, CommitError> {
        // Phase 1: validate everything against current state.
        let mut per_resource: BTreeMap<ResourceType, u64> = BTreeMap::new();
        for (agent_id, units) in &result.allocations {
            let agent = agents
                .get(agent_id)
                .ok_or_else(|| CommitError::UnknownAgent {
                    agent: agent_id.clone(),
                })?;
            for (resource, amount) in units {
                let request = agent.request(*resource);
                if *amount < request.min || *amount > request.ideal {
                    return Err(CommitError::OutOfBounds {
                        agent: agent_id.clone(),
                        resource: *resource,
                        amount: *amount,
                        min: request.min,
                        ideal: request.ideal,
                    });
                }
                *per_resource.entry(*resource).or_insert(0) += amount;
            }
        }
        for (resource, requested) in &per_resource {
            let available = pool.available(*resource);
            if *requested > available {
                return Err(CommitError::CapacityExceeded {
                    resource: *resource,
                    requested: *requested,
                    available,
                });
            }
        }
        for (agent_id, burn_mc) in &result.burns_mc {
            let agent = agents
                .get(agent_id)
                .ok_or_else(|| CommitError::UnknownAgent {
                    agent: agent_id.clone(),
                })?;
            let headroom = agent.balance_mc() - economy.min_balance_mc();
            if *burn_mc < 0 || *burn_mc > headroom {
                return Err(CommitError::BurnExceedsBalance {
                    agent: agent_id.clone(),
                    burn_mc: *burn_mc,
                    headroom_mc: headroom,
                });
            }
        }

        // Phase 2: apply. Checks above make each step infallible; the
        // pool loop still unwinds defensively if an allocate refuses.
        let mut reserved: Vec<(ResourceType, u64)> = Vec::new();
        for (resource, requested) in &per_resource {
            if let Err(err) = pool.allocate(*resource, *requested) {
                for (r, q) in reserved {
                    let _ = pool.release(r, q);
                }
                return Err(err.into());
            }
            reserved.push((*resource, *requested));
        }

        for (agent_id, units) in &result.allocations {
            let agent = agents.get_mut(agent_id).expect("validated above");
            agent.set_allocation(units.clone());
        }
        for (agent_id, burn_mc) in &result.burns_mc {
            if *burn_mc == 0 {
                continue;
            }
            let agent = agents.get_mut(agent_id).expect("validated above");
            economy
                .burn(agent, *burn_mc)
                .expect("headroom validated above");
        }

        let receipt = CommitReceipt {
            allocations: result.allocations.clone(),
            burns_mc: result.burns_mc.clone(),
        };
        info!(
            agents = receipt.allocations.len(),
            burned_mc = receipt.total_burned_mc(),
            "allocation committed"
        );
        Ok(receipt)
    }

    /// Undo a previously committed receipt: release the pool units,
    /// refund the burns, clear the written allocations.
    pub fn rollback(
        &self,
        pool: &mut ResourcePool,
        agents: &mut BTreeMap<String, Agent>,
        economy: &PriorityEconomy,
        receipt: &CommitReceipt,
    ) -> Result<(), CommitError> {
        for (resource, units) in receipt.total_units() {
            pool.release(resource, units)?;
        }
        for (agent_id, units) in &receipt.allocations {
            if let Some(agent) = agents.get_mut(agent_id) {
                for (resource, amount) in units {
                    agent.reduce_allocation(*resource, *amount);
                }
            }
        }
        for (agent_id, burn_mc) in &receipt.burns_mc {
            if let Some(agent) = agents.get_mut(agent_id) {
                economy
                    .refund(agent, *burn_mc)
                    .expect("refund amounts are non-negative");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitration::SolverKind;
    use crate::core::config::ArbitrationConfig;
    use crate::models::request::ResourceRequest;

    fn fixture() -> (
        ResourcePool,
        BTreeMap<String, Agent>,
        PriorityEconomy,
        JointAllocationResult,
    ) {
        let pool = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 100)]));
        let agent = Agent::new(
            "a".to_string(),
            "a".to_string(),
            BTreeMap::from([(ResourceType::Compute, 1.0)]),
            BTreeMap::from([(ResourceType::Compute, ResourceRequest::new(10, 60))]),
            5_000,
        );
        let agents = BTreeMap::from([("a".to_string(), agent)]);
        let economy = PriorityEconomy::new(&ArbitrationConfig::default());
        let result = JointAllocationResult {
            allocations: BTreeMap::from([(
                "a".to_string(),
                BTreeMap::from([(ResourceType::Compute, 40u64)]),
            )]),
            burns_mc: BTreeMap::from([("a".to_string(), 2_000i64)]),
            objective: 0.0,
            feasible: true,
            solver: SolverKind::WaterFilling,
            converged: true,
            timed_out: false,
            elapsed_ms: 0,
        };
        (pool, agents, economy, result)
    }

    #[test]
    fn test_commit_applies_all_state() {
        let (mut pool, mut agents, mut economy, result) = fixture();
        let manager = TransactionManager::new();
        let receipt = manager
            .commit(&mut pool, &mut agents, &mut economy, &result)
            .unwrap();

        assert_eq!(pool.reserved(ResourceType::Compute), 40);
        assert_eq!(agents["a"].allocated(ResourceType::Compute), 40);
        assert_eq!(agents["a"].balance_mc(), 3_000);
        assert_eq!(economy.total_burned_mc(), 2_000);
        assert_eq!(receipt.total_units()[&ResourceType::Compute], 40);
    }

    #[test]
    fn test_out_of_bounds_rejected_without_mutation() {
        let (mut pool, mut agents, mut economy, mut result) = fixture();
        result
            .allocations
            .get_mut("a")
            .unwrap()
            .insert(ResourceType::Compute, 70); // ideal is 60
        let manager = TransactionManager::new();
        let err = manager
            .commit(&mut pool, &mut agents, &mut economy, &result)
            .unwrap_err();
        assert!(matches!(err, CommitError::OutOfBounds { .. }));
        assert_eq!(pool.reserved(ResourceType::Compute), 0);
        assert_eq!(agents["a"].balance_mc(), 5_000);
    }

    #[test]
    fn test_capacity_rejection() {
        let (mut pool, mut agents, mut economy, result) = fixture();
        pool.allocate(ResourceType::Compute, 70).unwrap();
        let manager = TransactionManager::new();
        let err = manager
            .commit(&mut pool, &mut agents, &mut economy, &result)
            .unwrap_err();
        assert!(matches!(err, CommitError::CapacityExceeded { .. }));
        assert_eq!(pool.reserved(ResourceType::Compute), 70);
    }

    #[test]
    fn test_burn_exceeding_headroom_rejected() {
        let (mut pool, mut agents, mut economy, mut result) = fixture();
        result.burns_mc.insert("a".to_string(), 9_000);
        let manager = TransactionManager::new();
        let err = manager
            .commit(&mut pool, &mut agents, &mut economy, &result)
            .unwrap_err();
        assert!(matches!(err, CommitError::BurnExceedsBalance { .. }));
        assert_eq!(agents["a"].balance_mc(), 5_000);
    }

    #[test]
    fn test_rollback_restores_pre_commit_state() {
        let (mut pool, mut agents, mut economy, result) = fixture();
        let manager = TransactionManager::new();
        let receipt = manager
            .commit(&mut pool, &mut agents, &mut economy, &result)
            .unwrap();
        manager
            .rollback(&mut pool, &mut agents, &economy, &receipt)
            .unwrap();

        assert_eq!(pool.reserved(ResourceType::Compute), 0);
        assert_eq!(agents["a"].allocated(ResourceType::Compute), 0);
        assert_eq!(agents["a"].balance_mc(), 5_000);
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let (mut pool, mut agents, mut economy, mut result) = fixture();
        result.allocations.insert(
            "ghost".to_string(),
            BTreeMap::from([(ResourceType::Compute, 1u64)]),
        );
        let manager = TransactionManager::new();
        let err = manager
            .commit(&mut pool, &mut agents, &mut economy, &result)
            .unwrap_err();
        assert_eq!(
            err,
            CommitError::UnknownAgent {
                agent: "ghost".to_string()
            }
        );
    }
}
