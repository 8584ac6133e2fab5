//! Resource kinds and the capacity pool
//!
//! The pool tracks, per resource kind, how much capacity exists and how
//! much is currently reserved. Arbitrators read `available`; only the
//! transaction manager moves `reserved`.
//!
//! # Critical Invariants
//!
//! - `0 <= reserved <= capacity` for every resource
//! - `release(allocate(q)) = identity`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Closed enumeration of resource kinds.
///
/// Display strings are metadata only; ordering (declaration order) is the
/// canonical iteration order throughout the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Compute,
    Memory,
    Storage,
    Network,
    Dataset,
    ApiCredits,
}

impl ResourceType {
    /// All resource kinds in canonical order.
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Compute,
        ResourceType::Memory,
        ResourceType::Storage,
        ResourceType::Network,
        ResourceType::Dataset,
        ResourceType::ApiCredits,
    ];

    /// Stable lowercase name, used in events and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Compute => "compute",
            ResourceType::Memory => "memory",
            ResourceType::Storage => "storage",
            ResourceType::Network => "network",
            ResourceType::Dataset => "dataset",
            ResourceType::ApiCredits => "api_credits",
        }
    }

    /// Position in [`ResourceType::ALL`]; used for arena-style indexing.
    pub fn index(&self) -> usize {
        match self {
            ResourceType::Compute => 0,
            ResourceType::Memory => 1,
            ResourceType::Storage => 2,
            ResourceType::Network => 3,
            ResourceType::Dataset => 4,
            ResourceType::ApiCredits => 5,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from pool operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("insufficient capacity for {resource}: requested {requested}, available {available}")]
    InsufficientCapacity {
        resource: ResourceType,
        requested: u64,
        available: u64,
    },

    #[error("cannot release {requested} units of {resource}: only {reserved} reserved")]
    ReleaseExceedsReserved {
        resource: ResourceType,
        requested: u64,
        reserved: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct PoolEntry {
    capacity: u64,
    reserved: u64,
}

/// Finite pool of resources shared by all agents in a session.
///
/// # Example
/// ```
/// use arbitration_core::{ResourcePool, ResourceType};
/// use std::collections::BTreeMap;
///
/// let mut pool = ResourcePool::new(BTreeMap::from([
///     (ResourceType::Compute, 100),
///     (ResourceType::Memory, 64),
/// ]));
///
/// pool.allocate(ResourceType::Compute, 40).unwrap();
/// assert_eq!(pool.available(ResourceType::Compute), 60);
///
/// pool.release(ResourceType::Compute, 40).unwrap();
/// assert_eq!(pool.available(ResourceType::Compute), 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    entries: BTreeMap<ResourceType, PoolEntry>,
}

impl ResourcePool {
    /// Create a pool with the given capacities and nothing reserved.
    pub fn new(capacities: BTreeMap<ResourceType, u64>) -> Self {
        let entries = capacities
            .into_iter()
            .map(|(resource, capacity)| {
                (
                    resource,
                    PoolEntry {
                        capacity,
                        reserved: 0,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Total capacity for a resource (0 if the pool does not carry it).
    pub fn capacity(&self, resource: ResourceType) -> u64 {
        self.entries.get(&resource).map_or(0, |e| e.capacity)
    }

    /// Currently reserved quantity.
    pub fn reserved(&self, resource: ResourceType) -> u64 {
        self.entries.get(&resource).map_or(0, |e| e.reserved)
    }

    /// Unreserved quantity: `capacity - reserved`.
    pub fn available(&self, resource: ResourceType) -> u64 {
        self.entries
            .get(&resource)
            .map_or(0, |e| e.capacity - e.reserved)
    }

    /// Fraction of capacity currently reserved, in [0, 1].
    ///
    /// This is the scarcity signal used by the priority economy's
    /// release-earnings formula.
    pub fn utilization(&self, resource: ResourceType) -> f64 {
        match self.entries.get(&resource) {
            Some(e) if e.capacity > 0 => e.reserved as f64 / e.capacity as f64,
            _ => 0.0,
        }
    }

    /// Resource kinds this pool carries, in canonical order.
    pub fn resource_types(&self) -> Vec<ResourceType> {
        self.entries.keys().copied().collect()
    }

    /// Reserve `quantity` units of `resource`.
    ///
    /// Fails without mutating anything if fewer than `quantity` units are
    /// available.
    pub fn allocate(&mut self, resource: ResourceType, quantity: u64) -> Result<(), PoolError> {
        let available = self.available(resource);
        if quantity > available {
            return Err(PoolError::InsufficientCapacity {
                resource,
                requested: quantity,
                available,
            });
        }
        if quantity == 0 {
            return Ok(());
        }
        // Entry must exist: available > 0 implies presence.
        let entry = self
            .entries
            .get_mut(&resource)
            .ok_or(PoolError::InsufficientCapacity {
                resource,
                requested: quantity,
                available: 0,
            })?;
        entry.reserved += quantity;
        Ok(())
    }

    /// Return `quantity` units of `resource` to the pool.
    pub fn release(&mut self, resource: ResourceType, quantity: u64) -> Result<(), PoolError> {
        let reserved = self.reserved(resource);
        if quantity > reserved {
            return Err(PoolError::ReleaseExceedsReserved {
                resource,
                requested: quantity,
                reserved,
            });
        }
        if quantity == 0 {
            return Ok(());
        }
        if let Some(entry) = self.entries.get_mut(&resource) {
            entry.reserved -= quantity;
        }
        Ok(())
    }

    /// Zero all reservations, keeping capacities.
    pub fn reset(&mut self) {
        for entry in self.entries.values_mut() {
            entry.reserved = 0;
        }
    }

    /// Sum of reserved quantities across all resources.
    pub fn total_reserved(&self) -> u64 {
        self.entries.values().map(|e| e.reserved).sum()
    }
}
