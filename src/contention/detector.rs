//! Contention detection
//!
//! Builds the bipartite agent–resource picture: a resource is contended
//! when the aggregate ideal demand for it exceeds its capacity. Two
//! agents contend with each other when they share at least one contended
//! resource (and the compatibility matrix allows the pairing).
//!
//! The graph is an arena of small integer indices over a sorted agent
//! list — no pointer graph, no cyclic ownership.

use crate::contention::grouping::CompatibilityMatrix;
use crate::models::agent::Agent;
use crate::models::resource::{ResourcePool, ResourceType};
use std::collections::BTreeSet;

/// Snapshot of one over-subscribed resource, immutable for the duration
/// of a solve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contention {
    /// The contended resource.
    pub resource: ResourceType,

    /// Ids of agents with non-zero ideal demand, sorted.
    pub competitors: Vec<String>,

    /// Units available when the snapshot was taken.
    pub available: u64,

    /// Aggregate ideal demand across competitors.
    pub total_demand: u64,
}

/// Agent–agent contention graph over arena indices.
#[derive(Debug, Clone)]
pub struct ContentionGraph {
    /// Sorted agent ids; position is the node index.
    agent_ids: Vec<String>,

    /// Contended resources, canonical order.
    contended: Vec<ResourceType>,

    /// Per agent: the contended resources it wants.
    wants: Vec<BTreeSet<ResourceType>>,

    /// Sorted adjacency lists.
    adjacency: Vec<Vec<usize>>,
}

impl ContentionGraph {
    /// Number of agent nodes.
    pub fn node_count(&self) -> usize {
        self.agent_ids.len()
    }

    /// Agent id at a node index.
    pub fn agent_id(&self, node: usize) -> &str {
        &self.agent_ids[node]
    }

    /// Contended resources.
    pub fn contended(&self) -> &[ResourceType] {
        &self.contended
    }

    /// Neighbors of a node (sorted).
    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    /// Number of contended resources two agents share; edge weight for
    /// min-cut splitting.
    pub fn shared_weight(&self, a: usize, b: usize) -> u32 {
        self.wants[a].intersection(&self.wants[b]).count() as u32
    }
}

/// Detect all over-subscribed resources.
///
/// A resource is contended when `Σ ideal > capacity`. The snapshot
/// records current availability, so callers see both the structural
/// over-subscription and what is actually left to hand out.
pub fn detect_contentions(agents: &[Agent], pool: &ResourcePool) -> Vec<Contention> {
    let mut contentions = Vec::new();
    for resource in ResourceType::ALL {
        let capacity = pool.capacity(resource);
        if capacity == 0 {
            continue;
        }
        let mut competitors: Vec<String> = Vec::new();
        let mut total_demand: u64 = 0;
        for agent in agents {
            let ideal = agent.request(resource).ideal;
            if ideal > 0 {
                competitors.push(agent.id().to_string());
                total_demand += ideal;
            }
        }
        if total_demand > capacity {
            competitors.sort();
            contentions.push(Contention {
                resource,
                competitors,
                available: pool.available(resource),
                total_demand,
            });
        }
    }
    contentions
}

/// Build the agent–agent contention graph.
///
/// Agents are sorted by id to fix the arena order. An edge exists when
/// two agents want a common contended resource and the compatibility
/// matrix allows the pairing.
pub fn build_graph(
    agents: &[Agent],
    pool: &ResourcePool,
    matrix: &CompatibilityMatrix,
) -> ContentionGraph {
    let contended: Vec<ResourceType> = detect_contentions(agents, pool)
        .into_iter()
        .map(|c| c.resource)
        .collect();

    let mut agent_ids: Vec<String> = agents.iter().map(|a| a.id().to_string()).collect();
    agent_ids.sort();

    let wants: Vec<BTreeSet<ResourceType>> = agent_ids
        .iter()
        .map(|id| {
            let agent = agents
                .iter()
                .find(|a| a.id() == id)
                .expect("agent id came from the same slice");
            contended
                .iter()
                .copied()
                .filter(|r| agent.request(*r).ideal > 0)
                .collect()
        })
        .collect();

    let n = agent_ids.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for a in 0..n {
        for b in (a + 1)..n {
            if wants[a].intersection(&wants[b]).next().is_none() {
                continue;
            }
            if !matrix.allows(&agent_ids[a], &agent_ids[b]) {
                continue;
            }
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }

    ContentionGraph {
        agent_ids,
        contended,
        wants,
        adjacency,
    }
}
