//! Grouping policy
//!
//! Decides which agents must be optimized jointly. Connected components
//! of the contention graph form the baseline; the policy can shrink them
//! (k-hop limit), split them (max group size + split strategy), and veto
//! pairings (compatibility matrix).
//!
//! Groups are **resource-conserving**: each resource's availability is
//! partitioned across the groups that want it, so independently solved
//! groups can never jointly over-allocate.

use crate::contention::detector::{build_graph, ContentionGraph};
use crate::contention::split;
use crate::models::agent::Agent;
use crate::models::resource::{ResourcePool, ResourceType};
use crate::rng::XorShift64;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Which agent pairings may share a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CompatibilityMatrix {
    /// No restrictions.
    #[default]
    None,

    /// Only listed (unordered) pairs may share a group.
    Allowlist(BTreeSet<(String, String)>),

    /// Listed (unordered) pairs may never share a group.
    Blocklist(BTreeSet<(String, String)>),

    /// Agents may only group with agents of the same category; agents
    /// missing from the map form their own category.
    ByCategory(BTreeMap<String, String>),
}

impl CompatibilityMatrix {
    /// Whether agents `a` and `b` may share a group.
    pub fn allows(&self, a: &str, b: &str) -> bool {
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        match self {
            CompatibilityMatrix::None => true,
            CompatibilityMatrix::Allowlist(pairs) => pairs.contains(&key),
            CompatibilityMatrix::Blocklist(pairs) => !pairs.contains(&key),
            CompatibilityMatrix::ByCategory(categories) => {
                match (categories.get(a), categories.get(b)) {
                    (Some(ca), Some(cb)) => ca == cb,
                    _ => false,
                }
            }
        }
    }
}

/// How oversize components are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SplitStrategy {
    /// Cluster agents by normalized preference-weight vectors.
    #[default]
    ResourceAffinity,

    /// Cut the fewest shared-resource edges (approximate Stoer–Wagner).
    MinCut,

    /// Sort by currency balance and slice.
    PriorityClustering,
}

/// Grouping policy knobs. All optional; the default is one group per
/// connected component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroupingPolicy {
    /// BFS radius in the agent–agent contention graph; `None` means the
    /// full connected component.
    pub k_hop_limit: Option<u32>,

    /// Components larger than this are split via `split_strategy`.
    pub max_group_size: Option<u32>,

    /// Pairing restrictions applied before grouping.
    pub compatibility: CompatibilityMatrix,

    /// How oversize components are split.
    pub split_strategy: SplitStrategy,
}

/// A set of agents whose allocations are co-decided, with its partitioned
/// share of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentionGroup {
    /// Member agent ids, sorted.
    pub agent_ids: Vec<String>,

    /// Resources any member requests (`ideal > 0`).
    pub resources: BTreeSet<ResourceType>,

    /// This group's share of each resource's availability.
    pub share: BTreeMap<ResourceType, u64>,
}

impl ContentionGroup {
    /// Sum of member minimum demands for a resource.
    pub fn min_demand(&self, agents: &[Agent], resource: ResourceType) -> u64 {
        self.agent_ids
            .iter()
            .filter_map(|id| agents.iter().find(|a| a.id() == id))
            .map(|a| a.request(resource).min)
            .sum()
    }
}

/// Form resource-conserving contention groups.
///
/// Pipeline: contention graph → k-hop components → oversize splitting →
/// pool-share partition. Deterministic for fixed inputs and seed.
pub fn form_groups(
    agents: &[Agent],
    pool: &ResourcePool,
    policy: &GroupingPolicy,
    seed: u64,
) -> Vec<ContentionGroup> {
    let graph = build_graph(agents, pool, &policy.compatibility);
    let mut rng = XorShift64::new(seed);

    let mut member_sets = components(&graph, policy.k_hop_limit);

    if let Some(max) = policy.max_group_size {
        let max = (max as usize).max(1);
        let mut split_sets = Vec::new();
        for members in member_sets {
            if members.len() <= max {
                split_sets.push(members);
            } else {
                split_sets.extend(split::split_oversize(
                    &graph,
                    members,
                    max,
                    policy.split_strategy,
                    agents,
                    &mut rng,
                ));
            }
        }
        member_sets = split_sets;
    }

    let mut groups: Vec<ContentionGroup> = member_sets
        .into_iter()
        .map(|members| {
            let mut agent_ids: Vec<String> = members
                .iter()
                .map(|&node| graph.agent_id(node).to_string())
                .collect();
            agent_ids.sort();
            let resources = agent_ids
                .iter()
                .filter_map(|id| agents.iter().find(|a| a.id() == id))
                .flat_map(|a| a.wanted_resources())
                .collect();
            ContentionGroup {
                agent_ids,
                resources,
                share: BTreeMap::new(),
            }
        })
        .collect();

    // Stable group order: by first member id.
    groups.sort_by(|a, b| a.agent_ids.cmp(&b.agent_ids));

    partition_shares(agents, pool, &mut groups);
    groups
}

/// Connected components via BFS, optionally truncated at `k` hops from
/// each component's lowest-index seed. Remaining nodes seed new groups.
fn components(graph: &ContentionGraph, k_hop_limit: Option<u32>) -> Vec<Vec<usize>> {
    let n = graph.node_count();
    let mut assigned = vec![false; n];
    let mut result = Vec::new();

    for seed in 0..n {
        if assigned[seed] {
            continue;
        }
        let mut members = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((seed, 0u32));
        assigned[seed] = true;
        while let Some((node, depth)) = queue.pop_front() {
            members.push(node);
            if let Some(limit) = k_hop_limit {
                if depth >= limit {
                    continue;
                }
            }
            for &next in graph.neighbors(node) {
                if !assigned[next] {
                    assigned[next] = true;
                    queue.push_back((next, depth + 1));
                }
            }
        }
        members.sort_unstable();
        result.push(members);
    }
    result
}

/// Partition each resource's availability across the groups that want it.
///
/// Groups whose ideal demand fits alongside everyone else's simply get
/// their ideal. Under over-subscription each group is floored at its
/// minimum demand and the rest is divided in proportion to ideal demand.
/// `Σ share(r) ≤ available(r)` always holds.
fn partition_shares(agents: &[Agent], pool: &ResourcePool, groups: &mut [ContentionGroup]) {
    let all_resources: BTreeSet<ResourceType> = groups
        .iter()
        .flat_map(|g| g.resources.iter().copied())
        .collect();

    for resource in all_resources {
        let wanting: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.resources.contains(&resource))
            .map(|(i, _)| i)
            .collect();
        if wanting.is_empty() {
            continue;
        }

        let demands: Vec<(u64, u64)> = wanting
            .iter()
            .map(|&i| {
                let group = &groups[i];
                let min: u64 = group.min_demand(agents, resource);
                let ideal: u64 = group
                    .agent_ids
                    .iter()
                    .filter_map(|id| agents.iter().find(|a| a.id() == id))
                    .map(|a| a.request(resource).ideal)
                    .sum();
                (min, ideal)
            })
            .collect();

        let shares = partition_capacity(pool.available(resource), &demands);
        for (&i, share) in wanting.iter().zip(shares) {
            groups[i].share.insert(resource, share);
        }
    }
}

/// Divide `available` units among demands `(min, ideal)`:
/// - everything fits → everyone gets ideal,
/// - minimums alone do not fit → proportional to minimums (downstream
///   solves will report infeasibility),
/// - otherwise → floor at minimums, surplus proportional to ideal demand.
///
/// Integer shares via largest remainder; the sum never exceeds
/// `available`.
pub(crate) fn partition_capacity(available: u64, demands: &[(u64, u64)]) -> Vec<u64> {
    let n = demands.len();
    if n == 0 {
        return Vec::new();
    }
    let total_ideal: u64 = demands.iter().map(|d| d.1).sum();
    if total_ideal <= available {
        return demands.iter().map(|d| d.1).collect();
    }
    let total_min: u64 = demands.iter().map(|d| d.0).sum();
    if total_min > available {
        let weights: Vec<f64> = demands.iter().map(|d| d.0 as f64).collect();
        let caps = vec![u64::MAX; n];
        return largest_remainder(available, &weights, &caps);
    }

    // Bounded proportional fill: iteratively fix groups whose
    // proportional target falls outside [min, ideal].
    let mut fixed: Vec<Option<u64>> = vec![None; n];
    loop {
        let fixed_total: u64 = fixed.iter().flatten().sum();
        let remaining = available.saturating_sub(fixed_total);
        let active: Vec<usize> = (0..n).filter(|&i| fixed[i].is_none()).collect();
        if active.is_empty() {
            break;
        }
        let active_ideal: f64 = active.iter().map(|&i| demands[i].1 as f64).sum();
        if active_ideal <= 0.0 {
            for &i in &active {
                fixed[i] = Some(0);
            }
            break;
        }
        let mut changed = false;
        for &i in &active {
            let target = remaining as f64 * demands[i].1 as f64 / active_ideal;
            if target < demands[i].0 as f64 {
                fixed[i] = Some(demands[i].0);
                changed = true;
            } else if target > demands[i].1 as f64 {
                fixed[i] = Some(demands[i].1);
                changed = true;
            }
        }
        if !changed {
            // Round the active targets to integers summing to remaining.
            let weights: Vec<f64> = active.iter().map(|&i| demands[i].1 as f64).collect();
            let caps: Vec<u64> = active.iter().map(|&i| demands[i].1).collect();
            let rounded = largest_remainder(remaining, &weights, &caps);
            for (&i, share) in active.iter().zip(rounded) {
                fixed[i] = Some(share.max(demands[i].0));
            }
            break;
        }
    }
    fixed.into_iter().map(|s| s.unwrap_or(0)).collect()
}

/// Distribute `total` integer units proportionally to `weights`, capped
/// per entry, by the largest-remainder method. Ties break by index.
fn largest_remainder(total: u64, weights: &[f64], caps: &[u64]) -> Vec<u64> {
    let weight_sum: f64 = weights.iter().sum();
    let n = weights.len();
    if weight_sum <= 0.0 || total == 0 {
        return vec![0; n];
    }
    let targets: Vec<f64> = weights
        .iter()
        .map(|w| total as f64 * w / weight_sum)
        .collect();
    let mut shares: Vec<u64> = targets
        .iter()
        .zip(caps)
        .map(|(t, cap)| (t.floor() as u64).min(*cap))
        .collect();
    let mut leftover = total.saturating_sub(shares.iter().sum());

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let fa = targets[a] - targets[a].floor();
        let fb = targets[b] - targets[b].floor();
        fb.partial_cmp(&fa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    while leftover > 0 {
        let mut placed = false;
        for &i in &order {
            if leftover == 0 {
                break;
            }
            if shares[i] < caps[i] {
                shares[i] += 1;
                leftover -= 1;
                placed = true;
            }
        }
        if !placed {
            break;
        }
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::ResourceRequest;

    fn agent(id: &str, min: u64, ideal: u64) -> Agent {
        Agent::new(
            id.to_string(),
            id.to_string(),
            BTreeMap::from([(ResourceType::Compute, 1.0)]),
            BTreeMap::from([(ResourceType::Compute, ResourceRequest::new(min, ideal))]),
            0,
        )
    }

    #[test]
    fn test_partition_fits_everyone_at_ideal() {
        assert_eq!(partition_capacity(100, &[(10, 40), (5, 30)]), vec![40, 30]);
    }

    #[test]
    fn test_partition_floors_at_minimums() {
        // Ideal demand 160 over 100 available; group 2's proportional
        // share would fall below its minimum of 35.
        let shares = partition_capacity(100, &[(10, 120), (35, 40)]);
        assert!(shares[1] >= 35);
        assert!(shares.iter().sum::<u64>() <= 100);
    }

    #[test]
    fn test_partition_conserves_under_infeasible_minimums() {
        let shares = partition_capacity(50, &[(40, 80), (40, 80)]);
        assert!(shares.iter().sum::<u64>() <= 50);
    }

    #[test]
    fn test_compatibility_matrix_normalizes_pair_order() {
        let matrix = CompatibilityMatrix::Allowlist(
            [("a".to_string(), "b".to_string())].into_iter().collect(),
        );
        assert!(matrix.allows("a", "b"));
        assert!(matrix.allows("b", "a"));
        assert!(!matrix.allows("a", "c"));
    }

    #[test]
    fn test_by_category_requires_same_category() {
        let matrix = CompatibilityMatrix::ByCategory(BTreeMap::from([
            ("a".to_string(), "red".to_string()),
            ("b".to_string(), "red".to_string()),
            ("c".to_string(), "blue".to_string()),
        ]));
        assert!(matrix.allows("a", "b"));
        assert!(!matrix.allows("a", "c"));
        assert!(!matrix.allows("a", "unknown"));
    }

    #[test]
    fn test_form_groups_shares_conserve_pool() {
        let pool = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 100)]));
        let agents: Vec<Agent> = (0..6)
            .map(|i| agent(&format!("a{}", i), 5, 40))
            .collect();
        let policy = GroupingPolicy {
            max_group_size: Some(2),
            split_strategy: SplitStrategy::PriorityClustering,
            ..GroupingPolicy::default()
        };
        let groups = form_groups(&agents, &pool, &policy, 1);
        assert!(groups.iter().all(|g| g.agent_ids.len() <= 2));
        let total: u64 = groups
            .iter()
            .map(|g| g.share.get(&ResourceType::Compute).copied().unwrap_or(0))
            .sum();
        assert!(total <= 100);
        // Every group's share covers its member minimums.
        for group in &groups {
            let min: u64 = group.min_demand(&agents, ResourceType::Compute);
            assert!(group.share[&ResourceType::Compute] >= min);
        }
    }

    #[test]
    fn test_k_hop_limits_component_radius() {
        // Four agents form a contention clique; radius 0 cuts every
        // edge off at the seed.
        let pool = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 10)]));
        let agents: Vec<Agent> = (0..4)
            .map(|i| agent(&format!("a{}", i), 0, 10))
            .collect();
        let policy = GroupingPolicy {
            k_hop_limit: Some(0),
            ..GroupingPolicy::default()
        };
        let groups = form_groups(&agents, &pool, &policy, 1);
        // Radius 0: every agent is its own group.
        assert_eq!(groups.len(), 4);
    }
}
