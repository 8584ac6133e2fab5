//! Oversize-group splitting strategies
//!
//! When a connected component exceeds the policy's maximum group size it
//! is split:
//! - `ResourceAffinity`: k-means over normalized preference-weight
//!   vectors (agents wanting the same things stay together),
//! - `MinCut`: recursive approximate Stoer–Wagner minimum cut, edge
//!   weights counting shared contended resources (cut the weakest
//!   coupling),
//! - `PriorityClustering`: sort by currency balance and slice (wealthy
//!   agents arbitrate against each other).
//!
//! All strategies are deterministic for a fixed seed.

use crate::contention::detector::ContentionGraph;
use crate::contention::grouping::SplitStrategy;
use crate::models::agent::Agent;
use crate::models::resource::ResourceType;
use crate::rng::XorShift64;

const KMEANS_MAX_ITERS: usize = 32;

/// Split `members` (node indices) into pieces of at most `max_size`.
pub(crate) fn split_oversize(
    graph: &ContentionGraph,
    members: Vec<usize>,
    max_size: usize,
    strategy: SplitStrategy,
    agents: &[Agent],
    rng: &mut XorShift64,
) -> Vec<Vec<usize>> {
    match strategy {
        SplitStrategy::PriorityClustering => priority_clustering(graph, members, max_size, agents),
        SplitStrategy::ResourceAffinity => resource_affinity(graph, members, max_size, agents, rng),
        SplitStrategy::MinCut => min_cut_split(graph, members, max_size),
    }
}

fn balance_of(graph: &ContentionGraph, agents: &[Agent], node: usize) -> i64 {
    agents
        .iter()
        .find(|a| a.id() == graph.agent_id(node))
        .map(|a| a.balance_mc())
        .unwrap_or(0)
}

/// Sort by balance (richest first, ties by id) and slice into chunks.
fn priority_clustering(
    graph: &ContentionGraph,
    mut members: Vec<usize>,
    max_size: usize,
    agents: &[Agent],
) -> Vec<Vec<usize>> {
    members.sort_by(|&a, &b| {
        balance_of(graph, agents, b)
            .cmp(&balance_of(graph, agents, a))
            .then(graph.agent_id(a).cmp(graph.agent_id(b)))
    });
    members
        .chunks(max_size)
        .map(|chunk| {
            let mut piece = chunk.to_vec();
            piece.sort_unstable();
            piece
        })
        .collect()
}

/// Normalized preference-weight vector over all resource kinds.
fn feature_vector(graph: &ContentionGraph, agents: &[Agent], node: usize) -> Vec<f64> {
    let agent = agents.iter().find(|a| a.id() == graph.agent_id(node));
    let raw: Vec<f64> = ResourceType::ALL
        .iter()
        .map(|r| agent.map(|a| a.weight(*r)).unwrap_or(0.0))
        .collect();
    let sum: f64 = raw.iter().sum();
    if sum > 0.0 {
        raw.into_iter().map(|w| w / sum).collect()
    } else {
        vec![1.0 / ResourceType::ALL.len() as f64; ResourceType::ALL.len()]
    }
}

fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// k-means over weight vectors with farthest-first seeding, then a
/// rebalance pass enforcing the size cap.
fn resource_affinity(
    graph: &ContentionGraph,
    members: Vec<usize>,
    max_size: usize,
    agents: &[Agent],
    rng: &mut XorShift64,
) -> Vec<Vec<usize>> {
    let n = members.len();
    let k = n.div_ceil(max_size);
    let features: Vec<Vec<f64>> = members
        .iter()
        .map(|&node| feature_vector(graph, agents, node))
        .collect();

    // Farthest-first seeding from a seeded random start.
    let mut centers: Vec<Vec<f64>> = Vec::with_capacity(k);
    centers.push(features[rng.next_below(n)].clone());
    while centers.len() < k {
        let mut best = 0;
        let mut best_dist = -1.0;
        for (i, f) in features.iter().enumerate() {
            let nearest = centers
                .iter()
                .map(|c| distance_sq(f, c))
                .fold(f64::INFINITY, f64::min);
            if nearest > best_dist {
                best_dist = nearest;
                best = i;
            }
        }
        centers.push(features[best].clone());
    }

    // Lloyd iterations.
    let mut assignment = vec![0usize; n];
    for _ in 0..KMEANS_MAX_ITERS {
        let mut changed = false;
        for (i, f) in features.iter().enumerate() {
            let mut nearest = 0;
            let mut nearest_dist = f64::INFINITY;
            for (c, center) in centers.iter().enumerate() {
                let d = distance_sq(f, center);
                if d < nearest_dist {
                    nearest_dist = d;
                    nearest = c;
                }
            }
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }
        for (c, center) in centers.iter_mut().enumerate() {
            let cluster: Vec<usize> = (0..n).filter(|&i| assignment[i] == c).collect();
            if cluster.is_empty() {
                continue;
            }
            for (d, slot) in center.iter_mut().enumerate() {
                *slot = cluster.iter().map(|&i| features[i][d]).sum::<f64>()
                    / cluster.len() as f64;
            }
        }
        if !changed {
            break;
        }
    }

    // Enforce the size cap: move the members farthest from their own
    // centroid into the nearest cluster with room.
    let mut clusters: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &c) in assignment.iter().enumerate() {
        clusters[c].push(i);
    }
    loop {
        let Some(over) = (0..k).find(|&c| clusters[c].len() > max_size) else {
            break;
        };
        let &worst = clusters[over]
            .iter()
            .max_by(|&&a, &&b| {
                distance_sq(&features[a], &centers[over])
                    .partial_cmp(&distance_sq(&features[b], &centers[over]))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(members[a].cmp(&members[b]))
            })
            .expect("oversize cluster is non-empty");
        clusters[over].retain(|&i| i != worst);
        let target = (0..k)
            .filter(|&c| c != over && clusters[c].len() < max_size)
            .min_by(|&a, &b| {
                distance_sq(&features[worst], &centers[a])
                    .partial_cmp(&distance_sq(&features[worst], &centers[b]))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            })
            .expect("k = ceil(n / max) guarantees room somewhere");
        clusters[target].push(worst);
    }

    clusters
        .into_iter()
        .filter(|c| !c.is_empty())
        .map(|c| {
            let mut piece: Vec<usize> = c.into_iter().map(|i| members[i]).collect();
            piece.sort_unstable();
            piece
        })
        .collect()
}

/// Recursive minimum-cut splitting.
fn min_cut_split(graph: &ContentionGraph, members: Vec<usize>, max_size: usize) -> Vec<Vec<usize>> {
    if members.len() <= max_size {
        return vec![members];
    }
    let (side_a, side_b) = stoer_wagner(graph, &members);
    let mut result = min_cut_split(graph, side_a, max_size);
    result.extend(min_cut_split(graph, side_b, max_size));
    result
}

/// Approximate global minimum cut (Stoer–Wagner with index tie-breaks).
///
/// Returns the two sides as sorted node lists. A disconnected subgraph
/// yields a zero-weight cut along a component boundary, which is exactly
/// the split we want.
fn stoer_wagner(graph: &ContentionGraph, members: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let n = members.len();
    debug_assert!(n >= 2);

    // Local dense weights over member positions.
    let mut w = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let weight = graph.shared_weight(members[i], members[j]) as f64;
            w[i][j] = weight;
            w[j][i] = weight;
        }
    }

    let mut merged_into: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut active: Vec<usize> = (0..n).collect();
    let mut best_weight = f64::INFINITY;
    let mut best_side: Vec<usize> = vec![0];

    while active.len() > 1 {
        // Maximum adjacency ordering starting from the lowest active node.
        let start = active[0];
        let mut in_order = vec![false; n];
        let mut attach = vec![0.0f64; n];
        let mut order = vec![start];
        in_order[start] = true;
        for &v in &active {
            if v != start {
                attach[v] = w[start][v];
            }
        }
        while order.len() < active.len() {
            let &next = active
                .iter()
                .filter(|&&v| !in_order[v])
                .max_by(|&&a, &&b| {
                    attach[a]
                        .partial_cmp(&attach[b])
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.cmp(&a))
                })
                .expect("unordered active node exists");
            in_order[next] = true;
            order.push(next);
            for &v in &active {
                if !in_order[v] {
                    attach[v] += w[next][v];
                }
            }
        }

        let last = *order.last().expect("ordering is non-empty");
        let second_last = order[order.len() - 2];
        let cut_of_phase = attach[last];
        if cut_of_phase < best_weight {
            best_weight = cut_of_phase;
            best_side = merged_into[last].clone();
        }

        // Merge `last` into `second_last`.
        for &v in &active {
            if v != last && v != second_last {
                w[second_last][v] += w[last][v];
                w[v][second_last] = w[second_last][v];
            }
        }
        let absorbed = std::mem::take(&mut merged_into[last]);
        merged_into[second_last].extend(absorbed);
        active.retain(|&v| v != last);
    }

    let side: std::collections::BTreeSet<usize> = best_side.into_iter().collect();
    let mut a: Vec<usize> = side.iter().map(|&i| members[i]).collect();
    let mut b: Vec<usize> = (0..n)
        .filter(|i| !side.contains(i))
        .map(|i| members[i])
        .collect();
    a.sort_unstable();
    b.sort_unstable();
    (a, b)
}
