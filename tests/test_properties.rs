//! Randomized property tests
//!
//! For every randomly generated feasible instance: bounds, capacity and
//! individual rationality hold; joint welfare weakly dominates the
//! sequential baseline (up to integer-rounding slack); identical inputs
//! give identical outputs.

use arbitration_core::arbitration::sequential::WeightMode;
use arbitration_core::arbitration::{gradient, proportional, sequential};
use arbitration_core::{
    log_welfare, Agent, Contention, ContentionGroup, ResourcePool, ResourceRequest, ResourceType,
    SolveLimits, UtilityFunction,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const BASE_WEIGHT: f64 = 10.0;

#[derive(Debug, Clone)]
struct ClaimSpec {
    min: u64,
    span: u64,
    burn_credits: i64,
}

fn claim_spec() -> impl Strategy<Value = ClaimSpec> {
    (0u64..=8, 1u64..=30, 0i64..=40).prop_map(|(min, span, burn_credits)| ClaimSpec {
        min,
        span,
        burn_credits,
    })
}

fn single_resource_agent(id: &str, spec: &ClaimSpec) -> Agent {
    Agent::new(
        id.to_string(),
        id.to_string(),
        BTreeMap::from([(ResourceType::Compute, 1.0)]),
        BTreeMap::from([(
            ResourceType::Compute,
            ResourceRequest::new(spec.min, spec.min + spec.span),
        )]),
        spec.burn_credits * 1_000,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Water-filling: bounds, capacity and individual rationality on
    /// every feasible instance.
    #[test]
    fn prop_water_filling_respects_invariants(
        specs in proptest::collection::vec(claim_spec(), 2..=5),
        available in 60u64..=250,
    ) {
        let agents: Vec<Agent> = specs
            .iter()
            .enumerate()
            .map(|(i, s)| single_resource_agent(&format!("agent{:02}", i), s))
            .collect();
        let burns: BTreeMap<String, i64> = agents
            .iter()
            .map(|a| (a.id().to_string(), a.balance_mc()))
            .collect();
        let contention = Contention {
            resource: ResourceType::Compute,
            competitors: agents.iter().map(|a| a.id().to_string()).collect(),
            available,
            total_demand: agents
                .iter()
                .map(|a| a.request(ResourceType::Compute).ideal)
                .sum(),
        };

        let result =
            proportional::arbitrate(&contention, &agents, &burns, BASE_WEIGHT).unwrap();

        let mut total = 0u64;
        for agent in &agents {
            let got = result.allocations[agent.id()];
            let request = agent.request(ResourceType::Compute);
            // Bounds + individual rationality: never below the minimum.
            prop_assert!(got >= request.min, "{} below min", agent.id());
            prop_assert!(got <= request.ideal, "{} above ideal", agent.id());
            total += got;
        }
        prop_assert!(total <= available, "capacity violated: {}", total);
    }

    /// Determinism: the same instance always solves identically.
    #[test]
    fn prop_identical_inputs_identical_outputs(
        specs in proptest::collection::vec(claim_spec(), 2..=5),
        available in 60u64..=250,
    ) {
        let agents: Vec<Agent> = specs
            .iter()
            .enumerate()
            .map(|(i, s)| single_resource_agent(&format!("agent{:02}", i), s))
            .collect();
        let burns: BTreeMap<String, i64> = agents
            .iter()
            .map(|a| (a.id().to_string(), a.balance_mc()))
            .collect();
        let contention = Contention {
            resource: ResourceType::Compute,
            competitors: agents.iter().map(|a| a.id().to_string()).collect(),
            available,
            total_demand: 0,
        };
        let first = proportional::arbitrate(&contention, &agents, &burns, BASE_WEIGHT).unwrap();
        let second = proportional::arbitrate(&contention, &agents, &burns, BASE_WEIGHT).unwrap();
        prop_assert_eq!(first, second);
    }

    /// Raising one agent's burn never costs it allocation (up to one
    /// unit of integer-rounding slack).
    #[test]
    fn prop_burn_increase_weakly_helps(
        specs in proptest::collection::vec(claim_spec(), 2..=4),
        available in 60u64..=200,
        extra_credits in 1i64..=50,
    ) {
        let agents: Vec<Agent> = specs
            .iter()
            .enumerate()
            .map(|(i, s)| single_resource_agent(&format!("agent{:02}", i), s))
            .collect();
        let contention = Contention {
            resource: ResourceType::Compute,
            competitors: agents.iter().map(|a| a.id().to_string()).collect(),
            available,
            total_demand: 0,
        };
        let mut burns: BTreeMap<String, i64> = agents
            .iter()
            .map(|a| (a.id().to_string(), 0))
            .collect();

        let before =
            proportional::arbitrate(&contention, &agents, &burns, BASE_WEIGHT).unwrap();
        burns.insert("agent00".to_string(), extra_credits * 1_000);
        let after =
            proportional::arbitrate(&contention, &agents, &burns, BASE_WEIGHT).unwrap();

        prop_assert!(
            after.allocations["agent00"] + 1 >= before.allocations["agent00"],
            "higher burn lost units: {} -> {}",
            before.allocations["agent00"],
            after.allocations["agent00"]
        );
    }
}

// ============================================================================
// Joint vs sequential welfare
// ============================================================================

fn two_resource_log_agent(id: &str, min: u64, ideal: u64) -> Agent {
    let weights = BTreeMap::from([
        (ResourceType::Compute, 0.5),
        (ResourceType::Storage, 0.5),
    ]);
    Agent::new(
        id.to_string(),
        id.to_string(),
        weights.clone(),
        BTreeMap::from([
            (ResourceType::Compute, ResourceRequest::new(min, ideal)),
            (ResourceType::Storage, ResourceRequest::new(min, ideal)),
        ]),
        0,
    )
    .with_utility(UtilityFunction::Log { weights })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Joint log-welfare weakly dominates the sequential baseline. The
    /// slack term covers integer rounding on both sides; the 1e-3
    /// relative term covers solver tolerance.
    #[test]
    fn prop_joint_weakly_dominates_sequential(
        mins in proptest::collection::vec(5u64..=10, 2..=4),
        spans in proptest::collection::vec(25u64..=40, 2..=4),
        compute_share in 80u64..=150,
        storage_share in 80u64..=150,
    ) {
        let n = mins.len().min(spans.len());
        let agents: Vec<Agent> = (0..n)
            .map(|i| {
                two_resource_log_agent(
                    &format!("agent{:02}", i),
                    mins[i],
                    mins[i] + spans[i],
                )
            })
            .collect();
        let group = ContentionGroup {
            agent_ids: agents.iter().map(|a| a.id().to_string()).collect(),
            resources: BTreeSet::from([ResourceType::Compute, ResourceType::Storage]),
            share: BTreeMap::from([
                (ResourceType::Compute, compute_share),
                (ResourceType::Storage, storage_share),
            ]),
        };
        let burns = BTreeMap::new();
        let limits = SolveLimits::unlimited();

        let seq = sequential::arbitrate(
            &group,
            &agents,
            &burns,
            BASE_WEIGHT,
            WeightMode::PreferenceScaled,
            &limits,
        )
        .unwrap();
        let joint = gradient::arbitrate(
            &group,
            &agents,
            &burns,
            BASE_WEIGHT,
            1e-6,
            1000,
            &limits,
        )
        .unwrap();

        let seq_welfare = log_welfare(&agents, &seq.allocations, &burns, BASE_WEIGHT);
        let joint_welfare = log_welfare(&agents, &joint.allocations, &burns, BASE_WEIGHT);
        let slack = 2.5 + 1e-3 * seq_welfare.abs();
        prop_assert!(
            joint_welfare >= seq_welfare - slack,
            "joint {} fell more than {} below sequential {}",
            joint_welfare,
            slack,
            seq_welfare
        );

        // Both honor bounds and shares.
        for result in [&seq, &joint] {
            for agent in &agents {
                for (resource, amount) in &result.allocations[agent.id()] {
                    let request = agent.request(*resource);
                    prop_assert!(*amount >= request.min && *amount <= request.ideal);
                }
            }
            for (resource, share) in [
                (ResourceType::Compute, compute_share),
                (ResourceType::Storage, storage_share),
            ] {
                let total: u64 = result
                    .allocations
                    .values()
                    .filter_map(|u| u.get(&resource))
                    .sum();
                prop_assert!(total <= share);
            }
        }
    }
}

// ============================================================================
// Pool round-trips
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Any sequence of successful allocate/release pairs returns the
    /// pool to its initial state.
    #[test]
    fn prop_pool_round_trips(
        quantities in proptest::collection::vec(1u64..=30, 1..=10),
    ) {
        let mut pool = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 1_000)]));
        let initial = pool.clone();
        let mut applied = Vec::new();
        for q in &quantities {
            if pool.allocate(ResourceType::Compute, *q).is_ok() {
                applied.push(*q);
            }
        }
        for q in applied.iter().rev() {
            pool.release(ResourceType::Compute, *q).unwrap();
        }
        prop_assert_eq!(pool, initial);
    }
}
