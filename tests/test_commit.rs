//! Transaction manager tests
//!
//! Atomic commit: every invariant checked before any mutation, rollback
//! restores the exact pre-commit state, and the pool round-trips.

use arbitration_core::{
    Agent, ArbitrationConfig, CommitError, JointAllocationResult, PriorityEconomy, ResourcePool,
    ResourceRequest, ResourceType, SolverKind, TransactionManager,
};
use std::collections::BTreeMap;

fn agent(id: &str, min: u64, ideal: u64, balance_mc: i64) -> Agent {
    Agent::new(
        id.to_string(),
        id.to_string(),
        BTreeMap::from([
            (ResourceType::Compute, 0.5),
            (ResourceType::Memory, 0.5),
        ]),
        BTreeMap::from([
            (ResourceType::Compute, ResourceRequest::new(min, ideal)),
            (ResourceType::Memory, ResourceRequest::new(min, ideal)),
        ]),
        balance_mc,
    )
}

fn result(
    allocations: &[(&str, &[(ResourceType, u64)])],
    burns: &[(&str, i64)],
) -> JointAllocationResult {
    JointAllocationResult {
        allocations: allocations
            .iter()
            .map(|(id, units)| (id.to_string(), units.iter().copied().collect()))
            .collect(),
        burns_mc: burns.iter().map(|(id, mc)| (id.to_string(), *mc)).collect(),
        objective: 0.0,
        feasible: true,
        solver: SolverKind::Gradient,
        converged: true,
        timed_out: false,
        elapsed_ms: 1,
    }
}

fn fixture() -> (ResourcePool, BTreeMap<String, Agent>, PriorityEconomy) {
    let pool = ResourcePool::new(BTreeMap::from([
        (ResourceType::Compute, 100),
        (ResourceType::Memory, 100),
    ]));
    let agents = BTreeMap::from([
        ("a".to_string(), agent("a", 10, 60, 8_000)),
        ("b".to_string(), agent("b", 10, 60, 8_000)),
    ]);
    let economy = PriorityEconomy::new(&ArbitrationConfig::default());
    (pool, agents, economy)
}

#[test]
fn test_successful_commit_moves_everything_atomically() {
    let (mut pool, mut agents, mut economy) = fixture();
    let manager = TransactionManager::new();
    let joint = result(
        &[
            ("a", &[(ResourceType::Compute, 40), (ResourceType::Memory, 20)]),
            ("b", &[(ResourceType::Compute, 30), (ResourceType::Memory, 50)]),
        ],
        &[("a", 3_000), ("b", 1_000)],
    );

    let receipt = manager
        .commit(&mut pool, &mut agents, &mut economy, &joint)
        .unwrap();

    assert_eq!(pool.reserved(ResourceType::Compute), 70);
    assert_eq!(pool.reserved(ResourceType::Memory), 70);
    assert_eq!(agents["a"].allocated(ResourceType::Compute), 40);
    assert_eq!(agents["b"].allocated(ResourceType::Memory), 50);
    assert_eq!(agents["a"].balance_mc(), 5_000);
    assert_eq!(agents["b"].balance_mc(), 7_000);
    assert_eq!(economy.total_burned_mc(), 4_000);
    assert_eq!(receipt.total_burned_mc(), 4_000);
}

#[test]
fn test_bounds_violation_rejects_whole_commit() {
    let (mut pool, mut agents, mut economy) = fixture();
    let manager = TransactionManager::new();
    // b's memory allocation exceeds its ideal of 60.
    let joint = result(
        &[
            ("a", &[(ResourceType::Compute, 40)]),
            ("b", &[(ResourceType::Memory, 61)]),
        ],
        &[],
    );

    let err = manager
        .commit(&mut pool, &mut agents, &mut economy, &joint)
        .unwrap_err();
    assert!(matches!(err, CommitError::OutOfBounds { .. }));
    // Nothing moved, including a's otherwise-valid allocation.
    assert_eq!(pool.reserved(ResourceType::Compute), 0);
    assert_eq!(agents["a"].allocated(ResourceType::Compute), 0);
}

#[test]
fn test_below_minimum_allocation_rejected() {
    let (mut pool, mut agents, mut economy) = fixture();
    let manager = TransactionManager::new();
    let joint = result(&[("a", &[(ResourceType::Compute, 9)])], &[]);
    let err = manager
        .commit(&mut pool, &mut agents, &mut economy, &joint)
        .unwrap_err();
    assert!(matches!(err, CommitError::OutOfBounds { .. }));
}

#[test]
fn test_capacity_check_counts_aggregate_demand() {
    let (mut pool, mut agents, mut economy) = fixture();
    pool.allocate(ResourceType::Compute, 50).unwrap();
    let manager = TransactionManager::new();
    // 30 + 30 fits bounds but exceeds the 50 units still available.
    let joint = result(
        &[
            ("a", &[(ResourceType::Compute, 30)]),
            ("b", &[(ResourceType::Compute, 30)]),
        ],
        &[],
    );
    let err = manager
        .commit(&mut pool, &mut agents, &mut economy, &joint)
        .unwrap_err();
    assert_eq!(
        err,
        CommitError::CapacityExceeded {
            resource: ResourceType::Compute,
            requested: 60,
            available: 50,
        }
    );
    assert_eq!(pool.reserved(ResourceType::Compute), 50);
}

#[test]
fn test_burn_coverage_checked_before_any_debit() {
    let (mut pool, mut agents, mut economy) = fixture();
    let manager = TransactionManager::new();
    let joint = result(
        &[
            ("a", &[(ResourceType::Compute, 20)]),
            ("b", &[(ResourceType::Compute, 20)]),
        ],
        &[("a", 2_000), ("b", 9_000)], // b cannot cover 9 credits
    );
    let err = manager
        .commit(&mut pool, &mut agents, &mut economy, &joint)
        .unwrap_err();
    assert!(matches!(err, CommitError::BurnExceedsBalance { .. }));
    assert_eq!(agents["a"].balance_mc(), 8_000, "a must not be debited");
    assert_eq!(pool.reserved(ResourceType::Compute), 0);
    assert_eq!(economy.total_burned_mc(), 0);
}

#[test]
fn test_rollback_is_exact_inverse() {
    let (mut pool, mut agents, mut economy) = fixture();
    let pool_before = pool.clone();
    let balances_before: BTreeMap<String, i64> = agents
        .iter()
        .map(|(id, a)| (id.clone(), a.balance_mc()))
        .collect();

    let manager = TransactionManager::new();
    let joint = result(
        &[
            ("a", &[(ResourceType::Compute, 40), (ResourceType::Memory, 25)]),
            ("b", &[(ResourceType::Compute, 15)]),
        ],
        &[("a", 5_000)],
    );
    let receipt = manager
        .commit(&mut pool, &mut agents, &mut economy, &joint)
        .unwrap();
    manager
        .rollback(&mut pool, &mut agents, &economy, &receipt)
        .unwrap();

    assert_eq!(pool, pool_before, "pool must round-trip");
    for (id, balance) in balances_before {
        assert_eq!(agents[&id].balance_mc(), balance);
        assert!(agents[&id].current_allocation().is_empty());
    }
}

#[test]
fn test_sequential_commits_are_ordered() {
    let (mut pool, mut agents, mut economy) = fixture();
    let manager = TransactionManager::new();

    let first = result(&[("a", &[(ResourceType::Compute, 60)])], &[]);
    let second = result(&[("b", &[(ResourceType::Compute, 60)])], &[]);

    manager
        .commit(&mut pool, &mut agents, &mut economy, &first)
        .unwrap();
    // The second commit sees the first one's reservations.
    let err = manager
        .commit(&mut pool, &mut agents, &mut economy, &second)
        .unwrap_err();
    assert_eq!(
        err,
        CommitError::CapacityExceeded {
            resource: ResourceType::Compute,
            requested: 60,
            available: 40,
        }
    );
}
