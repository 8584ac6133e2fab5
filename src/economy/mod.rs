//! Priority economy
//!
//! Currency buys priority: an agent burning `b` credits enters an
//! arbitration with weight `base_weight + b`. The base weight keeps
//! zero-balance agents at a strictly positive weight, which — together
//! with the log barrier in the welfare function — is what delivers
//! starvation protection.
//!
//! Releasing resources early earns currency back, scaled by how scarce
//! the resource is and how much of the grant period remains.
//!
//! CRITICAL: All currency values are i64 (millicredits)

use crate::core::config::ArbitrationConfig;
use crate::models::agent::{Agent, AgentError};
use crate::models::resource::{ResourcePool, ResourceType};
use thiserror::Error;

/// Convert millicredits to credits.
pub fn credits(mc: i64) -> f64 {
    mc as f64 / 1000.0
}

/// Convert credits to millicredits, rounding to nearest.
pub fn millicredits(credits: f64) -> i64 {
    (credits * 1000.0).round() as i64
}

/// Errors from economy operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EconomyError {
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Mint/burn bookkeeping plus the currency → weight map.
///
/// The minted/burned totals are monotone counters. The economy is owned
/// by its session and every balance movement goes through `&mut self`,
/// the same single-writer discipline the pool and agents follow.
///
/// # Example
/// ```
/// use arbitration_core::{ArbitrationConfig, PriorityEconomy};
///
/// let economy = PriorityEconomy::new(&ArbitrationConfig::default());
/// // Burning 50 credits (50_000 mc) on top of the base weight of 10:
/// assert_eq!(economy.weight_for_burn(50_000), 60.0);
/// // Zero burn still carries the base weight — nobody arbitrates at 0.
/// assert_eq!(economy.weight_for_burn(0), 10.0);
/// ```
#[derive(Debug, Clone)]
pub struct PriorityEconomy {
    base_weight: f64,
    min_balance_mc: i64,
    release_rate_mc: f64,
    earnings_cap_mc: i64,
    total_minted_mc: i64,
    total_burned_mc: i64,
}

impl PriorityEconomy {
    pub fn new(config: &ArbitrationConfig) -> Self {
        assert!(config.base_weight > 0.0, "base_weight must be positive");
        Self {
            base_weight: config.base_weight,
            min_balance_mc: config.min_balance_mc,
            release_rate_mc: config.release_rate_mc,
            earnings_cap_mc: config.earnings_cap_mc,
            total_minted_mc: 0,
            total_burned_mc: 0,
        }
    }

    /// The configured base weight.
    pub fn base_weight(&self) -> f64 {
        self.base_weight
    }

    /// The balance floor in millicredits.
    pub fn min_balance_mc(&self) -> i64 {
        self.min_balance_mc
    }

    /// Arbitration weight for a currency burn: `base_weight + credits`.
    pub fn weight_for_burn(&self, burn_mc: i64) -> f64 {
        self.base_weight + credits(burn_mc.max(0))
    }

    /// Mint currency into an agent's balance (platform rewards).
    pub fn mint(&mut self, agent: &mut Agent, amount_mc: i64) -> Result<(), EconomyError> {
        agent.credit(amount_mc)?;
        self.total_minted_mc += amount_mc;
        Ok(())
    }

    /// Burn currency from an agent's balance.
    ///
    /// Fails (mutating nothing) if the balance would drop below the floor.
    pub fn burn(&mut self, agent: &mut Agent, amount_mc: i64) -> Result<(), EconomyError> {
        agent.debit(amount_mc, self.min_balance_mc)?;
        self.total_burned_mc += amount_mc;
        Ok(())
    }

    /// Return previously burned currency without touching the monotone
    /// counters. Used by the transaction manager's rollback path, where
    /// the original burn is being undone rather than new currency minted.
    pub fn refund(&self, agent: &mut Agent, amount_mc: i64) -> Result<(), EconomyError> {
        agent.credit(amount_mc)?;
        Ok(())
    }

    /// Earnings for returning `quantity` units of `resource` with
    /// `time_remaining_fraction` of the grant period left.
    ///
    /// `earnings = release_rate · quantity · trf · scarcity`, where
    /// scarcity is the pool's utilization of the resource. The result is
    /// clamped to the configured per-release cap, so a single release can
    /// never print unbounded currency.
    pub fn release_earnings(
        &self,
        resource: ResourceType,
        quantity: u64,
        time_remaining_fraction: f64,
        pool: &ResourcePool,
    ) -> i64 {
        let trf = time_remaining_fraction.clamp(0.0, 1.0);
        if trf == 0.0 || quantity == 0 {
            return 0;
        }
        let scarcity = pool.utilization(resource);
        let raw = self.release_rate_mc * quantity as f64 * trf * scarcity;
        (raw.round() as i64).clamp(0, self.earnings_cap_mc)
    }

    /// Total millicredits minted since the economy was created.
    pub fn total_minted_mc(&self) -> i64 {
        self.total_minted_mc
    }

    /// Total millicredits burned since the economy was created.
    pub fn total_burned_mc(&self) -> i64 {
        self.total_burned_mc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::ResourceRequest;
    use std::collections::BTreeMap;

    fn agent(balance_mc: i64) -> Agent {
        Agent::new(
            "a1".to_string(),
            "A1".to_string(),
            BTreeMap::from([(ResourceType::Compute, 1.0)]),
            BTreeMap::from([(ResourceType::Compute, ResourceRequest::new(0, 10))]),
            balance_mc,
        )
    }

    #[test]
    fn test_weight_is_base_plus_credits() {
        let economy = PriorityEconomy::new(&ArbitrationConfig::default());
        assert_eq!(economy.weight_for_burn(0), 10.0);
        assert_eq!(economy.weight_for_burn(5_000), 15.0);
        // Negative burns are treated as zero, never reducing the weight.
        assert_eq!(economy.weight_for_burn(-100), 10.0);
    }

    #[test]
    fn test_burn_below_floor_rejected() {
        let mut economy = PriorityEconomy::new(&ArbitrationConfig::default());
        let mut a = agent(1_000);
        assert!(economy.burn(&mut a, 1_500).is_err());
        assert_eq!(a.balance_mc(), 1_000);
        assert_eq!(economy.total_burned_mc(), 0);
    }

    #[test]
    fn test_counters_are_monotone() {
        let mut economy = PriorityEconomy::new(&ArbitrationConfig::default());
        let mut a = agent(10_000);
        economy.mint(&mut a, 2_000).unwrap();
        economy.burn(&mut a, 3_000).unwrap();
        economy.refund(&mut a, 3_000).unwrap();
        assert_eq!(economy.total_minted_mc(), 2_000);
        assert_eq!(economy.total_burned_mc(), 3_000);
        assert_eq!(a.balance_mc(), 12_000);
    }

    #[test]
    fn test_release_earnings_zero_without_time_remaining() {
        let economy = PriorityEconomy::new(&ArbitrationConfig::default());
        let mut pool = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 100)]));
        pool.allocate(ResourceType::Compute, 80).unwrap();
        assert_eq!(
            economy.release_earnings(ResourceType::Compute, 10, 0.0, &pool),
            0
        );
    }

    #[test]
    fn test_release_earnings_increase_with_scarcity() {
        let economy = PriorityEconomy::new(&ArbitrationConfig::default());
        let mut low = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 100)]));
        let mut high = low.clone();
        low.allocate(ResourceType::Compute, 20).unwrap();
        high.allocate(ResourceType::Compute, 90).unwrap();

        let at_low = economy.release_earnings(ResourceType::Compute, 10, 0.5, &low);
        let at_high = economy.release_earnings(ResourceType::Compute, 10, 0.5, &high);
        assert!(at_high > at_low);
    }

    #[test]
    fn test_release_earnings_capped() {
        let config = ArbitrationConfig {
            earnings_cap_mc: 500,
            ..ArbitrationConfig::default()
        };
        let economy = PriorityEconomy::new(&config);
        let mut pool = ResourcePool::new(BTreeMap::from([(ResourceType::Compute, 100)]));
        pool.allocate(ResourceType::Compute, 99).unwrap();
        let earned = economy.release_earnings(ResourceType::Compute, 1_000_000, 1.0, &pool);
        assert_eq!(earned, 500);
    }
}
