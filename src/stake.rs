// src/stake.rs
use std::collections::HashMap;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Minimum collateral a paymaster must keep locked on top of any
/// per-operation prefund it guarantees.
pub fn minimum_stake() -> U256 {
    // 1 ether
    U256::exp10(18)
}

/// Seconds that must elapse between requesting a withdrawal and the stake
/// actually leaving the ledger.
pub const STAKE_UNLOCK_DELAY: u64 = 86_400;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakeError {
    #[error("nothing staked for {0}")]
    NothingStaked(Address),

    #[error("stake for {0} is already unlocked")]
    AlreadyUnlocked(Address),

    #[error("stake for {0} is locked, unlock it first")]
    NotUnlocked(Address),

    #[error("withdrawal not due until {due}, now {now}")]
    WithdrawalNotDue { due: u64, now: u64 },

    #[error("insufficient stake balance: have {balance}, debit {amount}")]
    InsufficientBalance { balance: U256, amount: U256 },
}

/// Collateral state for one sponsor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeRecord {
    pub balance: U256,
    pub locked: bool,
    pub withdrawal_requested_at: Option<u64>,
}

/// In-memory stake ledger keyed by sponsor identity. All mutations are
/// applied synchronously, so a debit for operation *i* is visible to the
/// settlement of operation *i+1* within the same batch.
#[derive(Debug, Clone, Default)]
pub struct StakeLedger {
    records: HashMap<Address, StakeRecord>,
}

impl StakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increases the sponsor's collateral and (re)locks it. Any pending
    /// withdrawal request is cancelled.
    pub fn add_stake(&mut self, sponsor: Address, amount: U256) {
        let record = self.records.entry(sponsor).or_default();
        record.balance = record.balance.saturating_add(amount);
        record.locked = true;
        record.withdrawal_requested_at = None;
        debug!(%sponsor, %amount, balance = %record.balance, "stake added");
    }

    /// Marks intent to withdraw and starts the delay countdown.
    pub fn unlock(&mut self, sponsor: Address, now: u64) -> Result<(), StakeError> {
        let record = self
            .records
            .get_mut(&sponsor)
            .ok_or(StakeError::NothingStaked(sponsor))?;
        if !record.locked {
            return Err(StakeError::AlreadyUnlocked(sponsor));
        }
        record.locked = false;
        record.withdrawal_requested_at = Some(now);
        Ok(())
    }

    /// Zeroes the balance once the unlock delay has elapsed and returns the
    /// withdrawable amount. The record is re-locked for any future stake.
    pub fn withdraw(&mut self, sponsor: Address, now: u64) -> Result<U256, StakeError> {
        let record = self
            .records
            .get_mut(&sponsor)
            .ok_or(StakeError::NothingStaked(sponsor))?;
        let requested_at = record
            .withdrawal_requested_at
            .ok_or(StakeError::NotUnlocked(sponsor))?;
        let due = requested_at + STAKE_UNLOCK_DELAY;
        if now < due {
            return Err(StakeError::WithdrawalNotDue { due, now });
        }
        let amount = record.balance;
        record.balance = U256::zero();
        record.locked = true;
        record.withdrawal_requested_at = None;
        Ok(amount)
    }

    /// Reduces the sponsor's collateral by `amount`. Stake sufficiency is
    /// pre-checked at validation time, so a failure here is an invariant
    /// violation at the caller.
    pub fn debit(&mut self, sponsor: Address, amount: U256) -> Result<(), StakeError> {
        let record = self
            .records
            .get_mut(&sponsor)
            .ok_or(StakeError::NothingStaked(sponsor))?;
        if record.balance < amount {
            return Err(StakeError::InsufficientBalance {
                balance: record.balance,
                amount,
            });
        }
        record.balance -= amount;
        debug!(%sponsor, %amount, balance = %record.balance, "stake debited");
        Ok(())
    }

    /// True iff the stake is locked (not mid-withdrawal) and covers
    /// `required`.
    pub fn is_sufficiently_staked(&self, sponsor: Address, required: U256) -> bool {
        match self.records.get(&sponsor) {
            Some(record) => record.locked && record.balance >= required,
            None => false,
        }
    }

    pub fn info(&self, sponsor: Address) -> StakeRecord {
        self.records.get(&sponsor).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sponsor() -> Address {
        Address::from_low_u64_be(0xabc)
    }

    #[test]
    fn add_stake_locks_and_accumulates() {
        let mut ledger = StakeLedger::new();
        ledger.add_stake(sponsor(), U256::from(100));
        ledger.add_stake(sponsor(), U256::from(50));
        let record = ledger.info(sponsor());
        assert_eq!(record.balance, U256::from(150));
        assert!(record.locked);
        assert_eq!(record.withdrawal_requested_at, None);
    }

    #[test]
    fn unlock_twice_fails() {
        let mut ledger = StakeLedger::new();
        ledger.add_stake(sponsor(), U256::from(100));
        ledger.unlock(sponsor(), 1_000).unwrap();
        assert_eq!(
            ledger.unlock(sponsor(), 1_001),
            Err(StakeError::AlreadyUnlocked(sponsor()))
        );
    }

    #[test]
    fn withdraw_respects_delay() {
        let mut ledger = StakeLedger::new();
        ledger.add_stake(sponsor(), U256::from(100));

        assert_eq!(
            ledger.withdraw(sponsor(), 1_000),
            Err(StakeError::NotUnlocked(sponsor()))
        );

        ledger.unlock(sponsor(), 1_000).unwrap();
        assert_eq!(
            ledger.withdraw(sponsor(), 1_000 + STAKE_UNLOCK_DELAY - 1),
            Err(StakeError::WithdrawalNotDue {
                due: 1_000 + STAKE_UNLOCK_DELAY,
                now: 1_000 + STAKE_UNLOCK_DELAY - 1
            })
        );

        let amount = ledger
            .withdraw(sponsor(), 1_000 + STAKE_UNLOCK_DELAY)
            .unwrap();
        assert_eq!(amount, U256::from(100));
        let record = ledger.info(sponsor());
        assert_eq!(record.balance, U256::zero());
        assert!(record.locked);
    }

    #[test]
    fn re_staking_cancels_pending_withdrawal() {
        let mut ledger = StakeLedger::new();
        ledger.add_stake(sponsor(), U256::from(100));
        ledger.unlock(sponsor(), 1_000).unwrap();
        ledger.add_stake(sponsor(), U256::from(1));
        assert_eq!(
            ledger.withdraw(sponsor(), u64::MAX),
            Err(StakeError::NotUnlocked(sponsor()))
        );
    }

    #[test]
    fn debit_requires_balance() {
        let mut ledger = StakeLedger::new();
        ledger.add_stake(sponsor(), U256::from(100));
        ledger.debit(sponsor(), U256::from(60)).unwrap();
        assert_eq!(
            ledger.debit(sponsor(), U256::from(60)),
            Err(StakeError::InsufficientBalance {
                balance: U256::from(40),
                amount: U256::from(60),
            })
        );
        assert_eq!(ledger.info(sponsor()).balance, U256::from(40));
    }

    #[test]
    fn sufficiency_requires_lock() {
        let mut ledger = StakeLedger::new();
        assert!(!ledger.is_sufficiently_staked(sponsor(), U256::zero()));

        ledger.add_stake(sponsor(), U256::from(100));
        assert!(ledger.is_sufficiently_staked(sponsor(), U256::from(100)));
        assert!(!ledger.is_sufficiently_staked(sponsor(), U256::from(101)));

        // Mid-withdrawal stake no longer backs operations.
        ledger.unlock(sponsor(), 0).unwrap();
        assert!(!ledger.is_sufficiently_staked(sponsor(), U256::from(1)));
    }
}
