// src/entrypoint.rs
use std::collections::HashMap;

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EntryPointError;
use crate::events::Event;
use crate::execution::{ExecutionMode, ExecutionResult};
use crate::op::{derive_address, UserOperation};
use crate::stake::{StakeLedger, StakeRecord};
use crate::world::World;

/// Callers of `simulate` must present this origin; it never corresponds to
/// a real submitter, so simulation stays advisory-only.
pub fn dry_run_origin() -> Address {
    Address::zero()
}

/// Per-operation entry on a batch receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpReceipt {
    pub op_hash: H256,
    pub target: Address,
    pub paymaster: Option<Address>,
    pub mode: ExecutionMode,
    pub actual_gas_used: u64,
    pub actual_gas_cost: U256,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReceipt {
    pub receipts: Vec<OpReceipt>,
    pub events: Vec<Event>,
    pub fee_collected: U256,
    pub recipient: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub op_hash: H256,
    pub prefund: U256,
    pub validation_gas_used: u64,
    pub effective_gas_price: U256,
}

/// The singleton entry point: sequences validation, execution, and
/// settlement over a batch and custodies both account escrow and paymaster
/// collateral.
pub struct EntryPoint {
    pub address: Address,
    pub world: World,
    pub ledger: StakeLedger,
}

impl EntryPoint {
    pub fn new(address: Address, chain_id: u64, base_fee: U256, priority_fee: U256) -> Self {
        Self {
            address,
            world: World::new(address, chain_id, base_fee, priority_fee),
            ledger: StakeLedger::new(),
        }
    }

    /// Processes a batch in two full passes: validate every operation,
    /// then execute and settle each one inside its own failure boundary.
    /// The aggregate fee (escrow growth plus value extracted from stake)
    /// is transferred to `recipient` exactly once, at the end.
    pub fn submit_batch(
        &mut self,
        ops: &[UserOperation],
        recipient: Address,
    ) -> Result<BatchReceipt, EntryPointError> {
        info!(ops = ops.len(), %recipient, "batch submitted");

        // Economic precondition, checked before any state mutation. The
        // submitter builds the batch, so a fee miss is on them, not on any
        // single operation.
        for op in ops {
            if op.max_priority_fee_per_gas < self.world.priority_fee {
                return Err(EntryPointError::PriorityFeeTooLow {
                    declared: op.max_priority_fee_per_gas,
                    required: self.world.priority_fee,
                });
            }
        }

        let escrow_start = self.world.balance(self.address);

        // Pass 1: validate all. Any failure rejects the whole batch,
        // identifying the operation at fault, and rolls back whatever
        // earlier operations escrowed or deployed: the submitter never
        // pays for a batch containing an invalid operation.
        let pre_validation = self.world.snapshot();
        let fresh_targets: Vec<Address> = ops
            .iter()
            .filter(|op| op.has_init_code())
            .map(|op| derive_address(self.address, &op.init_code, op.creation_salt()))
            .filter(|derived| !self.world.is_deployed(*derived))
            .collect();

        let mut reserved = HashMap::new();
        let mut contexts = Vec::with_capacity(ops.len());
        let mut rejection = None;
        for (index, op) in ops.iter().enumerate() {
            match self.validate_prepayment(op, &mut reserved) {
                Ok(sctx) => contexts.push(sctx),
                Err(reason) => {
                    rejection = Some(EntryPointError::failed_op(index, reason));
                    break;
                }
            }
        }
        if let Some(rejection) = rejection {
            self.world.restore(pre_validation);
            for derived in &fresh_targets {
                self.world.remove_account(*derived);
            }
            return Err(rejection);
        }

        // Pass 2: execute and settle each operation in isolation.
        let mut events = Vec::new();
        let mut receipts = Vec::with_capacity(ops.len());
        let mut extracted_total = U256::zero();
        for (op, sctx) in ops.iter().zip(&contexts) {
            let exec = if self.world.is_deployed(op.target) {
                self.execute_operation(op, sctx)
            } else {
                // The attempt cannot even be made; settle with nothing
                // executed and nothing extracted from the call.
                warn!(op_hash = %sctx.op_hash, "target disappeared after validation");
                ExecutionResult::aborted("target disappeared after validation".to_string())
            };
            let settled = self.settle_operation(op, sctx, exec, &mut events);
            extracted_total = extracted_total.saturating_add(settled.extracted);
            receipts.push(OpReceipt {
                op_hash: sctx.op_hash,
                target: op.target,
                paymaster: op.paymaster,
                mode: settled.mode,
                actual_gas_used: settled.actual_gas_used,
                actual_gas_cost: settled.actual_gas_cost,
                success: settled.mode == ExecutionMode::Succeeded,
            });
        }

        // Aggregate fee for the submitter: escrow growth across the batch
        // plus everything debited from stake.
        let escrow_end = self.world.balance(self.address);
        let fee_collected = escrow_end
            .saturating_sub(escrow_start)
            .saturating_add(extracted_total);
        if !fee_collected.is_zero() {
            self.world
                .transfer(self.address, recipient, fee_collected)
                .map_err(|e| EntryPointError::Transfer(e.to_string()))?;
        }

        info!(%fee_collected, ops = ops.len(), "batch settled");
        Ok(BatchReceipt {
            receipts,
            events,
            fee_collected,
            recipient,
        })
    }

    /// Runs the validation pass alone for one operation, leaving no trace
    /// in the world. Only callable from the dry-run origin.
    pub fn simulate(
        &mut self,
        origin: Address,
        op: &UserOperation,
    ) -> Result<SimulationResult, EntryPointError> {
        if origin != dry_run_origin() {
            return Err(EntryPointError::InvalidSimulationOrigin);
        }

        let derived = op
            .has_init_code()
            .then(|| derive_address(self.address, &op.init_code, op.creation_salt()));
        let pre_deployed = derived.map(|d| self.world.is_deployed(d));

        let snapshot = self.world.snapshot();
        let mut reserved = HashMap::new();
        let result = self.validate_prepayment(op, &mut reserved);
        self.world.restore(snapshot);
        if let (Some(derived), Some(false)) = (derived, pre_deployed) {
            self.world.remove_account(derived);
        }

        let sctx = result.map_err(|reason| EntryPointError::failed_op(0, reason))?;
        Ok(SimulationResult {
            op_hash: sctx.op_hash,
            prefund: sctx.prefund,
            validation_gas_used: sctx.validation_gas,
            effective_gas_price: sctx.effective_gas_price,
        })
    }

    // ---- stake management boundary ----

    /// Moves `amount` from the sponsor's balance into locked collateral.
    pub fn add_stake(&mut self, sponsor: Address, amount: U256) -> Result<(), EntryPointError> {
        self.world
            .transfer(sponsor, self.address, amount)
            .map_err(|e| EntryPointError::Transfer(e.to_string()))?;
        self.ledger.add_stake(sponsor, amount);
        Ok(())
    }

    pub fn unlock_stake(&mut self, sponsor: Address) -> Result<(), EntryPointError> {
        let now = self.world.timestamp;
        self.ledger.unlock(sponsor, now)?;
        Ok(())
    }

    /// Pays out the sponsor's full collateral to `to` once the unlock
    /// delay has elapsed.
    pub fn withdraw_stake(
        &mut self,
        sponsor: Address,
        to: Address,
    ) -> Result<U256, EntryPointError> {
        let now = self.world.timestamp;
        let amount = self.ledger.withdraw(sponsor, now)?;
        if let Err(e) = self.world.transfer(self.address, to, amount) {
            // Put the collateral back rather than strand it; the sponsor
            // has to unlock again.
            self.ledger.add_stake(sponsor, amount);
            return Err(EntryPointError::Transfer(e.to_string()));
        }
        Ok(amount)
    }

    pub fn get_stake_info(&self, sponsors: &[Address]) -> Vec<StakeRecord> {
        sponsors.iter().map(|s| self.ledger.info(*s)).collect()
    }
}
