// src/validation.rs
use std::collections::HashMap;

use ethers::types::{Address, Bytes, H256, U256};
use tracing::debug;

use crate::entrypoint::EntryPoint;
use crate::error::{OpError, Revert};
use crate::gas::{GasMeter, DEPLOY_GAS};
use crate::op::{derive_address, UserOperation};
use crate::stake::minimum_stake;

/// Ephemeral per-operation settlement input, produced by the validation
/// pass and consumed by the settlement engine within the same batch.
/// Never persisted.
#[derive(Debug, Clone)]
pub struct SettlementContext {
    pub op_hash: H256,
    /// Amount the account escrowed with the entry point; zero when a
    /// paymaster covers the operation.
    pub prefund: U256,
    /// Opaque blob returned by the paymaster's pre-check, handed back to
    /// its post-check hook.
    pub paymaster_context: Option<Bytes>,
    /// Gas metered during the validation pass, billed into the final cost.
    pub validation_gas: u64,
    pub effective_gas_price: U256,
}

impl EntryPoint {
    /// Per-operation authorization and funds-availability check.
    ///
    /// Any failure aborts the whole batch's validation pass; the caller
    /// wraps it with the index of the operation at fault. `reserved`
    /// accumulates prefund commitments per paymaster across the batch so
    /// one sponsor cannot overcommit its stake.
    pub(crate) fn validate_prepayment(
        &mut self,
        op: &UserOperation,
        reserved: &mut HashMap<Address, U256>,
    ) -> Result<SettlementContext, OpError> {
        let op_hash = op.hash(self.address, self.world.chain_id);
        let effective_gas_price = op.effective_gas_price(self.world.base_fee);
        let required_prefund = op.required_prefund(self.world.base_fee);

        // Budgets are metered in u64. A larger declaration can never be
        // honest and fails the operation, not the process; everything past
        // this point may call `as_u64` on these two fields.
        if op.verification_gas > U256::from(u64::MAX) {
            return Err(OpError::GasBudgetTooLarge(op.verification_gas));
        }
        if op.call_gas > U256::from(u64::MAX) {
            return Err(OpError::GasBudgetTooLarge(op.call_gas));
        }
        let mut meter = GasMeter::new(op.verification_gas.as_u64());

        // 1. Resolve the target, deploying it first if init code is given.
        if op.has_init_code() {
            let derived = derive_address(self.address, &op.init_code, op.creation_salt());
            if derived != op.target {
                return Err(OpError::TargetMismatch {
                    declared: op.target,
                    derived,
                });
            }
            meter
                .consume(DEPLOY_GAS)
                .map_err(|e| Revert::msg(e.to_string()))?;
            self.world.deploy_from_init_code(derived, &op.init_code)?;
        } else if !self.world.is_deployed(op.target) {
            return Err(OpError::UnknownTarget(op.target));
        }

        // 2. Run the account's self-check under the verification budget.
        //    The escrowed amount is measured as the entry point's balance
        //    delta, not taken from the hook's return value.
        let escrow_before = self.world.balance(self.address);
        let self_funded_prefund = if op.paymaster.is_none() {
            required_prefund
        } else {
            U256::zero()
        };
        self.world
            .call_validate_and_pay(op.target, op, op_hash, self_funded_prefund, &mut meter)?;
        let escrowed = self
            .world
            .balance(self.address)
            .saturating_sub(escrow_before);

        // 3. Check the funding path.
        let paymaster_context = match op.paymaster {
            None => {
                if escrowed < required_prefund {
                    return Err(OpError::PrepayShortfall {
                        required: required_prefund,
                        escrowed,
                    });
                }
                None
            }
            Some(paymaster) => {
                // A sponsored operation must not also be self-funded.
                if !escrowed.is_zero() {
                    return Err(OpError::UnexpectedPrepay(escrowed));
                }
                if !self.world.has_paymaster(paymaster) {
                    return Err(OpError::UnknownPaymaster(paymaster));
                }
                let already_reserved = reserved.get(&paymaster).copied().unwrap_or_default();
                let required_stake = minimum_stake()
                    .saturating_add(required_prefund)
                    .saturating_add(already_reserved);
                if !self.ledger.is_sufficiently_staked(paymaster, required_stake) {
                    return Err(OpError::InsufficientStake {
                        paymaster,
                        required: required_stake,
                    });
                }

                // 4. Paymaster pre-check runs under the remaining budget.
                let context = self.world.call_paymaster_validate(
                    paymaster,
                    op,
                    op_hash,
                    required_prefund,
                    &mut meter,
                )?;
                *reserved.entry(paymaster).or_default() =
                    already_reserved.saturating_add(required_prefund);
                Some(context)
            }
        };

        debug!(
            %op_hash,
            target = %op.target,
            prefund = %escrowed,
            validation_gas = meter.used(),
            "operation validated"
        );

        Ok(SettlementContext {
            op_hash,
            prefund: escrowed,
            paymaster_context,
            validation_gas: meter.used(),
            effective_gas_price,
        })
    }
}
