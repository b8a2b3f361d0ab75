// src/settlement.rs
use ethers::types::{Bytes, U256};
use tracing::{debug, error, warn};

use crate::entrypoint::EntryPoint;
use crate::events::Event;
use crate::execution::{ExecutionMode, ExecutionResult};
use crate::gas::GasMeter;
use crate::op::UserOperation;
use crate::validation::SettlementContext;

/// Final accounting for one operation after execution.
#[derive(Debug, Clone)]
pub struct SettledOp {
    pub mode: ExecutionMode,
    pub actual_gas_used: u64,
    pub actual_gas_cost: U256,
    /// Value debited from the paymaster's stake; zero for self-funded
    /// operations.
    pub extracted: U256,
}

impl EntryPoint {
    /// Reconciles the metered cost against the prefund or the paymaster's
    /// collateral. Never fails: every tolerated failure degrades the
    /// operation's outcome and is recorded on the audit trail instead.
    pub(crate) fn settle_operation(
        &mut self,
        op: &UserOperation,
        sctx: &SettlementContext,
        exec: ExecutionResult,
        events: &mut Vec<Event>,
    ) -> SettledOp {
        let actual_gas_used = sctx.validation_gas.saturating_add(exec.gas_used);
        let actual_gas_cost = U256::from(actual_gas_used).saturating_mul(sctx.effective_gas_price);
        let mut mode = exec.mode;
        let mut extracted = U256::zero();

        if let Some(reason) = &exec.revert_reason {
            events.push(Event::CallFailed {
                op_hash: sctx.op_hash,
                reason: reason.clone(),
            });
        }

        match op.paymaster {
            None => {
                // Return the unused portion of the escrowed prefund. The
                // account is expected to accept incoming value; if it does
                // not, the refund is forfeited and settlement continues.
                let refund = sctx.prefund.saturating_sub(actual_gas_cost);
                if !refund.is_zero() {
                    if let Err(e) = self.world.transfer(self.address, op.target, refund) {
                        warn!(op_hash = %sctx.op_hash, target = %op.target, %refund,
                              "refund transfer failed, forfeited: {e}");
                    }
                }
            }
            Some(paymaster) => {
                let debited = match self.ledger.debit(paymaster, actual_gas_cost) {
                    Ok(()) => {
                        extracted = actual_gas_cost;
                        true
                    }
                    Err(e) => {
                        // Stake was pre-checked at validation, so this is
                        // unreachable in a correct batch. Settle the
                        // operation as failed and keep the batch alive.
                        error!(op_hash = %sctx.op_hash, %paymaster,
                               "stake debit failed after validation pre-check: {e}");
                        mode = ExecutionMode::PostOpReverted;
                        false
                    }
                };

                // The hook runs whenever the debit went through, even for
                // a zero cost; only an empty context skips it.
                if debited {
                    if let Some(context) = sctx
                        .paymaster_context
                        .as_ref()
                        .filter(|context| !context.is_empty())
                    {
                        mode = self.run_post_op(op, sctx, mode, context, actual_gas_cost);
                    }
                }
            }
        }

        let success = mode == ExecutionMode::Succeeded;
        events.push(Event::OperationHandled {
            op_hash: sctx.op_hash,
            target: op.target,
            paymaster: op.paymaster,
            actual_gas_used,
            actual_gas_cost,
            gas_price: sctx.effective_gas_price,
            success,
        });

        SettledOp {
            mode,
            actual_gas_used,
            actual_gas_cost,
            extracted,
        }
    }

    /// Invokes the paymaster's post-check hook. A failing hook downgrades
    /// the mode to `PostOpReverted` and is re-invoked exactly once with
    /// that mode against rolled-back state; a second failure is swallowed.
    /// The user call is never re-executed.
    fn run_post_op(
        &mut self,
        op: &UserOperation,
        sctx: &SettlementContext,
        mode: ExecutionMode,
        context: &Bytes,
        actual_gas_cost: U256,
    ) -> ExecutionMode {
        let paymaster = match op.paymaster {
            Some(paymaster) => paymaster,
            None => return mode,
        };
        debug!(op_hash = %sctx.op_hash, %paymaster,
               context = %hex::encode(context), "running post-op hook");

        let snapshot = self.world.snapshot();
        let mut meter = GasMeter::new(op.verification_gas.as_u64());
        match self
            .world
            .call_paymaster_settle(paymaster, mode, context, actual_gas_cost, &mut meter)
        {
            Ok(()) => mode,
            Err(first) => {
                self.world.restore(snapshot);
                warn!(op_hash = %sctx.op_hash, %paymaster,
                      "post-op hook reverted, retrying in PostOpReverted mode: {first}");

                let snapshot = self.world.snapshot();
                let mut meter = GasMeter::new(op.verification_gas.as_u64());
                if let Err(second) = self.world.call_paymaster_settle(
                    paymaster,
                    ExecutionMode::PostOpReverted,
                    context,
                    actual_gas_cost,
                    &mut meter,
                ) {
                    self.world.restore(snapshot);
                    warn!(op_hash = %sctx.op_hash, %paymaster,
                          "post-op hook reverted again, swallowed: {second}");
                }
                ExecutionMode::PostOpReverted
            }
        }
    }
}
