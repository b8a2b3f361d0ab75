// src/execution.rs
use ethers::types::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entrypoint::EntryPoint;
use crate::gas::GasMeter;
use crate::op::UserOperation;
use crate::validation::SettlementContext;

/// Outcome classification for one executed operation, threaded through
/// settlement instead of exception suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionMode {
    /// The requested call completed.
    Succeeded,
    /// The call itself failed; its side effects were rolled back.
    Reverted,
    /// The call (or a later settlement hook) left the paying party's
    /// post-check unsatisfied; only the gas accounting stands.
    PostOpReverted,
}

/// Result of running one operation's requested call inside the sandbox.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub mode: ExecutionMode,
    pub gas_used: u64,
    pub revert_reason: Option<String>,
    pub output: Option<Bytes>,
}

impl ExecutionResult {
    /// Outcome used when the execution attempt could not even be made:
    /// nothing ran, nothing was extracted, settlement still proceeds.
    pub fn aborted(reason: String) -> Self {
        Self {
            mode: ExecutionMode::PostOpReverted,
            gas_used: 0,
            revert_reason: Some(reason),
            output: None,
        }
    }
}

impl EntryPoint {
    /// Runs the operation's requested call in an isolated failure domain.
    ///
    /// Runs strictly after the whole batch has validated. A reverted call
    /// rolls back its own side effects and is reported as `Reverted`; it
    /// never aborts the batch or disturbs other operations' settlement.
    pub(crate) fn execute_operation(
        &mut self,
        op: &UserOperation,
        sctx: &SettlementContext,
    ) -> ExecutionResult {
        let snapshot = self.world.snapshot();
        // call_gas fits u64, checked during validation.
        let mut meter = GasMeter::new(op.call_gas.as_u64());

        match self.world.call_execute(op.target, &op.call_data, &mut meter) {
            Ok(output) => {
                debug!(op_hash = %sctx.op_hash, gas = meter.used(), "call succeeded");
                ExecutionResult {
                    mode: ExecutionMode::Succeeded,
                    gas_used: meter.used(),
                    revert_reason: None,
                    output: Some(output),
                }
            }
            Err(revert) => {
                self.world.restore(snapshot);
                debug!(op_hash = %sctx.op_hash, gas = meter.used(), reason = %revert.reason, "call reverted");
                ExecutionResult {
                    mode: ExecutionMode::Reverted,
                    gas_used: meter.used(),
                    revert_reason: Some(revert.reason),
                    output: None,
                }
            }
        }
    }
}
