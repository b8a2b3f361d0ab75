// src/contracts.rs
use std::fmt;

use ethers::types::{Bytes, H256, U256};

use crate::error::Revert;
use crate::execution::ExecutionMode;
use crate::op::UserOperation;
use crate::world::CallContext;

/// Self-funded party. Implementations authenticate the operation's
/// signature over the canonical encoding, enforce their own replay rules,
/// and escrow the required prefund with the entry point when asked to.
pub trait Account: fmt::Debug + Send + Sync {
    /// Self-check hook run during the validation pass. `required_prefund`
    /// is zero when a paymaster covers the operation. Returns the amount
    /// the account claims to have escrowed; the validator trusts the
    /// observed balance delta, not the claim.
    fn validate_and_pay(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: H256,
        required_prefund: U256,
    ) -> Result<U256, Revert>;

    /// The operation's requested call. Only ever invoked by the entry
    /// point, inside the execution sandbox.
    fn execute_requested(&self, ctx: &mut CallContext<'_>, call_data: &Bytes)
        -> Result<Bytes, Revert>;
}

/// Third-party sponsor backing operations with staked collateral.
pub trait Paymaster: fmt::Debug + Send + Sync {
    /// Pre-check hook run during the validation pass, under the budget
    /// left over from the account's self-check. Returns an opaque context
    /// blob that is handed back to `settle`.
    fn validate_and_stake(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: H256,
        max_cost: U256,
    ) -> Result<Bytes, Revert>;

    /// Post-check hook run at settlement with the final metered cost. A
    /// failure here is tolerated: the operation is downgraded to
    /// `PostOpReverted`, never escalated to a batch abort.
    fn settle(
        &self,
        ctx: &mut CallContext<'_>,
        mode: ExecutionMode,
        context: &Bytes,
        actual_cost: U256,
    ) -> Result<(), Revert>;
}

/// Instantiates account behavior from the constructor-argument tail of an
/// operation's init code.
pub trait AccountFactory: fmt::Debug + Send + Sync {
    fn instantiate(&self, args: &[u8]) -> Result<Box<dyn Account>, Revert>;
}
