// src/error.rs
use ethers::types::{Address, U256};
use thiserror::Error;

use crate::stake::StakeError;

/// Failure raised inside a sandboxed contract invocation. Crosses the
/// sandbox boundary as a value, never as a panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("reverted: {reason}")]
pub struct Revert {
    pub reason: String,
}

impl Revert {
    pub fn msg(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Per-operation validation failure. Always surfaced to the submitter
/// wrapped in `EntryPointError::FailedOp` together with the index of the
/// operation at fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpError {
    #[error("derived target {derived} does not match declared target {declared}")]
    TargetMismatch { declared: Address, derived: Address },

    #[error("target {0} is already deployed, create2 failed")]
    AlreadyDeployed(Address),

    #[error("target {0} has no code and no init code was supplied")]
    UnknownTarget(Address),

    #[error("gas budget {0} exceeds the metering range")]
    GasBudgetTooLarge(U256),

    #[error("no factory registered at {0}")]
    UnknownFactory(Address),

    #[error("prepayment shortfall: required {required}, escrowed {escrowed}")]
    PrepayShortfall { required: U256, escrowed: U256 },

    #[error("account escrowed {0} on a paymaster-funded operation")]
    UnexpectedPrepay(U256),

    #[error("no paymaster registered at {0}")]
    UnknownPaymaster(Address),

    #[error("paymaster {paymaster} insufficiently staked: required {required}")]
    InsufficientStake { paymaster: Address, required: U256 },

    #[error("validation hook {0}")]
    ValidationReverted(#[from] Revert),
}

/// Batch-level failures returned from the entry point boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryPointError {
    #[error("operation {index} rejected: {reason}")]
    FailedOp { index: usize, reason: OpError },

    #[error("max priority fee {declared} below required priority fee {required}")]
    PriorityFeeTooLow { declared: U256, required: U256 },

    #[error("simulation may only be invoked from the dry-run origin")]
    InvalidSimulationOrigin,

    #[error("stake ledger: {0}")]
    Stake(#[from] StakeError),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EntryPointError {
    pub(crate) fn failed_op(index: usize, reason: OpError) -> Self {
        Self::FailedOp { index, reason }
    }
}
