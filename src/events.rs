// src/events.rs
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Audit events emitted by the settlement engine. One `OperationHandled`
/// per settled operation regardless of outcome, plus one `CallFailed` per
/// reverted call carrying the raw failure payload for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    OperationHandled {
        op_hash: H256,
        target: Address,
        paymaster: Option<Address>,
        actual_gas_used: u64,
        actual_gas_cost: U256,
        gas_price: U256,
        success: bool,
    },
    #[serde(rename_all = "camelCase")]
    CallFailed { op_hash: H256, reason: String },
}
