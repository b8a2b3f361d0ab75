// src/rpc.rs
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::ErrorObject;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::entrypoint::{dry_run_origin, BatchReceipt, EntryPoint, SimulationResult};
use crate::error::EntryPointError;
use crate::op::UserOperation;
use crate::stake::StakeRecord;

// Define the RPC interface
#[rpc(server, namespace = "aa")]
pub trait EntryPointRpc {
    /// Submits a batch of operations for validation, execution, and
    /// settlement; the collected fee goes to `recipient`.
    #[method(name = "submitBatch")]
    async fn submit_batch(
        &self,
        ops: Vec<UserOperation>,
        recipient: Address,
    ) -> RpcResult<BatchReceipt>;

    /// Dry-runs the validation pass for a single operation.
    #[method(name = "simulateOperation")]
    async fn simulate_operation(&self, op: UserOperation) -> RpcResult<SimulationResult>;

    /// Returns stake records for the given sponsors.
    #[method(name = "getStakeInfo")]
    async fn get_stake_info(&self, sponsors: Vec<Address>) -> RpcResult<Vec<StakeRecord>>;

    /// Locks `amount` of the sponsor's balance as collateral.
    #[method(name = "addStake")]
    async fn add_stake(&self, sponsor: Address, amount: U256) -> RpcResult<()>;

    /// Starts the sponsor's withdrawal delay.
    #[method(name = "unlockStake")]
    async fn unlock_stake(&self, sponsor: Address) -> RpcResult<()>;

    /// Pays out the sponsor's collateral to `to` after the delay.
    #[method(name = "withdrawStake")]
    async fn withdraw_stake(&self, sponsor: Address, to: Address) -> RpcResult<U256>;

    /// Returns the singleton entry point address.
    #[method(name = "supportedEntryPoint")]
    async fn supported_entry_point(&self) -> RpcResult<Address>;
}

pub struct EntryPointRpcImpl {
    entry_point: Arc<Mutex<EntryPoint>>,
}

impl EntryPointRpcImpl {
    pub fn new(entry_point: Arc<Mutex<EntryPoint>>) -> Self {
        Self { entry_point }
    }
}

fn to_rpc_error(e: EntryPointError) -> ErrorObject<'static> {
    let data = match &e {
        EntryPointError::FailedOp { index, reason } => Some(json!({
            "failedOpIndex": index,
            "reason": reason.to_string(),
        })),
        _ => None,
    };
    ErrorObject::owned(-32000, format!("entry point error: {e}"), data)
}

#[async_trait]
impl EntryPointRpcServer for EntryPointRpcImpl {
    async fn submit_batch(
        &self,
        ops: Vec<UserOperation>,
        recipient: Address,
    ) -> RpcResult<BatchReceipt> {
        debug!(ops = ops.len(), %recipient, "received submitBatch request");

        let mut entry_point = self.entry_point.lock().await;
        match entry_point.submit_batch(&ops, recipient) {
            Ok(receipt) => {
                info!(fee = %receipt.fee_collected, "batch handled");
                Ok(receipt)
            }
            Err(e) => {
                error!("batch rejected: {e}");
                Err(to_rpc_error(e))
            }
        }
    }

    async fn simulate_operation(&self, op: UserOperation) -> RpcResult<SimulationResult> {
        debug!(target = %op.target, "received simulateOperation request");

        let mut entry_point = self.entry_point.lock().await;
        entry_point
            .simulate(dry_run_origin(), &op)
            .map_err(to_rpc_error)
    }

    async fn get_stake_info(&self, sponsors: Vec<Address>) -> RpcResult<Vec<StakeRecord>> {
        let entry_point = self.entry_point.lock().await;
        Ok(entry_point.get_stake_info(&sponsors))
    }

    async fn add_stake(&self, sponsor: Address, amount: U256) -> RpcResult<()> {
        debug!(%sponsor, %amount, "received addStake request");
        let mut entry_point = self.entry_point.lock().await;
        entry_point.add_stake(sponsor, amount).map_err(to_rpc_error)
    }

    async fn unlock_stake(&self, sponsor: Address) -> RpcResult<()> {
        debug!(%sponsor, "received unlockStake request");
        let mut entry_point = self.entry_point.lock().await;
        entry_point.unlock_stake(sponsor).map_err(to_rpc_error)
    }

    async fn withdraw_stake(&self, sponsor: Address, to: Address) -> RpcResult<U256> {
        debug!(%sponsor, %to, "received withdrawStake request");
        let mut entry_point = self.entry_point.lock().await;
        entry_point
            .withdraw_stake(sponsor, to)
            .map_err(to_rpc_error)
    }

    async fn supported_entry_point(&self) -> RpcResult<Address> {
        let entry_point = self.entry_point.lock().await;
        Ok(entry_point.address)
    }
}
