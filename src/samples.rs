// src/samples.rs
//! Reference collaborator contracts: an ECDSA-checked account, its
//! factory, and a voucher-gated sponsoring paymaster. Used by the demo
//! genesis in `main` and by the integration tests; the protocol core only
//! ever sees them through the `contracts` traits.

use ethers::types::{Address, Bytes, RecoveryMessage, Signature, H256, U256};
use tracing::debug;

use crate::contracts::{Account, AccountFactory, Paymaster};
use crate::error::Revert;
use crate::execution::ExecutionMode;
use crate::gas::{PAYMASTER_CHECK_GAS, POST_OP_GAS, SIG_CHECK_GAS, STORAGE_GAS};
use crate::op::UserOperation;
use crate::world::CallContext;

/// Storage slot where `SimpleAccount` keeps its replay nonce.
pub const NONCE_SLOT: U256 = U256::zero();

/// Storage slot where `SponsoringPaymaster` accumulates settled cost.
pub const SPENT_SLOT: U256 = U256::zero();

/// Single-owner account. Authenticates the owner's ECDSA signature over
/// the operation hash and enforces a sequential nonce for non-creating
/// operations (a creating operation's nonce is its salt and was already
/// bound by address derivation).
#[derive(Debug, Clone)]
pub struct SimpleAccount {
    pub owner: Address,
}

impl SimpleAccount {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }
}

impl Account for SimpleAccount {
    fn validate_and_pay(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: H256,
        required_prefund: U256,
    ) -> Result<U256, Revert> {
        ctx.consume(SIG_CHECK_GAS)?;

        let signature = Signature::try_from(op.signature.as_ref())
            .map_err(|e| Revert::msg(format!("malformed signature: {e}")))?;
        let recovered = signature
            .recover(RecoveryMessage::Hash(op_hash))
            .map_err(|e| Revert::msg(format!("unrecoverable signature: {e}")))?;
        if recovered != self.owner || op.signer != self.owner {
            return Err(Revert::msg("signature does not match account owner"));
        }

        if !op.has_init_code() {
            ctx.consume(STORAGE_GAS)?;
            let expected = ctx.sload(NONCE_SLOT);
            if op.nonce != expected {
                return Err(Revert::msg(format!(
                    "nonce mismatch: expected {expected}, got {}",
                    op.nonce
                )));
            }
            ctx.sstore(NONCE_SLOT, expected + U256::one());
        }

        if !required_prefund.is_zero() {
            let entry_point = ctx.entry_point;
            ctx.transfer(entry_point, required_prefund)?;
        }
        Ok(required_prefund)
    }

    fn execute_requested(
        &self,
        ctx: &mut CallContext<'_>,
        call_data: &Bytes,
    ) -> Result<Bytes, Revert> {
        if call_data.is_empty() {
            return Ok(Bytes::default());
        }
        let (to, value, burn_gas) = decode_execute(call_data)?;
        ctx.consume(burn_gas)?;
        if !value.is_zero() {
            ctx.transfer(to, value)?;
        }
        Ok(Bytes::default())
    }
}

/// Packs a `SimpleAccount` inner call: recipient, value, and extra gas the
/// call should burn.
pub fn encode_execute(to: Address, value: U256, burn_gas: u64) -> Bytes {
    let mut data = Vec::with_capacity(60);
    data.extend_from_slice(to.as_bytes());
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    data.extend_from_slice(&word);
    data.extend_from_slice(&burn_gas.to_be_bytes());
    Bytes::from(data)
}

fn decode_execute(call_data: &Bytes) -> Result<(Address, U256, u64), Revert> {
    if call_data.len() != 60 {
        return Err(Revert::msg("malformed inner call"));
    }
    let to = Address::from_slice(&call_data[..20]);
    let value = U256::from_big_endian(&call_data[20..52]);
    let mut burn = [0u8; 8];
    burn.copy_from_slice(&call_data[52..60]);
    Ok((to, value, u64::from_be_bytes(burn)))
}

/// Deploys `SimpleAccount`s; constructor arguments are the 20-byte owner.
#[derive(Debug, Default)]
pub struct SimpleAccountFactory;

impl AccountFactory for SimpleAccountFactory {
    fn instantiate(&self, args: &[u8]) -> Result<Box<dyn Account>, Revert> {
        if args.len() != 20 {
            return Err(Revert::msg("factory expects a 20-byte owner"));
        }
        let owner = Address::from_slice(args);
        debug!(%owner, "instantiating simple account");
        Ok(Box::new(SimpleAccount::new(owner)))
    }
}

/// Sponsors any operation presenting the configured voucher bytes in its
/// paymaster data. Accumulates everything it has paid for in storage so
/// the settle hook's accounting is externally observable.
#[derive(Debug, Clone)]
pub struct SponsoringPaymaster {
    pub voucher: Bytes,
}

impl SponsoringPaymaster {
    pub fn new(voucher: Bytes) -> Self {
        Self { voucher }
    }
}

impl Paymaster for SponsoringPaymaster {
    fn validate_and_stake(
        &self,
        ctx: &mut CallContext<'_>,
        op: &UserOperation,
        op_hash: H256,
        max_cost: U256,
    ) -> Result<Bytes, Revert> {
        ctx.consume(PAYMASTER_CHECK_GAS)?;
        if op.paymaster_data != self.voucher {
            return Err(Revert::msg("missing or invalid sponsorship voucher"));
        }

        // Context: the sponsored target and the promised worst case,
        // echoed back to the settle hook.
        let mut context = Vec::with_capacity(52);
        context.extend_from_slice(op.target.as_bytes());
        let mut word = [0u8; 32];
        max_cost.to_big_endian(&mut word);
        context.extend_from_slice(&word);
        debug!(%op_hash, target = %op.target, %max_cost, "operation sponsored");
        Ok(Bytes::from(context))
    }

    fn settle(
        &self,
        ctx: &mut CallContext<'_>,
        _mode: ExecutionMode,
        context: &Bytes,
        actual_cost: U256,
    ) -> Result<(), Revert> {
        ctx.consume(POST_OP_GAS)?;
        if context.len() != 52 {
            return Err(Revert::msg("malformed settle context"));
        }
        let spent = ctx.sload(SPENT_SLOT);
        ctx.sstore(SPENT_SLOT, spent.saturating_add(actual_cost));
        Ok(())
    }
}
