// src/op.rs
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// One requested unit of work submitted for batched processing.
///
/// Exactly one funding path is active per operation: either `target` prepays
/// its own execution out of its balance (`paymaster: None`), or the named
/// paymaster covers the cost out of staked collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub target: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas: U256,
    pub verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster: Option<Address>,
    pub paymaster_data: Bytes,
    pub signer: Address,
    pub signature: Bytes,
}

fn push_u256(buf: &mut Vec<u8>, value: U256) {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    buf.extend_from_slice(&word);
}

impl UserOperation {
    /// Canonical packing of every field except the signature. Variable
    /// length byte fields enter as their keccak hash so the encoding has a
    /// fixed layout.
    pub fn pack(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(352);
        data.extend_from_slice(self.target.as_bytes());
        push_u256(&mut data, self.nonce);
        data.extend_from_slice(&keccak256(&self.init_code));
        data.extend_from_slice(&keccak256(&self.call_data));
        push_u256(&mut data, self.call_gas);
        push_u256(&mut data, self.verification_gas);
        push_u256(&mut data, self.max_fee_per_gas);
        push_u256(&mut data, self.max_priority_fee_per_gas);
        data.extend_from_slice(self.paymaster.unwrap_or_default().as_bytes());
        data.extend_from_slice(&keccak256(&self.paymaster_data));
        data.extend_from_slice(self.signer.as_bytes());
        data
    }

    /// Operation hash the signer commits to: the packed encoding hashed,
    /// then domain-separated with the entry point address and chain id.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let inner = keccak256(self.pack());

        let mut outer = Vec::with_capacity(84);
        outer.extend_from_slice(&inner);
        outer.extend_from_slice(entry_point.as_bytes());
        push_u256(&mut outer, U256::from(chain_id));
        H256::from(keccak256(&outer))
    }

    pub fn has_init_code(&self) -> bool {
        !self.init_code.is_empty()
    }

    /// Creation salt for a deploying operation: the nonce is repurposed as
    /// a salt, bound to the signer.
    pub fn creation_salt(&self) -> [u8; 32] {
        let mut data = Vec::with_capacity(52);
        data.extend_from_slice(self.signer.as_bytes());
        push_u256(&mut data, self.nonce);
        keccak256(&data)
    }

    /// Price actually paid per unit of gas under the current base fee.
    pub fn effective_gas_price(&self, base_fee: U256) -> U256 {
        let tip_capped = base_fee.saturating_add(self.max_priority_fee_per_gas);
        self.max_fee_per_gas.min(tip_capped)
    }

    /// Worst-case cost the payer must guarantee before execution.
    pub fn required_prefund(&self, base_fee: U256) -> U256 {
        self.call_gas
            .saturating_mul(self.effective_gas_price(base_fee))
    }
}

/// Deterministic create2-style address derivation:
/// `keccak(0xff ++ deployer ++ salt ++ keccak(init_code))[12..]`.
/// Pure: identical inputs always derive the identical address.
pub fn derive_address(deployer: Address, init_code: &Bytes, salt: [u8; 32]) -> Address {
    let mut data = Vec::with_capacity(85);
    data.push(0xff);
    data.extend_from_slice(deployer.as_bytes());
    data.extend_from_slice(&salt);
    data.extend_from_slice(&keccak256(init_code));
    Address::from_slice(&keccak256(&data)[12..])
}
