// tests/common/mod.rs
//! Shared harness: an entry point over a demo genesis, deterministic
//! wallets, and signed-operation builders.
#![allow(dead_code)]

use aa_entrypoint::samples::{SimpleAccount, SimpleAccountFactory, SponsoringPaymaster};
use aa_entrypoint::{EntryPoint, UserOperation};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, U256};

pub const CHAIN_ID: u64 = 31337;
pub const BASE_FEE: u64 = 10;
pub const PRIORITY_FEE: u64 = 2;

pub fn entry_point_addr() -> Address {
    Address::from_low_u64_be(0x4337)
}

pub fn factory_addr() -> Address {
    Address::from_low_u64_be(0xfac7041)
}

pub fn paymaster_addr() -> Address {
    Address::from_low_u64_be(0x9a13a57e1)
}

pub fn recipient_addr() -> Address {
    Address::from_low_u64_be(0xfee)
}

pub fn voucher() -> Bytes {
    Bytes::from_static(b"sponsored")
}

/// Entry point with a registered account factory and sponsoring paymaster.
/// The paymaster starts unfunded and unstaked; tests stake as needed.
pub fn harness() -> EntryPoint {
    let mut entry_point = EntryPoint::new(
        entry_point_addr(),
        CHAIN_ID,
        U256::from(BASE_FEE),
        U256::from(PRIORITY_FEE),
    );
    entry_point
        .world
        .register_factory(factory_addr(), Box::new(SimpleAccountFactory));
    entry_point
        .world
        .register_paymaster(paymaster_addr(), Box::new(SponsoringPaymaster::new(voucher())));
    entry_point
}

pub fn wallet(seed: u8) -> LocalWallet {
    assert_ne!(seed, 0);
    LocalWallet::from_bytes(&[seed; 32]).expect("valid key bytes")
}

/// Deploys a `SimpleAccount` owned by `wallet` at the owner's own address
/// and funds it.
pub fn add_account(entry_point: &mut EntryPoint, wallet: &LocalWallet, balance: U256) -> Address {
    let addr = wallet.address();
    entry_point
        .world
        .deploy_account(addr, Box::new(SimpleAccount::new(wallet.address())));
    entry_point.world.fund(addr, balance);
    addr
}

/// Recomputes the operation hash and signs it with `wallet`. Call after
/// any field edit.
pub fn sign(entry_point: &EntryPoint, wallet: &LocalWallet, op: &mut UserOperation) {
    op.signer = wallet.address();
    let hash = op.hash(entry_point.address, entry_point.world.chain_id);
    let signature = wallet.sign_hash(hash).expect("signing");
    op.signature = Bytes::from(signature.to_vec());
}

/// Baseline self-funded operation with an empty call, signed.
pub fn base_op(
    entry_point: &EntryPoint,
    wallet: &LocalWallet,
    target: Address,
    nonce: u64,
) -> UserOperation {
    let mut op = UserOperation {
        target,
        nonce: U256::from(nonce),
        init_code: Bytes::default(),
        call_data: Bytes::default(),
        call_gas: U256::from(100_000),
        verification_gas: U256::from(100_000),
        max_fee_per_gas: U256::from(50),
        max_priority_fee_per_gas: U256::from(PRIORITY_FEE),
        paymaster: None,
        paymaster_data: Bytes::default(),
        signer: wallet.address(),
        signature: Bytes::default(),
    };
    sign(entry_point, wallet, &mut op);
    op
}

pub fn required_prefund(op: &UserOperation) -> U256 {
    op.required_prefund(U256::from(BASE_FEE))
}

pub fn one_ether() -> U256 {
    U256::exp10(18)
}
