// tests/validation.rs
//! Validation-pass behavior: target resolution, funding-path checks, and
//! the all-or-nothing batch rejection contract.

mod common;

use aa_entrypoint::contracts::Account;
use aa_entrypoint::world::CallContext;
use aa_entrypoint::{derive_address, dry_run_origin, EntryPointError, OpError, Revert, UserOperation};
use common::*;
use ethers::signers::Signer;
use ethers::types::{Address, Bytes, H256, U256};

/// Test account that escrows only half of what is asked of it.
#[derive(Debug)]
struct PartialPayer;

impl Account for PartialPayer {
    fn validate_and_pay(
        &self,
        ctx: &mut CallContext<'_>,
        _op: &UserOperation,
        _op_hash: H256,
        required_prefund: U256,
    ) -> Result<U256, Revert> {
        let entry_point = ctx.entry_point;
        let half = required_prefund / U256::from(2);
        ctx.transfer(entry_point, half)?;
        Ok(half)
    }

    fn execute_requested(
        &self,
        _ctx: &mut CallContext<'_>,
        _call_data: &Bytes,
    ) -> Result<Bytes, Revert> {
        Ok(Bytes::default())
    }
}

/// Test account that escrows value even when nothing is required of it.
#[derive(Debug)]
struct GreedyPrepayer;

impl Account for GreedyPrepayer {
    fn validate_and_pay(
        &self,
        ctx: &mut CallContext<'_>,
        _op: &UserOperation,
        _op_hash: H256,
        _required_prefund: U256,
    ) -> Result<U256, Revert> {
        let entry_point = ctx.entry_point;
        ctx.transfer(entry_point, U256::from(1_000))?;
        Ok(U256::from(1_000))
    }

    fn execute_requested(
        &self,
        _ctx: &mut CallContext<'_>,
        _call_data: &Bytes,
    ) -> Result<Bytes, Revert> {
        Ok(Bytes::default())
    }
}

fn creating_op(entry_point: &aa_entrypoint::EntryPoint, seed: u8, nonce: u64) -> UserOperation {
    let w = wallet(seed);
    let mut init_code = Vec::with_capacity(40);
    init_code.extend_from_slice(factory_addr().as_bytes());
    init_code.extend_from_slice(w.address().as_bytes());

    let mut op = base_op(entry_point, &w, Address::zero(), nonce);
    op.init_code = Bytes::from(init_code);
    op.target = derive_address(entry_point.address, &op.init_code, op.creation_salt());
    sign(entry_point, &w, &mut op);
    op
}

#[test]
fn unknown_target_rejects_the_batch() {
    let mut ep = harness();
    let w = wallet(1);
    let op = base_op(&ep, &w, Address::from_low_u64_be(0xdead), 0);

    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert_eq!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::UnknownTarget(Address::from_low_u64_be(0xdead)),
        }
    );
}

#[test]
fn failing_op_is_reported_with_its_index() {
    let mut ep = harness();
    let w1 = wallet(1);
    let ok_target = add_account(&mut ep, &w1, one_ether());
    let op0 = base_op(&ep, &w1, ok_target, 0);

    let w2 = wallet(2);
    let op1 = base_op(&ep, &w2, Address::from_low_u64_be(0xdead), 0);

    let err = ep
        .submit_batch(&[op0.clone(), op1], recipient_addr())
        .unwrap_err();
    assert!(matches!(err, EntryPointError::FailedOp { index: 1, .. }));

    // The rejected batch cost the valid operation nothing: its escrow and
    // nonce are untouched, so it can be resubmitted as is.
    assert_eq!(ep.world.balance(ok_target), one_ether());
    let receipt = ep.submit_batch(&[op0], recipient_addr()).unwrap();
    assert!(receipt.receipts[0].success);
}

#[test]
fn target_mismatch_on_creation() {
    let mut ep = harness();
    let mut op = creating_op(&ep, 1, 0);
    let derived = op.target;
    op.target = Address::from_low_u64_be(0xbad);
    sign(&ep, &wallet(1), &mut op);
    ep.world.fund(op.target, one_ether());

    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert_eq!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::TargetMismatch {
                declared: Address::from_low_u64_be(0xbad),
                derived,
            },
        }
    );
}

#[test]
fn creation_is_deterministic_and_not_repeatable() {
    let mut ep = harness();
    let op = creating_op(&ep, 1, 7);
    // Derivation is pure.
    assert_eq!(
        op.target,
        derive_address(ep.address, &op.init_code, op.creation_salt())
    );

    ep.world.fund(op.target, one_ether());
    let receipt = ep.submit_batch(&[op.clone()], recipient_addr()).unwrap();
    assert!(receipt.receipts[0].success);
    assert!(ep.world.is_deployed(op.target));

    // Replaying the creating operation must fail, not silently succeed.
    let err = ep.submit_batch(&[op.clone()], recipient_addr()).unwrap_err();
    assert_eq!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::AlreadyDeployed(op.target),
        }
    );
}

#[test]
fn oversized_gas_budgets_fail_the_operation() {
    let mut ep = harness();
    let w = wallet(1);
    let target = add_account(&mut ep, &w, one_ether());
    let too_big = U256::from(u64::MAX) + U256::one();

    // Budgets beyond the metering range must be rejected like any other
    // invalid operation, never tear down the batch processor.
    let mut op = base_op(&ep, &w, target, 0);
    op.verification_gas = too_big;
    sign(&ep, &w, &mut op);
    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert_eq!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::GasBudgetTooLarge(too_big),
        }
    );

    let mut op = base_op(&ep, &w, target, 0);
    op.call_gas = U256::MAX;
    sign(&ep, &w, &mut op);
    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert_eq!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::GasBudgetTooLarge(U256::MAX),
        }
    );

    // The account is untouched and still usable.
    assert_eq!(ep.world.balance(target), one_ether());
    let op = base_op(&ep, &w, target, 0);
    let receipt = ep.submit_batch(&[op], recipient_addr()).unwrap();
    assert!(receipt.receipts[0].success);
}

#[test]
fn bad_signature_is_a_validation_failure() {
    let mut ep = harness();
    let w = wallet(1);
    let target = add_account(&mut ep, &w, one_ether());
    let mut op = base_op(&ep, &w, target, 0);
    // Signed by someone who is not the owner.
    sign(&ep, &wallet(2), &mut op);
    op.signer = w.address();

    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert!(matches!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::ValidationReverted(_),
        }
    ));
}

#[test]
fn replayed_nonce_is_rejected() {
    let mut ep = harness();
    let w = wallet(1);
    let target = add_account(&mut ep, &w, one_ether());
    let op = base_op(&ep, &w, target, 0);

    ep.submit_batch(&[op.clone()], recipient_addr()).unwrap();
    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert!(matches!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::ValidationReverted(_),
        }
    ));
}

#[test]
fn prepay_shortfall() {
    let mut ep = harness();
    let target = Address::from_low_u64_be(0x5105);
    ep.world.deploy_account(target, Box::new(PartialPayer));
    ep.world.fund(target, one_ether());

    let op = base_op(&ep, &wallet(1), target, 0);
    let required = required_prefund(&op);

    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert_eq!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::PrepayShortfall {
                required,
                escrowed: required / U256::from(2),
            },
        }
    );
}

#[test]
fn paymaster_backed_op_must_not_prepay() {
    let mut ep = harness();
    let target = Address::from_low_u64_be(0x6ee);
    ep.world.deploy_account(target, Box::new(GreedyPrepayer));
    ep.world.fund(target, one_ether());
    ep.world.fund(paymaster_addr(), one_ether() * U256::from(3));
    ep.add_stake(paymaster_addr(), one_ether() * U256::from(2))
        .unwrap();

    let mut op = base_op(&ep, &wallet(1), target, 0);
    op.paymaster = Some(paymaster_addr());
    op.paymaster_data = voucher();
    sign(&ep, &wallet(1), &mut op);

    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert_eq!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::UnexpectedPrepay(U256::from(1_000)),
        }
    );
}

#[test]
fn unstaked_paymaster_is_insufficient() {
    let mut ep = harness();
    let w = wallet(1);
    let target = add_account(&mut ep, &w, U256::zero());

    let mut op = base_op(&ep, &w, target, 0);
    op.paymaster = Some(paymaster_addr());
    op.paymaster_data = voucher();
    sign(&ep, &w, &mut op);

    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert!(matches!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::InsufficientStake { .. },
        }
    ));
}

#[test]
fn unknown_paymaster_is_rejected() {
    let mut ep = harness();
    let w = wallet(1);
    let target = add_account(&mut ep, &w, U256::zero());

    let mut op = base_op(&ep, &w, target, 0);
    op.paymaster = Some(Address::from_low_u64_be(0x404));
    sign(&ep, &w, &mut op);

    let err = ep.submit_batch(&[op], recipient_addr()).unwrap_err();
    assert_eq!(
        err,
        EntryPointError::FailedOp {
            index: 0,
            reason: OpError::UnknownPaymaster(Address::from_low_u64_be(0x404)),
        }
    );
}

#[test]
fn simulate_rejects_real_origins() {
    let mut ep = harness();
    let w = wallet(1);
    let target = add_account(&mut ep, &w, one_ether());
    let op = base_op(&ep, &w, target, 0);

    let err = ep
        .simulate(Address::from_low_u64_be(0xcafe), &op)
        .unwrap_err();
    assert_eq!(err, EntryPointError::InvalidSimulationOrigin);
}

#[test]
fn simulate_leaves_no_trace() {
    let mut ep = harness();
    let w = wallet(1);
    let target = add_account(&mut ep, &w, one_ether());
    let op = base_op(&ep, &w, target, 0);

    let result = ep.simulate(dry_run_origin(), &op).unwrap();
    assert_eq!(result.op_hash, op.hash(ep.address, CHAIN_ID));
    assert_eq!(result.prefund, required_prefund(&op));
    assert!(result.validation_gas_used > 0);

    // No escrow kept, no nonce consumed: the same operation still submits.
    assert_eq!(ep.world.balance(target), one_ether());
    assert_eq!(ep.world.balance(ep.address), U256::zero());
    let receipt = ep.submit_batch(&[op], recipient_addr()).unwrap();
    assert!(receipt.receipts[0].success);
}

#[test]
fn simulate_discards_dry_run_deployment() {
    let mut ep = harness();
    let op = creating_op(&ep, 3, 0);
    ep.world.fund(op.target, one_ether());

    ep.simulate(dry_run_origin(), &op).unwrap();
    assert!(!ep.world.is_deployed(op.target));

    // The real submission can still create the account.
    let receipt = ep.submit_batch(&[op.clone()], recipient_addr()).unwrap();
    assert!(receipt.receipts[0].success);
    assert!(ep.world.is_deployed(op.target));
}
