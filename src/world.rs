// src/world.rs
use std::collections::{HashMap, HashSet};

use ethers::types::{Address, Bytes, H256, U256};
use thiserror::Error;
use tracing::debug;

use crate::contracts::{Account, AccountFactory, Paymaster};
use crate::error::{OpError, Revert};
use crate::execution::ExecutionMode;
use crate::gas::{GasMeter, CALLDATA_BYTE_GAS, TRANSFER_GAS};
use crate::op::UserOperation;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient balance: {from} has {balance}, needs {amount}")]
    InsufficientBalance {
        from: Address,
        balance: U256,
        amount: U256,
    },

    #[error("{0} refuses incoming transfers")]
    Rejected(Address),
}

/// Mutable chain state touched by contract behaviors: balances and storage
/// words. Clonable so the execution sandbox can snapshot and roll back.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    balances: HashMap<Address, U256>,
    storage: HashMap<(Address, U256), U256>,
    // Addresses that reject incoming value, like a contract without a
    // receive function.
    no_receive: HashSet<Address>,
}

impl WorldState {
    pub fn balance(&self, addr: Address) -> U256 {
        self.balances.get(&addr).copied().unwrap_or_default()
    }

    pub fn credit(&mut self, to: Address, amount: U256) -> Result<(), TransferError> {
        if self.no_receive.contains(&to) {
            return Err(TransferError::Rejected(to));
        }
        let balance = self.balances.entry(to).or_default();
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TransferError> {
        let balance = self.balance(from);
        if balance < amount {
            return Err(TransferError::InsufficientBalance {
                from,
                balance,
                amount,
            });
        }
        if self.no_receive.contains(&to) {
            return Err(TransferError::Rejected(to));
        }
        self.balances.insert(from, balance - amount);
        let to_balance = self.balances.entry(to).or_default();
        *to_balance = to_balance.saturating_add(amount);
        Ok(())
    }

    pub fn sload(&self, addr: Address, slot: U256) -> U256 {
        self.storage.get(&(addr, slot)).copied().unwrap_or_default()
    }

    pub fn sstore(&mut self, addr: Address, slot: U256, value: U256) {
        self.storage.insert((addr, slot), value);
    }
}

/// View a contract behavior gets on the world during one metered
/// invocation: the mutable state, the gas budget, and its own identity.
pub struct CallContext<'a> {
    state: &'a mut WorldState,
    meter: &'a mut GasMeter,
    /// Address of the contract being invoked.
    pub this: Address,
    pub entry_point: Address,
    pub timestamp: u64,
}

impl CallContext<'_> {
    pub fn consume(&mut self, gas: u64) -> Result<(), Revert> {
        self.meter
            .consume(gas)
            .map_err(|e| Revert::msg(e.to_string()))
    }

    pub fn balance(&self, addr: Address) -> U256 {
        self.state.balance(addr)
    }

    /// Moves value out of the invoked contract's own balance.
    pub fn transfer(&mut self, to: Address, amount: U256) -> Result<(), Revert> {
        self.consume(TRANSFER_GAS)?;
        self.state
            .transfer(self.this, to, amount)
            .map_err(|e| Revert::msg(e.to_string()))
    }

    pub fn sload(&self, slot: U256) -> U256 {
        self.state.sload(self.this, slot)
    }

    pub fn sstore(&mut self, slot: U256, value: U256) {
        self.state.sstore(self.this, slot, value);
    }
}

/// Single-threaded execution environment the entry point runs against:
/// balances, deployed contract behaviors, and the fee parameters of the
/// current submission.
pub struct World {
    pub entry_point: Address,
    pub chain_id: u64,
    pub base_fee: U256,
    /// Network-supplied priority fee for the current submission; every
    /// operation's declared max priority fee must cover it.
    pub priority_fee: U256,
    pub timestamp: u64,
    state: WorldState,
    accounts: HashMap<Address, Box<dyn Account>>,
    paymasters: HashMap<Address, Box<dyn Paymaster>>,
    factories: HashMap<Address, Box<dyn AccountFactory>>,
}

impl World {
    pub fn new(entry_point: Address, chain_id: u64, base_fee: U256, priority_fee: U256) -> Self {
        Self {
            entry_point,
            chain_id,
            base_fee,
            priority_fee,
            timestamp: 0,
            state: WorldState::default(),
            accounts: HashMap::new(),
            paymasters: HashMap::new(),
            factories: HashMap::new(),
        }
    }

    // ---- genesis / registry ----

    /// Credits `addr` unconditionally. Genesis and test funding only.
    pub fn fund(&mut self, addr: Address, amount: U256) {
        let balance = self.state.balances.entry(addr).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Makes `addr` reject all incoming transfers from now on.
    pub fn mark_no_receive(&mut self, addr: Address) {
        self.state.no_receive.insert(addr);
    }

    pub fn deploy_account(&mut self, addr: Address, account: Box<dyn Account>) {
        self.accounts.insert(addr, account);
    }

    pub fn register_paymaster(&mut self, addr: Address, paymaster: Box<dyn Paymaster>) {
        self.paymasters.insert(addr, paymaster);
    }

    pub fn register_factory(&mut self, addr: Address, factory: Box<dyn AccountFactory>) {
        self.factories.insert(addr, factory);
    }

    pub fn is_deployed(&self, addr: Address) -> bool {
        self.accounts.contains_key(&addr)
    }

    pub fn has_paymaster(&self, addr: Address) -> bool {
        self.paymasters.contains_key(&addr)
    }

    /// Removes a deployed account behavior. Used by simulation to discard
    /// a dry-run deployment.
    pub fn remove_account(&mut self, addr: Address) {
        self.accounts.remove(&addr);
    }

    // ---- state access ----

    pub fn balance(&self, addr: Address) -> U256 {
        self.state.balance(addr)
    }

    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), TransferError> {
        self.state.transfer(from, to, amount)
    }

    pub fn storage_at(&self, addr: Address, slot: U256) -> U256 {
        self.state.sload(addr, slot)
    }

    pub fn snapshot(&self) -> WorldState {
        self.state.clone()
    }

    pub fn restore(&mut self, snapshot: WorldState) {
        self.state = snapshot;
    }

    // ---- deployment ----

    /// Instantiates the account named by `init_code` at `derived`. The
    /// first 20 bytes of init code address the factory, the remainder are
    /// constructor arguments.
    pub fn deploy_from_init_code(
        &mut self,
        derived: Address,
        init_code: &Bytes,
    ) -> Result<(), OpError> {
        if self.accounts.contains_key(&derived) {
            return Err(OpError::AlreadyDeployed(derived));
        }
        if init_code.len() < 20 {
            return Err(Revert::msg("init code shorter than a factory address").into());
        }
        let factory_addr = Address::from_slice(&init_code[..20]);
        let factory = self
            .factories
            .get(&factory_addr)
            .ok_or(OpError::UnknownFactory(factory_addr))?;
        let account = factory.instantiate(&init_code[20..])?;
        debug!(target = %derived, factory = %factory_addr, "account deployed");
        self.accounts.insert(derived, account);
        Ok(())
    }

    // ---- metered invocations ----

    fn context<'a>(
        state: &'a mut WorldState,
        meter: &'a mut GasMeter,
        this: Address,
        entry_point: Address,
        timestamp: u64,
    ) -> CallContext<'a> {
        CallContext {
            state,
            meter,
            this,
            entry_point,
            timestamp,
        }
    }

    pub fn call_validate_and_pay(
        &mut self,
        target: Address,
        op: &UserOperation,
        op_hash: H256,
        required_prefund: U256,
        meter: &mut GasMeter,
    ) -> Result<U256, Revert> {
        let account = self
            .accounts
            .get(&target)
            .ok_or_else(|| Revert::msg("no code at target"))?;
        let mut ctx = Self::context(&mut self.state, meter, target, self.entry_point, self.timestamp);
        account.validate_and_pay(&mut ctx, op, op_hash, required_prefund)
    }

    pub fn call_execute(
        &mut self,
        target: Address,
        call_data: &Bytes,
        meter: &mut GasMeter,
    ) -> Result<Bytes, Revert> {
        let account = self
            .accounts
            .get(&target)
            .ok_or_else(|| Revert::msg("no code at target"))?;
        // Intrinsic calldata cost comes off the call budget first.
        meter
            .consume(call_data.len() as u64 * CALLDATA_BYTE_GAS)
            .map_err(|e| Revert::msg(e.to_string()))?;
        let mut ctx = Self::context(&mut self.state, meter, target, self.entry_point, self.timestamp);
        account.execute_requested(&mut ctx, call_data)
    }

    pub fn call_paymaster_validate(
        &mut self,
        paymaster: Address,
        op: &UserOperation,
        op_hash: H256,
        max_cost: U256,
        meter: &mut GasMeter,
    ) -> Result<Bytes, Revert> {
        let behavior = self
            .paymasters
            .get(&paymaster)
            .ok_or_else(|| Revert::msg("no code at paymaster"))?;
        let mut ctx = Self::context(
            &mut self.state,
            meter,
            paymaster,
            self.entry_point,
            self.timestamp,
        );
        behavior.validate_and_stake(&mut ctx, op, op_hash, max_cost)
    }

    pub fn call_paymaster_settle(
        &mut self,
        paymaster: Address,
        mode: ExecutionMode,
        context: &Bytes,
        actual_cost: U256,
        meter: &mut GasMeter,
    ) -> Result<(), Revert> {
        let behavior = self
            .paymasters
            .get(&paymaster)
            .ok_or_else(|| Revert::msg("no code at paymaster"))?;
        let mut ctx = Self::context(
            &mut self.state,
            meter,
            paymaster,
            self.entry_point,
            self.timestamp,
        );
        behavior.settle(&mut ctx, mode, context, actual_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_moves_value() {
        let mut state = WorldState::default();
        state.credit(Address::from_low_u64_be(1), U256::from(100)).unwrap();
        state
            .transfer(
                Address::from_low_u64_be(1),
                Address::from_low_u64_be(2),
                U256::from(40),
            )
            .unwrap();
        assert_eq!(state.balance(Address::from_low_u64_be(1)), U256::from(60));
        assert_eq!(state.balance(Address::from_low_u64_be(2)), U256::from(40));
    }

    #[test]
    fn transfer_checks_balance_and_receiver() {
        let mut state = WorldState::default();
        let a = Address::from_low_u64_be(1);
        let b = Address::from_low_u64_be(2);
        state.credit(a, U256::from(10)).unwrap();

        assert!(matches!(
            state.transfer(a, b, U256::from(11)),
            Err(TransferError::InsufficientBalance { .. })
        ));

        state.no_receive.insert(b);
        assert_eq!(
            state.transfer(a, b, U256::from(5)),
            Err(TransferError::Rejected(b))
        );
        assert_eq!(state.balance(a), U256::from(10));
    }

    #[test]
    fn snapshot_restore_rolls_back_state() {
        let ep = Address::from_low_u64_be(0x4337);
        let mut world = World::new(ep, 1, U256::from(10), U256::from(1));
        let a = Address::from_low_u64_be(1);
        world.fund(a, U256::from(100));

        let snap = world.snapshot();
        world.transfer(a, ep, U256::from(100)).unwrap();
        world.state.sstore(a, U256::zero(), U256::from(7));

        world.restore(snap);
        assert_eq!(world.balance(a), U256::from(100));
        assert_eq!(world.balance(ep), U256::zero());
        assert_eq!(world.state.sload(a, U256::zero()), U256::zero());
    }
}
