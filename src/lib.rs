// src/lib.rs
//! Account-abstraction batch settlement engine: a singleton entry point
//! that validates user-submitted operations, executes their calls in
//! isolated failure domains, and settles metered gas against account
//! prefunds or staked paymaster collateral.

pub mod contracts;
pub mod entrypoint;
pub mod error;
pub mod events;
pub mod execution;
pub mod gas;
pub mod op;
pub mod rpc;
pub mod samples;
pub mod settlement;
pub mod stake;
pub mod validation;
pub mod world;

pub use entrypoint::{dry_run_origin, BatchReceipt, EntryPoint, OpReceipt, SimulationResult};
pub use error::{EntryPointError, OpError, Revert};
pub use events::Event;
pub use execution::ExecutionMode;
pub use op::{derive_address, UserOperation};
pub use stake::{minimum_stake, StakeLedger, StakeRecord, STAKE_UNLOCK_DELAY};
pub use world::World;
