// src/gas.rs
use thiserror::Error;

/// Fixed gas schedule for the in-memory execution environment. Contract
/// behaviors charge these through the meter so that metering stays
/// deterministic across runs.
pub const SIG_CHECK_GAS: u64 = 3_000;
pub const TRANSFER_GAS: u64 = 9_000;
pub const DEPLOY_GAS: u64 = 32_000;
pub const STORAGE_GAS: u64 = 5_000;
pub const PAYMASTER_CHECK_GAS: u64 = 5_000;
pub const POST_OP_GAS: u64 = 4_000;
pub const CALLDATA_BYTE_GAS: u64 = 16;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("out of gas: budget {limit} exhausted")]
pub struct OutOfGas {
    pub limit: u64,
}

/// Metered gas budget for one contract invocation. Exceeding the budget is
/// a hard abort of that invocation only.
#[derive(Debug, Clone)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// Charges `amount` gas against the remaining budget.
    pub fn consume(&mut self, amount: u64) -> Result<(), OutOfGas> {
        let next = self.used.saturating_add(amount);
        if next > self.limit {
            // The failed charge still drains the budget, like an EVM
            // out-of-gas does.
            self.used = self.limit;
            return Err(OutOfGas { limit: self.limit });
        }
        self.used = next;
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_tracks_consumption() {
        let mut meter = GasMeter::new(10_000);
        meter.consume(3_000).unwrap();
        meter.consume(2_500).unwrap();
        assert_eq!(meter.used(), 5_500);
        assert_eq!(meter.remaining(), 4_500);
    }

    #[test]
    fn exceeding_budget_is_out_of_gas_and_drains_meter() {
        let mut meter = GasMeter::new(1_000);
        meter.consume(900).unwrap();
        let err = meter.consume(200).unwrap_err();
        assert_eq!(err, OutOfGas { limit: 1_000 });
        assert_eq!(meter.used(), 1_000);
        assert_eq!(meter.remaining(), 0);
    }
}
