use alloy::primitives::{Address, B256, U256};

/// A decoded deposit, ready to be handed to one swap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub sender: Address,
    /// Deposited amount in wei.
    pub amount: U256,
}

/// Highest block already fully scanned and dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PollCursor(u64);

impl PollCursor {
    pub fn new(block: u64) -> Self {
        Self(block)
    }

    pub fn block(&self) -> u64 {
        self.0
    }

    /// Move forward to `block`. Never moves backwards.
    pub fn advance_to(&mut self, block: u64) {
        if block > self.0 {
            self.0 = block;
        }
    }
}
