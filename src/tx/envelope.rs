use alloy::consensus::{TxEip1559, TxLegacy};
use alloy::primitives::{Address, Bytes, TxKind, U256};

/// Fee fields of an envelope. Exactly one pricing model per transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeParams {
    Flat {
        gas_price: u128,
    },
    Dynamic {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

/// A fully-built, unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEnvelope {
    pub sender: Address,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    pub fee: FeeParams,
    pub nonce: u64,
    pub chain_id: u64,
}

/// Consensus-level transaction for the envelope's fee model.
pub enum UnsignedTx {
    Legacy(TxLegacy),
    Eip1559(TxEip1559),
}

impl TransactionEnvelope {
    pub fn to_unsigned(&self) -> UnsignedTx {
        match self.fee {
            FeeParams::Flat { gas_price } => UnsignedTx::Legacy(TxLegacy {
                chain_id: Some(self.chain_id),
                nonce: self.nonce,
                gas_price,
                gas_limit: self.gas_limit,
                to: TxKind::Call(self.to),
                value: self.value,
                input: self.input.clone(),
            }),
            FeeParams::Dynamic {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => UnsignedTx::Eip1559(TxEip1559 {
                chain_id: self.chain_id,
                nonce: self.nonce,
                gas_limit: self.gas_limit,
                max_fee_per_gas,
                max_priority_fee_per_gas,
                to: TxKind::Call(self.to),
                value: self.value,
                access_list: Default::default(),
                input: self.input.clone(),
            }),
        }
    }

    /// One-line summary for failure logs.
    pub fn describe(&self) -> String {
        let fee = match self.fee {
            FeeParams::Flat { gas_price } => format!("gas_price={}", gas_price),
            FeeParams::Dynamic {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => format!(
                "max_fee_per_gas={} max_priority_fee_per_gas={}",
                max_fee_per_gas, max_priority_fee_per_gas
            ),
        };
        format!(
            "from={} to={} value={} nonce={} gas_limit={} {} chain_id={} data=0x{}",
            self.sender,
            self.to,
            self.value,
            self.nonce,
            self.gas_limit,
            fee,
            self.chain_id,
            hex::encode(&self.input)
        )
    }
}
