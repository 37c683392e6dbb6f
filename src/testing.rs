//! In-memory chain used by unit tests.

use alloy::eips::eip1559::Eip1559Estimation;
use alloy::primitives::{keccak256, Address, Bytes, LogData, B256, U256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::chain::{ChainClient, ReceiptSummary};
use crate::listener::decoder::eth_received_topic;
use crate::swap::router::IUniswapV2Router02;

pub const TEST_CHAIN_ID: u64 = 11_155_111;

/// Build an `ETHReceived` log with an indexed sender.
pub fn deposit_log(block: u64, log_index: u64, sender: Address, amount: U256) -> Log {
    let tx_hash = keccak256(format!("tx-{}-{}", block, log_index));
    Log {
        inner: alloy::primitives::Log {
            address: Address::repeat_byte(0xCC),
            data: LogData::new_unchecked(
                vec![eth_received_topic(), sender.into_word()],
                Bytes::from(amount.to_be_bytes::<32>().to_vec()),
            ),
        },
        block_number: Some(block),
        transaction_hash: Some(tx_hash),
        log_index: Some(log_index),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct FakeState {
    pub head: u64,
    pub logs: Vec<Log>,
    /// Remaining `eth_getLogs` / `eth_blockNumber` calls that fail.
    pub fail_polls: u32,
    pub log_queries: Vec<(u64, u64)>,
    /// 1-based `eth_getLogs` call that fails once, leaving other calls alone.
    pub fail_log_query_at: Option<usize>,
    /// Output amount returned by `getAmountsOut`; `None` reverts.
    pub quote_output: Option<U256>,
    pub quote_delays: VecDeque<Duration>,
    pub fail_estimate: bool,
    pub gas_estimate: u64,
    pub gas_price: u128,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub pending_nonce: u64,
    /// Remaining `eth_sendRawTransaction` calls that fail, with the error text.
    pub send_failures: u32,
    pub send_error: String,
    pub sent: Vec<Bytes>,
    pub known: HashSet<B256>,
    pub receipts: HashMap<B256, bool>,
    /// When set, receipts for sent transactions are produced automatically.
    pub auto_mine: Option<bool>,
    pub calls: Vec<TransactionRequest>,
    pub estimates: Vec<TransactionRequest>,
}

pub struct FakeChain {
    pub chain_id: u64,
    pub state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(chain_id: u64) -> Self {
        let state = FakeState {
            quote_output: Some(U256::from(3_000_000_000u64)),
            gas_estimate: 150_000,
            gas_price: 20_000_000_000,
            max_fee_per_gas: 40_000_000_000,
            max_priority_fee_per_gas: 2_000_000_000,
            send_error: "connection reset".to_string(),
            auto_mine: Some(true),
            ..Default::default()
        };
        Self {
            chain_id,
            state: Mutex::new(state),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn chain_id(&self) -> eyre::Result<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> eyre::Result<u64> {
        let mut state = self.state.lock().unwrap();
        if state.fail_polls > 0 {
            state.fail_polls -= 1;
            return Err(eyre::eyre!("eth_blockNumber failed: connection refused"));
        }
        Ok(state.head)
    }

    async fn get_logs(&self, filter: &Filter) -> eyre::Result<Vec<Log>> {
        let mut state = self.state.lock().unwrap();
        let from = filter.get_from_block().unwrap_or(0);
        let to = filter.get_to_block().unwrap_or(state.head);
        state.log_queries.push((from, to));
        if state.fail_log_query_at == Some(state.log_queries.len()) {
            return Err(eyre::eyre!("eth_getLogs failed: upstream timeout"));
        }
        if state.fail_polls > 0 {
            state.fail_polls -= 1;
            return Err(eyre::eyre!("eth_getLogs failed: connection refused"));
        }
        let mut logs: Vec<Log> = state
            .logs
            .iter()
            .filter(|l| {
                let block = l.block_number.unwrap_or(0);
                block >= from && block <= to
            })
            .cloned()
            .collect();
        logs.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(logs)
    }

    async fn call(&self, request: TransactionRequest) -> eyre::Result<Bytes> {
        let (output, delay) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(request.clone());
            (state.quote_output, state.quote_delays.pop_front())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let input = request.input.input().cloned().unwrap_or_default();
        let decoded = IUniswapV2Router02::getAmountsOutCall::abi_decode(&input)
            .map_err(|e| eyre::eyre!("unexpected call: {}", e))?;
        let output = output.ok_or_else(|| {
            eyre::eyre!("execution reverted: UniswapV2Library: INSUFFICIENT_LIQUIDITY")
        })?;
        let amounts = vec![decoded.amountIn, output];
        Ok(Bytes::from(
            IUniswapV2Router02::getAmountsOutCall::abi_encode_returns(&amounts),
        ))
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> eyre::Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.estimates.push(request);
        if state.fail_estimate {
            return Err(eyre::eyre!("eth_estimateGas failed: execution reverted"));
        }
        Ok(state.gas_estimate)
    }

    async fn gas_price(&self) -> eyre::Result<u128> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn eip1559_fees(&self) -> eyre::Result<Eip1559Estimation> {
        let state = self.state.lock().unwrap();
        Ok(Eip1559Estimation {
            max_fee_per_gas: state.max_fee_per_gas,
            max_priority_fee_per_gas: state.max_priority_fee_per_gas,
        })
    }

    async fn pending_nonce(&self, _address: Address) -> eyre::Result<u64> {
        Ok(self.state.lock().unwrap().pending_nonce)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> eyre::Result<B256> {
        let mut state = self.state.lock().unwrap();
        if state.send_failures > 0 {
            state.send_failures -= 1;
            return Err(eyre::eyre!("eth_sendRawTransaction failed: {}", state.send_error));
        }
        let hash = keccak256(raw);
        state.sent.push(Bytes::copy_from_slice(raw));
        state.known.insert(hash);
        state.pending_nonce += 1;
        if let Some(success) = state.auto_mine {
            state.receipts.insert(hash, success);
        }
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: B256) -> eyre::Result<Option<ReceiptSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state.receipts.get(&hash).map(|success| ReceiptSummary {
            tx_hash: hash,
            success: *success,
            block_number: Some(state.head + 1),
            gas_used: state.gas_estimate,
        }))
    }

    async fn transaction_known(&self, hash: B256) -> eyre::Result<bool> {
        Ok(self.state.lock().unwrap().known.contains(&hash))
    }
}
