pub mod provider;
pub mod retry;

use alloy::eips::eip1559::Eip1559Estimation;
use alloy::primitives::{Address, Bytes, B256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use async_trait::async_trait;

pub use provider::RpcChainClient;

/// What the agent keeps from a transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// Every JSON-RPC call the agent makes, behind one seam.
///
/// Implementations must bound each call with a transport timeout; callers
/// never wrap these in their own timeouts.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> eyre::Result<u64>;

    async fn block_number(&self) -> eyre::Result<u64>;

    async fn get_logs(&self, filter: &Filter) -> eyre::Result<Vec<Log>>;

    /// Read-only `eth_call` against the latest state.
    async fn call(&self, request: TransactionRequest) -> eyre::Result<Bytes>;

    async fn estimate_gas(&self, request: TransactionRequest) -> eyre::Result<u64>;

    /// Flat-model price (`eth_gasPrice`).
    async fn gas_price(&self) -> eyre::Result<u128>;

    /// Dynamic-model suggestion (max fee and priority fee).
    async fn eip1559_fees(&self) -> eyre::Result<Eip1559Estimation>;

    /// Transaction count including pending transactions.
    async fn pending_nonce(&self, address: Address) -> eyre::Result<u64>;

    async fn send_raw_transaction(&self, raw: &[u8]) -> eyre::Result<B256>;

    async fn transaction_receipt(&self, hash: B256) -> eyre::Result<Option<ReceiptSummary>>;

    /// Whether the node knows the transaction at all (mempool or mined).
    async fn transaction_known(&self, hash: B256) -> eyre::Result<bool>;
}
