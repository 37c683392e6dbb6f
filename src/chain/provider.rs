use alloy::eips::eip1559::Eip1559Estimation;
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use super::{ChainClient, ReceiptSummary};

/// `ChainClient` over an alloy HTTP provider. Every call is bounded by `timeout`.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: DynProvider,
    timeout: Duration,
}

impl RpcChainClient {
    pub fn connect_http(rpc_url: &str, timeout: Duration) -> eyre::Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| eyre::eyre!("Invalid RPC URL '{}': {}", rpc_url, e))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self { provider, timeout })
    }

    async fn bounded<T, E, Fut>(&self, method: &str, fut: Fut) -> eyre::Result<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(eyre::eyre!("{} failed: {}", method, e)),
            Err(_) => Err(eyre::eyre!(
                "{} timed out after {}ms",
                method,
                self.timeout.as_millis()
            )),
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> eyre::Result<u64> {
        self.bounded("eth_chainId", async { self.provider.get_chain_id().await })
            .await
    }

    async fn block_number(&self) -> eyre::Result<u64> {
        self.bounded("eth_blockNumber", async {
            self.provider.get_block_number().await
        })
        .await
    }

    async fn get_logs(&self, filter: &Filter) -> eyre::Result<Vec<Log>> {
        self.bounded("eth_getLogs", async { self.provider.get_logs(filter).await })
            .await
    }

    async fn call(&self, request: TransactionRequest) -> eyre::Result<Bytes> {
        self.bounded("eth_call", async { self.provider.call(request).await })
            .await
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> eyre::Result<u64> {
        self.bounded("eth_estimateGas", async {
            self.provider.estimate_gas(request).await
        })
        .await
    }

    async fn gas_price(&self) -> eyre::Result<u128> {
        self.bounded("eth_gasPrice", async { self.provider.get_gas_price().await })
            .await
    }

    async fn eip1559_fees(&self) -> eyre::Result<Eip1559Estimation> {
        self.bounded("eth_feeHistory", async {
            self.provider.estimate_eip1559_fees().await
        })
        .await
    }

    async fn pending_nonce(&self, address: Address) -> eyre::Result<u64> {
        self.bounded("eth_getTransactionCount", async {
            self.provider.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> eyre::Result<B256> {
        let pending = self
            .bounded("eth_sendRawTransaction", async {
                self.provider.send_raw_transaction(raw).await
            })
            .await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: B256) -> eyre::Result<Option<ReceiptSummary>> {
        let receipt = self
            .bounded("eth_getTransactionReceipt", async {
                self.provider.get_transaction_receipt(hash).await
            })
            .await?;
        Ok(receipt.map(|r| ReceiptSummary {
            tx_hash: r.transaction_hash,
            success: r.status(),
            block_number: r.block_number,
            gas_used: r.gas_used,
        }))
    }

    async fn transaction_known(&self, hash: B256) -> eyre::Result<bool> {
        let tx = self
            .bounded("eth_getTransactionByHash", async {
                self.provider.get_transaction_by_hash(hash).await
            })
            .await?;
        Ok(tx.is_some())
    }
}
