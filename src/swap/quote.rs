use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::TransactionRequest;
use std::sync::Arc;

use crate::chain::ChainClient;

use super::router;

/// Router quote for one path and amount. Valid only at the instant it was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteResult {
    pub path: Vec<Address>,
    pub input_amount: U256,
    pub expected_output: U256,
}

/// Read-only `getAmountsOut` queries against the router.
#[derive(Clone)]
pub struct QuoteService {
    chain: Arc<dyn ChainClient>,
    router: Address,
}

impl QuoteService {
    pub fn new(chain: Arc<dyn ChainClient>, router: Address) -> Self {
        Self { chain, router }
    }

    /// Quote `amount_in` along `path`. A revert (e.g. missing liquidity) is an error.
    pub async fn quote(&self, path: &[Address], amount_in: U256) -> eyre::Result<QuoteResult> {
        if path.len() < 2 {
            return Err(eyre::eyre!("swap path needs at least two tokens"));
        }

        let request = TransactionRequest::default()
            .with_to(self.router)
            .with_input(router::encode_get_amounts_out(amount_in, path));

        let output = self
            .chain
            .call(request)
            .await
            .map_err(|e| eyre::eyre!("getAmountsOut call failed: {}", e))?;
        let expected_output = router::decode_amounts_out(&output, path.len())?;

        Ok(QuoteResult {
            path: path.to_vec(),
            input_amount: amount_in,
            expected_output,
        })
    }
}
