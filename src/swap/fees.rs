use std::collections::HashSet;

use crate::chain::ChainClient;
use crate::tx::envelope::FeeParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeModel {
    /// Max fee + priority fee.
    Dynamic,
    /// Single gas price.
    Flat,
}

impl FeeModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dynamic => "dynamic",
            Self::Flat => "flat",
        }
    }
}

/// Picks the fee model from the chain id alone and fills it from the node's suggestions.
#[derive(Debug, Clone)]
pub struct FeeStrategy {
    dynamic_chain_ids: HashSet<u64>,
}

impl FeeStrategy {
    pub fn new(dynamic_chain_ids: impl IntoIterator<Item = u64>) -> Self {
        Self {
            dynamic_chain_ids: dynamic_chain_ids.into_iter().collect(),
        }
    }

    pub fn model_for(&self, chain_id: u64) -> FeeModel {
        if self.dynamic_chain_ids.contains(&chain_id) {
            FeeModel::Dynamic
        } else {
            FeeModel::Flat
        }
    }

    pub async fn fee_params(
        &self,
        chain: &dyn ChainClient,
        chain_id: u64,
    ) -> eyre::Result<FeeParams> {
        match self.model_for(chain_id) {
            FeeModel::Dynamic => {
                let estimate = chain.eip1559_fees().await?;
                let priority = estimate.max_priority_fee_per_gas;
                Ok(FeeParams::Dynamic {
                    max_fee_per_gas: estimate.max_fee_per_gas.max(priority),
                    max_priority_fee_per_gas: priority,
                })
            }
            FeeModel::Flat => Ok(FeeParams::Flat {
                gas_price: chain.gas_price().await?,
            }),
        }
    }
}
