use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// The two Uniswap V2 router functions the agent uses.
    interface IUniswapV2Router02 {
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external view returns (uint256[] memory amounts);

        function swapExactETHForTokens(uint256 amountOutMin, address[] calldata path, address to, uint256 deadline)
            external payable returns (uint256[] memory amounts);
    }
}

pub fn encode_get_amounts_out(amount_in: U256, path: &[Address]) -> Bytes {
    IUniswapV2Router02::getAmountsOutCall {
        amountIn: amount_in,
        path: path.to_vec(),
    }
    .abi_encode()
    .into()
}

/// Decode `getAmountsOut` output and return the final hop's amount.
pub fn decode_amounts_out(data: &[u8], path_len: usize) -> eyre::Result<U256> {
    let amounts = IUniswapV2Router02::getAmountsOutCall::abi_decode_returns(data)
        .map_err(|e| eyre::eyre!("Failed to decode getAmountsOut result: {}", e))?;
    if amounts.len() != path_len {
        return Err(eyre::eyre!(
            "getAmountsOut returned {} amounts for a path of {} tokens",
            amounts.len(),
            path_len
        ));
    }
    amounts
        .last()
        .copied()
        .ok_or_else(|| eyre::eyre!("getAmountsOut returned no amounts"))
}

/// Arguments of one `swapExactETHForTokens` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapCall {
    pub amount_out_min: U256,
    pub path: Vec<Address>,
    pub recipient: Address,
    /// Unix seconds.
    pub deadline: u64,
}

impl SwapCall {
    pub fn encode(&self) -> Bytes {
        IUniswapV2Router02::swapExactETHForTokensCall {
            amountOutMin: self.amount_out_min,
            path: self.path.clone(),
            to: self.recipient,
            deadline: U256::from(self.deadline),
        }
        .abi_encode()
        .into()
    }
}
