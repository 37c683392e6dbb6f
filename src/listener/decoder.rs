use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use thiserror::Error;

use super::types::DepositEvent;

// Canonical deposit event of the receiver contract.
sol! {
    event ETHReceived(address indexed from, uint256 amount);
}

/// Signature hash of `ETHReceived(address,uint256)`.
pub fn eth_received_topic() -> B256 {
    ETHReceived::SIGNATURE_HASH
}

/// Where the two deposit fields live in a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositLayout {
    pub sender_indexed: bool,
    pub amount_indexed: bool,
}

impl Default for DepositLayout {
    fn default() -> Self {
        Self {
            sender_indexed: true,
            amount_indexed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("log topic does not match the deposit event")]
    WrongTopic,
    #[error("log is missing {0}")]
    MissingField(&'static str),
    #[error("malformed log: {0}")]
    Malformed(String),
}

/// Decode a deposit log. Indexed fields come from topics in declaration
/// order, the rest from consecutive 32-byte data words.
pub fn decode_deposit_log(
    log: &Log,
    topic0: B256,
    layout: DepositLayout,
) -> Result<DepositEvent, DecodeError> {
    let topics = log.inner.data.topics();
    if topics.first() != Some(&topic0) {
        return Err(DecodeError::WrongTopic);
    }

    let expected_topics = 1 + layout.sender_indexed as usize + layout.amount_indexed as usize;
    if topics.len() != expected_topics {
        return Err(DecodeError::Malformed(format!(
            "expected {} topics, found {}",
            expected_topics,
            topics.len()
        )));
    }

    let data = log.inner.data.data.as_ref();
    let mut indexed = topics[1..].iter().copied();
    let mut words_read = 0;
    let mut field = |is_indexed: bool| -> Result<B256, DecodeError> {
        if is_indexed {
            indexed.next().ok_or(DecodeError::MissingField("indexed topic"))
        } else {
            words_read += 1;
            data_word(data, words_read - 1)
        }
    };

    let sender_word = field(layout.sender_indexed)?;
    let amount_word = field(layout.amount_indexed)?;

    if sender_word[..12].iter().any(|b| *b != 0) {
        return Err(DecodeError::Malformed(
            "sender word has non-zero high bytes".to_string(),
        ));
    }

    let block_number = log
        .block_number
        .ok_or(DecodeError::MissingField("block number"))?;
    let tx_hash = log
        .transaction_hash
        .ok_or(DecodeError::MissingField("transaction hash"))?;
    let log_index = log.log_index.ok_or(DecodeError::MissingField("log index"))?;

    Ok(DepositEvent {
        block_number,
        tx_hash,
        log_index,
        sender: Address::from_word(sender_word),
        amount: U256::from_be_bytes(amount_word.0),
    })
}

fn data_word(data: &[u8], index: usize) -> Result<B256, DecodeError> {
    let start = index * 32;
    data.get(start..start + 32)
        .map(B256::from_slice)
        .ok_or_else(|| {
            DecodeError::Malformed(format!(
                "data too short: {} bytes, need {}",
                data.len(),
                start + 32
            ))
        })
}
