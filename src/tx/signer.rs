use alloy::consensus::{SignableTransaction, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::chain::{ChainClient, ReceiptSummary};

use super::envelope::{TransactionEnvelope, UnsignedTx};

/// Signed 2718 encoding of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: B256,
    pub raw: Bytes,
}

pub fn sign_envelope(
    signer: &PrivateKeySigner,
    envelope: &TransactionEnvelope,
) -> eyre::Result<SignedTransaction> {
    if signer.address() != envelope.sender {
        return Err(eyre::eyre!(
            "Envelope sender {} does not match signing key {}",
            envelope.sender,
            signer.address()
        ));
    }

    let signed: TxEnvelope = match envelope.to_unsigned() {
        UnsignedTx::Legacy(tx) => {
            let sig = signer
                .sign_hash_sync(&tx.signature_hash())
                .map_err(|e| eyre::eyre!("Failed to sign legacy transaction: {}", e))?;
            tx.into_signed(sig).into()
        }
        UnsignedTx::Eip1559(tx) => {
            let sig = signer
                .sign_hash_sync(&tx.signature_hash())
                .map_err(|e| eyre::eyre!("Failed to sign EIP-1559 transaction: {}", e))?;
            tx.into_signed(sig).into()
        }
    };

    Ok(SignedTransaction {
        hash: *signed.tx_hash(),
        raw: signed.encoded_2718().into(),
    })
}

/// Node replies meaning the exact transaction is already in its pool.
pub fn is_already_known(error: &str) -> bool {
    let s = error.to_lowercase();
    s.contains("already known")
        || s.contains("known transaction")
        || s.contains("already imported")
        || s.contains("already in mempool")
}

pub fn is_nonce_too_low(error: &str) -> bool {
    let s = error.to_lowercase();
    s.contains("nonce too low") || s.contains("nonce is too low")
}

/// Submits signed transactions and waits for receipts. Never retries on its own.
#[derive(Clone)]
pub struct Broadcaster {
    chain: Arc<dyn ChainClient>,
    receipt_poll: Duration,
}

impl Broadcaster {
    pub fn new(chain: Arc<dyn ChainClient>, receipt_poll: Duration) -> Self {
        Self {
            chain,
            receipt_poll,
        }
    }

    /// Submit once. An "already known" reply counts as accepted.
    pub async fn submit(&self, signed: &SignedTransaction) -> eyre::Result<B256> {
        match self.chain.send_raw_transaction(&signed.raw).await {
            Ok(hash) => {
                if hash != signed.hash {
                    tracing::warn!(
                        expected = %signed.hash,
                        returned = %hash,
                        "Node returned an unexpected transaction hash"
                    );
                }
                Ok(signed.hash)
            }
            Err(e) if is_already_known(&e.to_string()) => {
                tracing::debug!(tx_hash = %signed.hash, "Transaction already known to node");
                Ok(signed.hash)
            }
            Err(e) => Err(e),
        }
    }

    /// Poll for a receipt until `timeout` elapses.
    pub async fn await_receipt(&self, hash: B256, timeout: Duration) -> eyre::Result<ReceiptSummary> {
        let start = Instant::now();
        loop {
            match self.chain.transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(tx_hash = %hash, error = %e, "Receipt lookup failed, polling again");
                }
            }
            if start.elapsed() >= timeout {
                return Err(eyre::eyre!(
                    "Timed out after {}s waiting for receipt of {}",
                    timeout.as_secs(),
                    hash
                ));
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }
}
