use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::chain::ChainClient;

#[derive(Debug, Default)]
struct NonceState {
    next: u64,
    /// Allocated nonces the network never saw, reused lowest first.
    released: BTreeSet<u64>,
}

/// Single serialized source of nonces for the agent's account.
#[derive(Debug, Clone)]
pub struct NonceAllocator {
    state: Arc<Mutex<NonceState>>,
}

impl NonceAllocator {
    pub fn new(start: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(NonceState {
                next: start,
                released: BTreeSet::new(),
            })),
        }
    }

    pub async fn allocate(&self) -> u64 {
        let mut state = self.state.lock().await;
        if let Some(nonce) = state.released.pop_first() {
            return nonce;
        }
        let nonce = state.next;
        state.next += 1;
        nonce
    }

    /// Return a nonce that never reached the network.
    pub async fn release(&self, nonce: u64) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if nonce >= state.next {
            return;
        }
        state.released.insert(nonce);
        // Shrink the tail so `next` stays contiguous with what was handed out.
        while state.next > 0 && state.released.remove(&(state.next - 1)) {
            state.next -= 1;
        }
    }

    /// Align with the chain's pending count after a "nonce too low" rejection.
    pub async fn resync(&self, on_chain: u64) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.released = state.released.split_off(&on_chain);
        if on_chain > state.next {
            tracing::info!(from = state.next, to = on_chain, "Nonce allocator resynced");
            state.next = on_chain;
        }
    }

    pub async fn next(&self) -> u64 {
        self.state.lock().await.next
    }
}

/// Identity the agent swaps from.
#[derive(Clone)]
pub struct AccountContext {
    pub address: Address,
    pub signer: PrivateKeySigner,
    pub chain_id: u64,
    pub nonces: NonceAllocator,
}

impl AccountContext {
    /// Seed the allocator from the account's pending transaction count.
    pub async fn load(
        chain: &dyn ChainClient,
        signer: PrivateKeySigner,
        chain_id: u64,
    ) -> eyre::Result<Self> {
        let address = signer.address();
        let pending = chain
            .pending_nonce(address)
            .await
            .map_err(|e| eyre::eyre!("Failed to fetch nonce for {}: {}", address, e))?;
        tracing::info!(%address, nonce = pending, "Account loaded");
        Ok(Self {
            address,
            signer,
            chain_id,
            nonces: NonceAllocator::new(pending),
        })
    }
}
