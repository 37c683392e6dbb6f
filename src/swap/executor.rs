use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::TransactionRequest;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::account::AccountContext;
use crate::chain::retry::retry_with_backoff;
use crate::chain::ChainClient;
use crate::config::Config;
use crate::listener::DepositEvent;
use crate::tx::signer::{is_nonce_too_low, sign_envelope};
use crate::tx::{Broadcaster, TransactionEnvelope};

use super::fees::FeeStrategy;
use super::quote::{QuoteResult, QuoteService};
use super::router::SwapCall;
use super::slippage::SlippageBound;

/// Progress of one swap run. Variants are ordered; a run only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SwapStage {
    Detected,
    Quoting,
    Building,
    Signing,
    Broadcasting,
    Confirmed,
    Failed,
}

impl SwapStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Quoting => "quoting",
            Self::Building => "building",
            Self::Signing => "signing",
            Self::Broadcasting => "broadcasting",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    Confirmed {
        tx_hash: B256,
        block_number: Option<u64>,
        gas_used: u64,
        minimum_output: U256,
    },
    Failed {
        /// Stage the run was in when it failed.
        stage: SwapStage,
        reason: String,
        nonce_released: bool,
    },
}

impl SwapOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SwapSettings {
    pub router: Address,
    pub path: Vec<Address>,
    pub slippage: SlippageBound,
    pub deadline_secs: u64,
    pub gas_buffer_percent: u64,
    pub broadcast_retries: u32,
    pub broadcast_backoff: Duration,
    pub confirmation_timeout: Duration,
    pub receipt_poll: Duration,
}

impl SwapSettings {
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        Ok(Self {
            router: config.router_address()?,
            path: config.swap_path()?,
            slippage: config.slippage()?,
            deadline_secs: config.swap.deadline_secs,
            gas_buffer_percent: config.swap.gas_buffer_percent,
            broadcast_retries: config.swap.broadcast_retries,
            broadcast_backoff: Duration::from_millis(config.swap.broadcast_backoff_ms),
            confirmation_timeout: Duration::from_secs(config.swap.confirmation_timeout_secs),
            receipt_poll: Duration::from_millis(config.swap.receipt_poll_ms),
        })
    }
}

/// Mutable record of a single run, kept for the outcome log.
struct SwapRun {
    stage: SwapStage,
    envelope: Option<TransactionEnvelope>,
}

impl SwapRun {
    fn new() -> Self {
        Self {
            stage: SwapStage::Detected,
            envelope: None,
        }
    }

    fn advance(&mut self, next: SwapStage) {
        debug_assert!(next > self.stage, "swap stage moved backwards");
        if self.stage.is_terminal() || next <= self.stage {
            return;
        }
        self.stage = next;
    }

    fn fail(&self, reason: impl Into<String>, nonce_released: bool) -> SwapOutcome {
        SwapOutcome::Failed {
            stage: self.stage,
            reason: reason.into(),
            nonce_released,
        }
    }
}

/// Turns one deposit into one router swap.
pub struct SwapExecutor {
    chain: Arc<dyn ChainClient>,
    account: AccountContext,
    settings: SwapSettings,
    quotes: QuoteService,
    fees: FeeStrategy,
    broadcaster: Broadcaster,
}

impl SwapExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        account: AccountContext,
        settings: SwapSettings,
        fees: FeeStrategy,
    ) -> Self {
        let quotes = QuoteService::new(chain.clone(), settings.router);
        let broadcaster = Broadcaster::new(chain.clone(), settings.receipt_poll);
        Self {
            chain,
            account,
            settings,
            quotes,
            fees,
            broadcaster,
        }
    }

    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    /// Router call for `quote`, bounded by slippage and expiring `deadline_secs` after `now`.
    pub fn build_swap_call(&self, quote: &QuoteResult, now: u64) -> SwapCall {
        SwapCall {
            amount_out_min: self.settings.slippage.minimum_output(quote.expected_output),
            path: quote.path.clone(),
            recipient: self.account.address,
            deadline: now.saturating_add(self.settings.deadline_secs),
        }
    }

    /// Run a deposit to a terminal outcome and log it. Never panics on chain errors.
    pub async fn execute(&self, event: &DepositEvent, shutdown: &CancellationToken) -> SwapOutcome {
        let mut run = SwapRun::new();
        let outcome = self.drive(&mut run, event, shutdown).await;
        self.log_outcome(event, &run, &outcome);
        outcome
    }

    async fn drive(
        &self,
        run: &mut SwapRun,
        event: &DepositEvent,
        shutdown: &CancellationToken,
    ) -> SwapOutcome {
        run.advance(SwapStage::Quoting);
        let quote = match self.quotes.quote(&self.settings.path, event.amount).await {
            Ok(quote) => quote,
            Err(e) => return run.fail(format!("quote failed: {}", e), false),
        };
        if quote.expected_output.is_zero() {
            return run.fail("quote returned zero output", false);
        }
        tracing::info!(
            amount_in = %quote.input_amount,
            expected_output = %quote.expected_output,
            "Quote received"
        );

        run.advance(SwapStage::Building);
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let swap_call = self.build_swap_call(&quote, now);
        let input = swap_call.encode();

        let request = TransactionRequest::default()
            .with_from(self.account.address)
            .with_to(self.settings.router)
            .with_value(event.amount)
            .with_input(input.clone());
        let estimate = match self.chain.estimate_gas(request).await {
            Ok(gas) => gas,
            Err(e) => return run.fail(format!("gas estimation failed: {}", e), false),
        };
        let gas_limit = estimate.saturating_mul(100 + self.settings.gas_buffer_percent) / 100;

        let fee = match self
            .fees
            .fee_params(self.chain.as_ref(), self.account.chain_id)
            .await
        {
            Ok(fee) => fee,
            Err(e) => return run.fail(format!("fee lookup failed: {}", e), false),
        };

        if shutdown.is_cancelled() {
            return run.fail("cancelled before nonce allocation", false);
        }

        run.advance(SwapStage::Signing);
        let nonce = self.account.nonces.allocate().await;
        let envelope = TransactionEnvelope {
            sender: self.account.address,
            to: self.settings.router,
            value: event.amount,
            input,
            gas_limit,
            fee,
            nonce,
            chain_id: self.account.chain_id,
        };
        run.envelope = Some(envelope.clone());

        let signed = match sign_envelope(&self.account.signer, &envelope) {
            Ok(signed) => signed,
            Err(e) => {
                self.account.nonces.release(nonce).await;
                return run.fail(format!("signing failed: {}", e), true);
            }
        };

        run.advance(SwapStage::Broadcasting);
        tracing::debug!(tx_hash = %signed.hash, nonce, gas_limit, "Submitting swap");
        let submitted = retry_with_backoff(
            self.settings.broadcast_retries,
            self.settings.broadcast_backoff,
            "broadcast",
            |_| self.broadcaster.submit(&signed),
        )
        .await;

        let tx_hash = match submitted {
            Ok(hash) => hash,
            Err(e) => {
                let reason = e.to_string();
                let released = if is_nonce_too_low(&reason) {
                    self.resync_nonces().await;
                    false
                } else {
                    self.release_if_unseen(signed.hash, nonce).await
                };
                return run.fail(reason, released);
            }
        };

        let receipt = match self
            .broadcaster
            .await_receipt(tx_hash, self.settings.confirmation_timeout)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => return run.fail(e.to_string(), false),
        };
        if !receipt.success {
            return run.fail(format!("transaction {} reverted", tx_hash), false);
        }

        run.advance(SwapStage::Confirmed);
        SwapOutcome::Confirmed {
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            minimum_output: swap_call.amount_out_min,
        }
    }

    /// Give `nonce` back only if the network provably never saw `hash`.
    pub async fn release_if_unseen(&self, hash: B256, nonce: u64) -> bool {
        let known = match self.chain.transaction_known(hash).await {
            Ok(known) => known,
            Err(e) => {
                tracing::warn!(%hash, nonce, error = %e, "Could not check transaction, treating nonce as consumed");
                return false;
            }
        };
        if known {
            return false;
        }
        let pending = match self.chain.pending_nonce(self.account.address).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(nonce, error = %e, "Could not fetch pending nonce, treating nonce as consumed");
                return false;
            }
        };
        if pending > nonce {
            return false;
        }
        self.account.nonces.release(nonce).await;
        tracing::info!(nonce, "Nonce released for reuse");
        true
    }

    async fn resync_nonces(&self) {
        match self.chain.pending_nonce(self.account.address).await {
            Ok(pending) => self.account.nonces.resync(pending).await,
            Err(e) => tracing::warn!(error = %e, "Nonce resync failed"),
        }
    }

    fn log_outcome(&self, event: &DepositEvent, run: &SwapRun, outcome: &SwapOutcome) {
        match outcome {
            SwapOutcome::Confirmed {
                tx_hash,
                block_number,
                gas_used,
                minimum_output,
            } => {
                tracing::info!(
                    sender = %event.sender,
                    amount = %event.amount,
                    block = ?block_number,
                    gas_used,
                    minimum_output = %minimum_output,
                    "Swap successful, hash={}",
                    tx_hash
                );
            }
            SwapOutcome::Failed {
                stage,
                reason,
                nonce_released,
            } => {
                let envelope = run
                    .envelope
                    .as_ref()
                    .map(|e| e.describe())
                    .unwrap_or_else(|| "none".to_string());
                tracing::error!(
                    stage = stage.as_str(),
                    sender = %event.sender,
                    amount = %event.amount,
                    nonce_released,
                    envelope = %envelope,
                    "Swap failed: {}",
                    reason
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChain, TEST_CHAIN_ID};
    use crate::swap::router::IUniswapV2Router02;
    use alloy::consensus::{Transaction, TxEnvelope};
    use alloy::eips::eip2718::Decodable2718;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::sol_types::SolCall;

    const ONE_AND_A_HALF_ETH: u128 = 1_500_000_000_000_000_000;

    fn settings() -> SwapSettings {
        SwapSettings {
            router: Address::repeat_byte(0x0A),
            path: vec![Address::repeat_byte(0x01), Address::repeat_byte(0x02)],
            slippage: SlippageBound::from_fraction(0.005).unwrap(),
            deadline_secs: 1200,
            gas_buffer_percent: 20,
            broadcast_retries: 3,
            broadcast_backoff: Duration::from_millis(1),
            confirmation_timeout: Duration::from_millis(200),
            receipt_poll: Duration::from_millis(5),
        }
    }

    async fn executor(chain: &Arc<FakeChain>) -> SwapExecutor {
        let account = AccountContext::load(&**chain, PrivateKeySigner::random(), chain.chain_id)
            .await
            .unwrap();
        SwapExecutor::new(chain.clone(), account, settings(), FeeStrategy::new([TEST_CHAIN_ID]))
    }

    fn deposit(block: u64, log_index: u64) -> DepositEvent {
        DepositEvent {
            block_number: block,
            tx_hash: B256::repeat_byte(block as u8),
            log_index,
            sender: Address::repeat_byte(0xAA),
            amount: U256::from(ONE_AND_A_HALF_ETH),
        }
    }

    fn sent(chain: &FakeChain) -> Vec<TxEnvelope> {
        chain.with(|s| {
            s.sent
                .iter()
                .map(|raw| TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap())
                .collect()
        })
    }

    #[tokio::test]
    async fn test_deposit_is_swapped_with_slippage_bound() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        chain.with(|s| s.quote_output = Some(U256::from(3000u64)));
        let exec = executor(&chain).await;

        let outcome = exec.execute(&deposit(1000, 0), &CancellationToken::new()).await;
        match outcome {
            SwapOutcome::Confirmed { minimum_output, .. } => {
                assert_eq!(minimum_output, U256::from(2985u64))
            }
            other => panic!("expected confirmation, got {:?}", other),
        }

        let txs = sent(&chain);
        assert_eq!(txs.len(), 1);
        let tx = &txs[0];
        assert_eq!(tx.value(), U256::from(ONE_AND_A_HALF_ETH));
        assert_eq!(tx.to(), Some(Address::repeat_byte(0x0A)));
        assert_eq!(tx.gas_limit(), 180_000);
        assert!(matches!(tx, TxEnvelope::Eip1559(_)));

        let call = IUniswapV2Router02::swapExactETHForTokensCall::abi_decode(tx.input()).unwrap();
        assert_eq!(call.amountOutMin, U256::from(2985u64));
        assert_eq!(call.to, exec.account().address);
        assert_eq!(call.path, settings().path);
    }

    #[tokio::test]
    async fn test_flat_fee_chain_builds_legacy_tx() {
        let chain = Arc::new(FakeChain::new(1));
        let exec = executor(&chain).await;

        let outcome = exec.execute(&deposit(5, 0), &CancellationToken::new()).await;
        assert!(outcome.is_confirmed());
        let txs = sent(&chain);
        assert!(matches!(txs[0], TxEnvelope::Legacy(_)));
        assert_eq!(txs[0].gas_price(), Some(20_000_000_000));
    }

    #[tokio::test]
    async fn test_quote_revert_submits_nothing() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        chain.with(|s| s.quote_output = None);
        let exec = executor(&chain).await;

        let outcome = exec.execute(&deposit(7, 0), &CancellationToken::new()).await;
        match outcome {
            SwapOutcome::Failed {
                stage,
                reason,
                nonce_released,
            } => {
                assert_eq!(stage, SwapStage::Quoting);
                assert!(reason.contains("INSUFFICIENT_LIQUIDITY"));
                assert!(!nonce_released);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(chain.with(|s| s.sent.is_empty() && s.estimates.is_empty()));
        assert_eq!(exec.account().nonces.next().await, 0);
    }

    #[tokio::test]
    async fn test_gas_estimation_failure_aborts() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        chain.with(|s| s.fail_estimate = true);
        let exec = executor(&chain).await;

        let outcome = exec.execute(&deposit(7, 0), &CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            SwapOutcome::Failed { stage: SwapStage::Building, .. }
        ));
        assert!(chain.with(|s| s.sent.is_empty()));
        assert_eq!(exec.account().nonces.next().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_deposits_get_sequential_nonces() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        // First quote resolves last.
        chain.with(|s| {
            s.quote_delays.push_back(Duration::from_millis(50));
            s.quote_delays.push_back(Duration::from_millis(0));
        });
        let exec = Arc::new(executor(&chain).await);
        let shutdown = CancellationToken::new();

        let (first, second) = (deposit(10, 0), deposit(10, 1));
        let (a, b) = tokio::join!(
            exec.execute(&first, &shutdown),
            exec.execute(&second, &shutdown)
        );
        assert!(a.is_confirmed());
        assert!(b.is_confirmed());

        let mut nonces: Vec<u64> = sent(&chain).iter().map(|tx| tx.nonce()).collect();
        nonces.sort_unstable();
        assert_eq!(nonces, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_exhausted_broadcast_releases_unseen_nonce() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        chain.with(|s| s.send_failures = 3);
        let exec = executor(&chain).await;

        let outcome = exec.execute(&deposit(3, 0), &CancellationToken::new()).await;
        match outcome {
            SwapOutcome::Failed {
                stage,
                nonce_released,
                reason,
            } => {
                assert_eq!(stage, SwapStage::Broadcasting);
                assert!(nonce_released);
                assert!(reason.contains("after 3 attempts"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(exec.account().nonces.allocate().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_recovers_within_retry_budget() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        chain.with(|s| s.send_failures = 2);
        let exec = executor(&chain).await;

        let outcome = exec.execute(&deposit(3, 0), &CancellationToken::new()).await;
        assert!(outcome.is_confirmed());
        assert_eq!(chain.with(|s| s.sent.len()), 1);
    }

    #[tokio::test]
    async fn test_nonce_too_low_resyncs_allocator() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        let exec = executor(&chain).await;
        chain.with(|s| {
            s.send_failures = 3;
            s.send_error = "nonce too low".to_string();
            s.pending_nonce = 4;
        });

        let outcome = exec.execute(&deposit(3, 0), &CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            SwapOutcome::Failed { nonce_released: false, .. }
        ));
        assert_eq!(exec.account().nonces.allocate().await, 4);
    }

    #[tokio::test]
    async fn test_pending_count_past_nonce_keeps_it_consumed() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        let exec = executor(&chain).await;
        chain.with(|s| {
            s.send_failures = 3;
            s.pending_nonce = 1;
        });

        let outcome = exec.execute(&deposit(3, 0), &CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            SwapOutcome::Failed { nonce_released: false, .. }
        ));
        assert_eq!(exec.account().nonces.allocate().await, 1);
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_failure() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        chain.with(|s| s.auto_mine = Some(false));
        let exec = executor(&chain).await;

        let outcome = exec.execute(&deposit(3, 0), &CancellationToken::new()).await;
        match outcome {
            SwapOutcome::Failed {
                stage,
                reason,
                nonce_released,
            } => {
                assert_eq!(stage, SwapStage::Broadcasting);
                assert!(reason.contains("reverted"));
                assert!(!nonce_released);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_confirmation_timeout_consumes_nonce() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        chain.with(|s| s.auto_mine = None);
        let exec = executor(&chain).await;

        let outcome = exec.execute(&deposit(3, 0), &CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            SwapOutcome::Failed { stage: SwapStage::Broadcasting, nonce_released: false, .. }
        ));
        assert_eq!(exec.account().nonces.allocate().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_never_takes_a_nonce() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        let exec = executor(&chain).await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let outcome = exec.execute(&deposit(3, 0), &shutdown).await;
        match outcome {
            SwapOutcome::Failed { reason, .. } => assert!(reason.contains("cancelled")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(exec.account().nonces.next().await, 0);
        assert!(chain.with(|s| s.sent.is_empty()));
    }

    #[tokio::test]
    async fn test_deadline_is_build_time_plus_window() {
        let chain = Arc::new(FakeChain::new(TEST_CHAIN_ID));
        let exec = executor(&chain).await;
        let quote = QuoteResult {
            path: settings().path,
            input_amount: U256::from(ONE_AND_A_HALF_ETH),
            expected_output: U256::from(3000u64),
        };

        let call = exec.build_swap_call(&quote, 1_700_000_000);
        assert_eq!(call.deadline, 1_700_001_200);
        assert!(call.deadline > 1_700_000_000);
        assert_eq!(call.amount_out_min, U256::from(2985u64));
    }

    #[test]
    fn test_stage_order_is_forward() {
        assert!(SwapStage::Detected < SwapStage::Quoting);
        assert!(SwapStage::Signing < SwapStage::Broadcasting);
        assert!(SwapStage::Confirmed.is_terminal());
        assert!(!SwapStage::Building.is_terminal());
    }

    #[test]
    fn test_confirmed_run_stays_confirmed() {
        let mut run = SwapRun::new();
        run.advance(SwapStage::Broadcasting);
        run.advance(SwapStage::Confirmed);
        run.advance(SwapStage::Failed);
        assert_eq!(run.stage, SwapStage::Confirmed);
    }
}
