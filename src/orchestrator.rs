use alloy::signers::local::PrivateKeySigner;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::account::AccountContext;
use crate::chain::ChainClient;
use crate::config::Config;
use crate::deployment::DeploymentRecord;
use crate::listener::{DepositEvent, EventWatcher, PollCursor, WatcherSettings};
use crate::swap::{FeeStrategy, SwapExecutor, SwapSettings};

/// Wires the watcher to one executor task per deposit.
pub struct ListenerOrchestrator {
    executor: Arc<SwapExecutor>,
    watcher: EventWatcher,
    channel_capacity: usize,
    shutdown_grace: Duration,
}

impl ListenerOrchestrator {
    /// Connectivity and identity checks, then component wiring. Any error here is fatal.
    pub async fn startup(
        config: &Config,
        chain: Arc<dyn ChainClient>,
        deployment: &DeploymentRecord,
        signer: PrivateKeySigner,
    ) -> eyre::Result<Self> {
        let event = deployment.deposit_event(&config.listener.event_name)?;

        let head = chain
            .block_number()
            .await
            .map_err(|e| eyre::eyre!("RPC endpoint unreachable: {}", e))?;
        let chain_id = chain
            .chain_id()
            .await
            .map_err(|e| eyre::eyre!("Failed to fetch chain id: {}", e))?;

        if let Some(expected) = config.network.chain_id {
            if expected != chain_id {
                return Err(eyre::eyre!(
                    "Chain id mismatch: configured {}, endpoint reports {}",
                    expected,
                    chain_id
                ));
            }
        }

        let account = AccountContext::load(chain.as_ref(), signer, chain_id).await?;
        let fees = FeeStrategy::new(config.fees.dynamic_fee_chain_ids.iter().copied());
        let settings = SwapSettings::from_config(config)?;

        let cursor = match config.listener.start_block {
            Some(start) => PollCursor::new(start.saturating_sub(1)),
            None => PollCursor::new(head),
        };

        tracing::info!(
            chain_id,
            head,
            cursor = cursor.block(),
            contract = %event.contract,
            event = %event.signature,
            account = %account.address,
            fee_model = fees.model_for(chain_id).as_str(),
            router = %settings.router,
            slippage = %settings.slippage.tolerance(),
            "Listener ready"
        );

        let watcher = EventWatcher::new(
            chain.clone(),
            WatcherSettings::new(&event, config.poll_interval(), config.listener.batch_size),
            cursor,
        );
        let executor = Arc::new(SwapExecutor::new(chain, account, settings, fees));

        Ok(Self {
            executor,
            watcher,
            channel_capacity: config.listener.channel_capacity,
            shutdown_grace: Duration::from_secs(config.listener.shutdown_grace_secs),
        })
    }

    pub fn cursor(&self) -> PollCursor {
        self.watcher.cursor()
    }

    /// Run until `shutdown` fires, then drain within the grace period.
    pub async fn run(self, shutdown: CancellationToken) -> eyre::Result<()> {
        let (tx, mut rx) = mpsc::channel::<DepositEvent>(self.channel_capacity.max(1));
        let watcher = tokio::spawn(self.watcher.run(tx, shutdown.clone()));
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                maybe_event = rx.recv() => match maybe_event {
                    Some(event) => spawn_swap(&tracker, &self.executor, event, &shutdown),
                    None => {
                        tracing::warn!("Watcher stopped, no more deposits will arrive");
                        break;
                    }
                },
            }
        }

        rx.close();
        while let Ok(event) = rx.try_recv() {
            tracing::warn!(
                block = event.block_number,
                tx_hash = %event.tx_hash,
                log_index = event.log_index,
                sender = %event.sender,
                amount = %event.amount,
                "Deposit abandoned at shutdown, not swapped"
            );
        }

        if let Err(e) = watcher.await {
            tracing::error!(error = %e, "Watcher task panicked");
        }

        tracker.close();
        tracing::info!(in_flight = tracker.len(), "Waiting for in-flight swaps");
        if tokio::time::timeout(self.shutdown_grace, tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = tracker.len(),
                grace_secs = self.shutdown_grace.as_secs(),
                "Grace period elapsed, abandoning in-flight swaps"
            );
        }

        tracing::info!("Listener stopped");
        Ok(())
    }
}

fn spawn_swap(
    tracker: &TaskTracker,
    executor: &Arc<SwapExecutor>,
    event: DepositEvent,
    shutdown: &CancellationToken,
) {
    let span = tracing::info_span!(
        "swap",
        tx_hash = %event.tx_hash,
        log_index = event.log_index
    );
    let executor = executor.clone();
    let shutdown = shutdown.clone();
    tracker.spawn(
        async move {
            executor.execute(&event, &shutdown).await;
        }
        .instrument(span),
    );
}
