use alloy::primitives::{Address, B256};
use alloy::rpc::types::Filter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chain::ChainClient;
use crate::deployment::DepositEventSpec;

use super::decoder::{decode_deposit_log, DepositLayout};
use super::types::{DepositEvent, PollCursor};

#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub contract: Address,
    pub topic0: B256,
    pub layout: DepositLayout,
    pub poll_interval: Duration,
    /// Widest block range requested from `eth_getLogs` at once.
    pub batch_size: u64,
}

impl WatcherSettings {
    pub fn new(event: &DepositEventSpec, poll_interval: Duration, batch_size: u64) -> Self {
        Self {
            contract: event.contract,
            topic0: event.topic0,
            layout: event.layout,
            poll_interval,
            batch_size: batch_size.max(1),
        }
    }
}

/// Scans `(cursor, head]` for deposit logs and dispatches each one once.
pub struct EventWatcher {
    chain: Arc<dyn ChainClient>,
    settings: WatcherSettings,
    /// Moves only after every log in a window was dispatched. A window is
    /// rescanned only when its `eth_getLogs` call failed, so nothing in it went out.
    cursor: PollCursor,
}

impl EventWatcher {
    pub fn new(chain: Arc<dyn ChainClient>, settings: WatcherSettings, cursor: PollCursor) -> Self {
        Self {
            chain,
            settings,
            cursor,
        }
    }

    pub fn cursor(&self) -> PollCursor {
        self.cursor
    }

    /// One poll: read the head, then scan the new range window by window.
    /// Returns the number of events dispatched.
    pub async fn tick(&mut self, sender: &mpsc::Sender<DepositEvent>) -> eyre::Result<usize> {
        let head = self
            .chain
            .block_number()
            .await
            .map_err(|e| eyre::eyre!("Failed to get block number: {}", e))?;

        let last = self.cursor.block();
        if head <= last {
            tracing::debug!(head, cursor = last, "No new blocks");
            return Ok(0);
        }

        let mut total = 0;
        let mut from = last + 1;
        while from <= head {
            let to = std::cmp::min(from.saturating_add(self.settings.batch_size - 1), head);
            total += self.scan_window(from, to, sender).await?;
            self.cursor.advance_to(to);
            from = to + 1;
        }

        if total == 0 {
            tracing::debug!(from = last + 1, to = head, "No new deposit events");
        }
        Ok(total)
    }

    async fn scan_window(
        &self,
        from: u64,
        to: u64,
        sender: &mpsc::Sender<DepositEvent>,
    ) -> eyre::Result<usize> {
        let filter = Filter::new()
            .address(self.settings.contract)
            .event_signature(self.settings.topic0)
            .from_block(from)
            .to_block(to);

        let logs = self
            .chain
            .get_logs(&filter)
            .await
            .map_err(|e| eyre::eyre!("Failed to fetch logs for blocks {}..={}: {}", from, to, e))?;

        let mut count = 0;
        for log in &logs {
            if log.removed {
                tracing::debug!(tx_hash = ?log.transaction_hash, "Skipping removed log");
                continue;
            }

            let event = match decode_deposit_log(log, self.settings.topic0, self.settings.layout) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(
                        block = ?log.block_number,
                        tx_hash = ?log.transaction_hash,
                        error = %e,
                        "Skipping undecodable deposit log"
                    );
                    continue;
                }
            };

            if event.amount.is_zero() {
                tracing::warn!(
                    block = event.block_number,
                    tx_hash = %event.tx_hash,
                    "Skipping zero-amount deposit"
                );
                continue;
            }

            tracing::info!(
                block = event.block_number,
                tx_hash = %event.tx_hash,
                log_index = event.log_index,
                sender = %event.sender,
                amount = %event.amount,
                "Deposit detected"
            );

            sender
                .send(event)
                .await
                .map_err(|_| eyre::eyre!("Dispatch channel closed"))?;
            count += 1;
        }

        Ok(count)
    }

    /// Poll until `shutdown` fires or the dispatch channel closes.
    pub async fn run(mut self, sender: mpsc::Sender<DepositEvent>, shutdown: CancellationToken) {
        tracing::info!(
            contract = %self.settings.contract,
            cursor = self.cursor.block(),
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            "Event watcher started"
        );

        loop {
            tokio::select! {
                result = self.tick(&sender) => {
                    if let Err(e) = result {
                        if sender.is_closed() {
                            tracing::warn!(error = %e, "Dispatch channel closed, stopping watcher");
                            break;
                        }
                        tracing::error!(cursor = self.cursor.block(), error = %e, "Poll failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown received, stopping watcher");
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown received, stopping watcher");
                    break;
                }
            }
        }

        tracing::info!(cursor = self.cursor.block(), "Event watcher stopped");
    }
}
