//! History-drop orchestration: at most one background pruning task at a
//! time, with results merged back into the driver's state between
//! iterations.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info};

use super::Indexer;
use crate::chain::ChainClient;
use crate::entities::{ChainBlock, Entity, State};
use crate::error::{IndexerError, Result};
use crate::retry::retry;

impl<C, B, T> Indexer<C, B, T>
where
    C: ChainClient<B, T>,
    B: ChainBlock + Entity,
    T: Entity,
{
    /// Launch a background drop if one is due and none is running. The
    /// `in_progress` flag stays set until the task's result has been merged
    /// by [`Self::poll_history_drop_results`], so drops never overlap.
    pub(super) fn maybe_start_history_drop(
        &self,
        sender: &mpsc::Sender<Option<State>>,
        in_progress: &mut bool,
        state: &State,
    ) {
        if *in_progress {
            return;
        }
        if !should_run_history_drop(state, self.history_drop_interval, self.history_drop_frequency)
        {
            return;
        }

        *in_progress = true;

        // The task works on copies; state changes come back over the channel.
        let db = self.db.clone();
        let retry_config = self.retry_config.clone();
        let interval = self.history_drop_interval;
        let state = *state;
        let sender = sender.clone();

        tokio::spawn(async move {
            debug!("running history drop");

            let result = retry(&retry_config, "history drop", || {
                db.drop_history_iteration(state, interval, state.last_chain_block_timestamp)
            })
            .await;

            let outcome = match result {
                Ok(new_state) => Some(new_state),
                Err(err) => {
                    error!("fatal error in indexer history drop: {err}");
                    None
                }
            };

            // Capacity-1 channel with at most one task in flight; the send
            // cannot block and a dropped receiver means the driver exited.
            let _ = sender.send(outcome).await;
        });
    }

    /// Non-blocking check for a finished drop. A failed drop is fatal for
    /// the process; a successful one is merged selectively into the live
    /// state.
    pub(super) async fn poll_history_drop_results(
        &mut self,
        receiver: &mut mpsc::Receiver<Option<State>>,
        in_progress: &mut bool,
        state: &mut State,
    ) -> Result<()> {
        match receiver.try_recv() {
            Ok(Some(drop_state)) => {
                info!("history drop completed, new state: {drop_state:?}");
                state.last_history_drop = drop_state.last_history_drop;

                if drop_state.first_indexed_block_number > state.first_indexed_block_number {
                    state.first_indexed_block_number = drop_state.first_indexed_block_number;
                    state.first_indexed_block_timestamp = drop_state.first_indexed_block_timestamp;
                }

                // The drop wiped everything that was indexed.
                if drop_state.last_indexed_block_number == 0 {
                    state.last_indexed_block_number = 0;
                    state.last_indexed_block_timestamp = 0;

                    self.update_start_block().await?;
                }

                *in_progress = false;
                Ok(())
            }
            Ok(None) => {
                *in_progress = false;
                Err(IndexerError::HistoryDrop)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => Ok(()),
        }
    }

    /// After a full wipe the configured start may lie below the retention
    /// window; move it to the earliest block still inside the window.
    async fn update_start_block(&mut self) -> Result<()> {
        if self.history_drop_interval > 0 {
            self.start_block_number = self.min_block_within_history_interval().await?;
            info!(
                "new starting block number set to {} due to history drop",
                self.start_block_number
            );
        }

        Ok(())
    }

    /// Binary search over `[start_block, latest)` for the smallest block
    /// whose age relative to the chain head is within the retention
    /// interval. Any fetch error aborts the search.
    async fn min_block_within_history_interval(&self) -> Result<u64> {
        let start_block_time = self
            .chain
            .get_block_timestamp(self.start_block_number)
            .await?;
        let latest = self.chain.get_latest_block_info().await?;

        if latest.timestamp.saturating_sub(start_block_time) < self.history_drop_interval {
            return Ok(self.start_block_number);
        }
        if latest.block_number < self.start_block_number {
            return Ok(self.start_block_number);
        }

        let mut low = self.start_block_number;
        let mut high = latest.block_number;
        while low < high {
            let mid = low + (high - low) / 2;
            let block_time = self.chain.get_block_timestamp(mid).await?;

            if latest.timestamp.saturating_sub(block_time) <= self.history_drop_interval {
                high = mid;
            } else {
                low = mid + 1;
            }
        }

        Ok(low)
    }
}

fn should_run_history_drop(state: &State, interval: u64, frequency: u64) -> bool {
    if interval == 0 || state.last_chain_block_timestamp < state.last_history_drop {
        return false;
    }

    if state.last_chain_block_timestamp - state.last_history_drop >= frequency {
        debug!(
            "history drop should run: last drop {}, last block {}, frequency {}",
            state.last_history_drop, state.last_chain_block_timestamp, frequency
        );
        return true;
    }

    false
}
