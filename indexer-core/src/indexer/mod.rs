//! The indexing engine.
//!
//! A single driver loop refreshes the chain head, launches background
//! history drops when due, fetches the next confirmed block range with
//! bounded concurrency and persists each batch atomically together with the
//! advanced state. Transient failures are absorbed by layered backoff; the
//! loop exits only on a configured end block or an exhausted retry budget.

mod history;

use std::time::Duration;

use futures_util::{stream, StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::chain::{BlockResult, ChainClient};
use crate::config::BaseConfig;
use crate::database::Database;
use crate::entities::{ChainBlock, Entity, State};
use crate::error::{IndexerError, Result};
use crate::reliable::ReliableClient;
use crate::retry::{retry, Backoff, RetryConfig};

pub struct Indexer<C, B, T> {
    chain: ReliableClient<C>,
    db: Database<B, T>,
    confirmations: u64,
    max_block_range: u64,
    max_concurrency: usize,
    start_block_number: u64,
    end_block_number: u64,
    history_drop_interval: u64,
    history_drop_frequency: u64,
    retry_config: RetryConfig,
}

struct IterationResult<B, T> {
    block_results: Vec<BlockResult<B, T>>,
    state: State,
}

impl<C, B, T> Indexer<C, B, T>
where
    C: ChainClient<B, T>,
    B: ChainBlock + Entity,
    T: Entity,
{
    pub fn new(config: &BaseConfig, db: Database<B, T>, chain: C) -> Self {
        let max_elapsed = Duration::from_secs(config.timeout.backoff_max_elapsed_time_seconds);
        let request_timeout = Duration::from_millis(config.timeout.request_timeout_millis);

        Self {
            chain: ReliableClient::new(chain, max_elapsed, request_timeout),
            db,
            confirmations: config.indexer.confirmations,
            max_block_range: config.indexer.max_block_range,
            max_concurrency: config.indexer.max_concurrency.max(1),
            start_block_number: config.indexer.start_block_number,
            end_block_number: config.indexer.end_block_number,
            history_drop_interval: config.db.history_drop,
            history_drop_frequency: config.db.effective_history_drop_frequency(),
            retry_config: RetryConfig::with_max_elapsed(Some(max_elapsed)),
        }
    }

    /// Drive the engine until the configured end block is indexed (`Ok`) or a
    /// retry budget is exhausted (`Err`). Runs forever when no end block is
    /// set.
    pub async fn run(&mut self) -> Result<()> {
        // Paces polling while no new confirmed blocks exist; grows while
        // idle, reset as soon as a batch lands.
        let mut up_to_date = Backoff::new(RetryConfig::with_max_elapsed(None));

        let (drop_sender, mut drop_receiver) = mpsc::channel::<Option<State>>(1);
        let mut drop_in_progress = false;

        let mut state = self.db.get_state().await?;

        loop {
            state = retry(&self.retry_config, "update chain state", || {
                self.update_chain_state(state)
            })
            .await?;

            self.poll_history_drop_results(&mut drop_receiver, &mut drop_in_progress, &mut state)
                .await?;
            self.maybe_start_history_drop(&drop_sender, &mut drop_in_progress, &state);

            state = self.iterate_with_retry(state, &mut up_to_date).await?;

            if self.end_block_number != 0
                && self.end_block_number <= state.last_indexed_block_number
            {
                return Ok(());
            }
        }
    }

    /// One fetch-and-persist step under its own retry budget. Returns the
    /// state to carry into the next loop turn.
    async fn iterate_with_retry(&self, state: State, up_to_date: &mut Backoff) -> Result<State> {
        let mut attempts = Backoff::new(self.retry_config.clone());

        loop {
            let outcome: Result<Option<State>> = async {
                match self.run_iteration(&state).await? {
                    None => Ok(None),
                    Some(result) => {
                        self.save_data(&result).await?;
                        Ok(Some(result.state))
                    }
                }
            }
            .await;

            match outcome {
                Ok(None) => {
                    if let Some(delay) = up_to_date.next_delay() {
                        tokio::time::sleep(delay).await;
                    }
                    return Ok(state);
                }
                Ok(Some(new_state)) => {
                    up_to_date.reset();
                    info!(
                        "successfully processed up to block {}",
                        new_state.last_indexed_block_number
                    );
                    return Ok(new_state);
                }
                Err(err) => match attempts.next_delay() {
                    Some(delay) => {
                        error!("indexer iteration error: {err}. Will retry after {delay:?}");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(IndexerError::exhausted("indexer iteration", err)),
                },
            }
        }
    }

    async fn run_iteration(&self, state: &State) -> Result<Option<IterationResult<B, T>>> {
        let range = block_range(
            state,
            self.start_block_number,
            self.confirmations,
            self.max_block_range,
        );
        if range.is_empty() {
            return Ok(None);
        }

        debug!(
            "indexing from block {} to {}, latest block on chain {}",
            range.start,
            range.end - 1,
            state.last_chain_block_number
        );

        let block_results = self.get_block_results(&range).await?;
        let state = advanced_state(
            &block_results,
            state,
            chrono::Utc::now().timestamp() as u64,
        );

        Ok(Some(IterationResult {
            block_results,
            state,
        }))
    }

    /// Fetch every block in the range with at most `max_concurrency` requests
    /// in flight. Results come back slot-ordered; the first terminal failure
    /// drops the remaining in-flight fetches.
    async fn get_block_results(&self, range: &BlockRange) -> Result<Vec<BlockResult<B, T>>> {
        stream::iter(range.start..range.end)
            .map(|block_number| self.chain.get_block_result(block_number))
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }

    async fn save_data(&self, result: &IterationResult<B, T>) -> Result<()> {
        let mut blocks = Vec::with_capacity(result.block_results.len());
        let mut transactions = Vec::new();
        for block_result in &result.block_results {
            blocks.push(block_result.block.clone());
            transactions.extend(block_result.transactions.iter().cloned());
        }

        debug!(
            "fetched {} blocks with {} transactions from the chain",
            blocks.len(),
            transactions.len()
        );

        self.db
            .save_all_entities(&blocks, &transactions, &result.state)
            .await?;
        debug!("data saved to the DB");

        Ok(())
    }

    async fn update_chain_state(&self, state: State) -> Result<State> {
        let mut new_state = state;
        new_state.last_chain_block_updated = chrono::Utc::now().timestamp() as u64;

        let block_info = self.chain.get_latest_block_info().await?;
        new_state.last_chain_block_number = block_info.block_number;
        new_state.last_chain_block_timestamp = block_info.timestamp;

        Ok(new_state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockRange {
    start: u64,
    /// Exclusive.
    end: u64,
}

impl BlockRange {
    fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

fn block_range(
    state: &State,
    configured_start: u64,
    confirmations: u64,
    max_block_range: u64,
) -> BlockRange {
    let start = start_block(state, configured_start);
    let end = end_block(state, start, confirmations, max_block_range);

    BlockRange { start, end }
}

fn start_block(state: &State, configured_start: u64) -> u64 {
    if state.last_indexed_block_number < configured_start {
        configured_start
    } else {
        state.last_indexed_block_number + 1
    }
}

fn end_block(state: &State, start: u64, confirmations: u64, max_block_range: u64) -> u64 {
    let latest_confirmed = (state.last_chain_block_number + 1).saturating_sub(confirmations);
    if latest_confirmed < start {
        return start;
    }

    let num_blocks = latest_confirmed + 1 - start;
    if num_blocks > max_block_range {
        start + max_block_range
    } else {
        latest_confirmed + 1
    }
}

fn advanced_state<B: ChainBlock, T>(
    results: &[BlockResult<B, T>],
    state: &State,
    now: u64,
) -> State {
    if results.is_empty() {
        return *state;
    }

    let mut new_state = *state;

    let last_block = &results[results.len() - 1].block;
    new_state.last_indexed_block_number = last_block.block_number();
    new_state.last_indexed_block_timestamp = last_block.timestamp();

    // First iteration ever also pins the start of the indexed window.
    if state.last_indexed_block_number == 0 {
        let first_block = &results[0].block;
        new_state.first_indexed_block_number = first_block.block_number();
        new_state.first_indexed_block_timestamp = first_block.timestamp();
    }

    new_state.last_indexed_block_updated = now;

    new_state
}
