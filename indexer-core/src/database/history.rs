//! History pruning: delete rows older than the retention window and
//! reposition the first-indexed cursor.

use sqlx::{Postgres, Transaction};
use tracing::info;

use super::{upsert_state, Database, BATCH_SIZE};
use crate::entities::{ChainBlock, Entity, State};
use crate::error::Result;

impl<B, T> Database<B, T>
where
    B: ChainBlock + Entity,
    T: Entity,
{
    /// One pruning pass in a single DB transaction. Deletes everything with
    /// `timestamp < last_block_timestamp - interval_seconds` in 1000-row
    /// chunks (transactions first, then blocks), then repositions
    /// `first_indexed_*` from the earliest surviving block. When the purge
    /// removed everything, the indexed cursors are zeroed and the state row
    /// is left for the driver to persist with its next batch.
    ///
    /// Returns the updated state in all cases.
    pub async fn drop_history_iteration(
        &self,
        state: State,
        interval_seconds: u64,
        last_block_timestamp: u64,
    ) -> Result<State> {
        let delete_before = last_block_timestamp.saturating_sub(interval_seconds);

        let mut tx = self.pool.begin().await?;

        // Transactions before blocks, so a failure cannot orphan rows.
        delete_in_batches(&mut tx, T::TABLE, delete_before).await?;
        delete_in_batches(&mut tx, B::TABLE, delete_before).await?;

        let first_block: Option<(i64, i64)> = sqlx::query_as(&format!(
            "SELECT block_number, timestamp FROM {} ORDER BY block_number LIMIT 1",
            B::TABLE
        ))
        .fetch_optional(&mut *tx)
        .await?;

        let mut new_state = state;
        new_state.last_history_drop = chrono::Utc::now().timestamp() as u64;

        match first_block {
            None => {
                new_state.first_indexed_block_number = 0;
                new_state.first_indexed_block_timestamp = 0;
                new_state.last_indexed_block_number = 0;
                new_state.last_indexed_block_timestamp = 0;
            }
            Some((block_number, timestamp)) => {
                new_state.first_indexed_block_number = block_number as u64;
                new_state.first_indexed_block_timestamp = timestamp as u64;

                upsert_state(&mut tx, &new_state).await?;
            }
        }

        tx.commit().await?;

        info!(
            "deleted blocks up to index {}",
            new_state.first_indexed_block_number
        );

        Ok(new_state)
    }
}

/// Delete matching rows in fixed-size chunks so the transaction never takes
/// long row locks in one statement.
async fn delete_in_batches(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    delete_before: u64,
) -> Result<()> {
    let statement = format!(
        "DELETE FROM {table} WHERE ctid IN \
         (SELECT ctid FROM {table} WHERE timestamp < $1 LIMIT $2)"
    );

    loop {
        let result = sqlx::query(&statement)
            .bind(delete_before as i64)
            .bind(BATCH_SIZE as i64)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(());
        }
    }
}
