//! Durable store over Postgres.
//!
//! The framework owns the `states` and `versions` singleton rows; the
//! chain-specific block and transaction tables are described by the
//! [`Entity`] implementations and migrated here alongside them.

mod history;

use std::marker::PhantomData;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};

use crate::config::DbConfig;
use crate::entities::{ChainBlock, Entity, State, Version, GLOBAL_STATE_ID};
use crate::error::Result;

/// Rows per bulk INSERT; also the history-drop delete chunk.
const BATCH_SIZE: usize = 1000;

const STATES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS states (
    id BIGINT PRIMARY KEY,
    last_chain_block_number BIGINT NOT NULL DEFAULT 0,
    last_chain_block_timestamp BIGINT NOT NULL DEFAULT 0,
    last_indexed_block_number BIGINT NOT NULL DEFAULT 0,
    last_indexed_block_timestamp BIGINT NOT NULL DEFAULT 0,
    first_indexed_block_number BIGINT NOT NULL DEFAULT 0,
    first_indexed_block_timestamp BIGINT NOT NULL DEFAULT 0,
    last_indexed_block_updated BIGINT NOT NULL DEFAULT 0,
    last_chain_block_updated BIGINT NOT NULL DEFAULT 0,
    last_history_drop BIGINT NOT NULL DEFAULT 0
)
"#;

const VERSIONS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS versions (
    id BIGINT PRIMARY KEY,
    node_version TEXT NOT NULL DEFAULT '',
    git_tag TEXT NOT NULL DEFAULT '',
    git_hash VARCHAR(40) NOT NULL DEFAULT '',
    build_date BIGINT NOT NULL DEFAULT 0,
    num_confirmations BIGINT NOT NULL DEFAULT 0,
    history_seconds BIGINT NOT NULL DEFAULT 0
)
"#;

const UPSERT_STATE: &str = r#"
INSERT INTO states (
    id,
    last_chain_block_number, last_chain_block_timestamp,
    last_indexed_block_number, last_indexed_block_timestamp,
    first_indexed_block_number, first_indexed_block_timestamp,
    last_indexed_block_updated, last_chain_block_updated,
    last_history_drop
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (id) DO UPDATE SET
    last_chain_block_number = EXCLUDED.last_chain_block_number,
    last_chain_block_timestamp = EXCLUDED.last_chain_block_timestamp,
    last_indexed_block_number = EXCLUDED.last_indexed_block_number,
    last_indexed_block_timestamp = EXCLUDED.last_indexed_block_timestamp,
    first_indexed_block_number = EXCLUDED.first_indexed_block_number,
    first_indexed_block_timestamp = EXCLUDED.first_indexed_block_timestamp,
    last_indexed_block_updated = EXCLUDED.last_indexed_block_updated,
    last_chain_block_updated = EXCLUDED.last_chain_block_updated,
    last_history_drop = EXCLUDED.last_history_drop
"#;

const UPSERT_VERSION: &str = r#"
INSERT INTO versions (
    id, node_version, git_tag, git_hash,
    build_date, num_confirmations, history_seconds
) VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (id) DO UPDATE SET
    node_version = EXCLUDED.node_version,
    git_tag = EXCLUDED.git_tag,
    git_hash = EXCLUDED.git_hash,
    build_date = EXCLUDED.build_date,
    num_confirmations = EXCLUDED.num_confirmations,
    history_seconds = EXCLUDED.history_seconds
"#;

pub struct Database<B, T> {
    pool: PgPool,
    _entities: PhantomData<fn() -> (B, T)>,
}

impl<B, T> Clone for Database<B, T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _entities: PhantomData,
        }
    }
}

impl<B, T> Database<B, T>
where
    B: ChainBlock + Entity,
    T: Entity,
{
    /// Connect and migrate. With `drop_table_at_start` the state, block and
    /// transaction tables are dropped first (versions survives restarts).
    pub async fn new(config: &DbConfig) -> Result<Self> {
        let pool = connect(config).await?;
        debug!("connected to the DB");

        let db = Self {
            pool,
            _entities: PhantomData,
        };

        if config.drop_table_at_start {
            info!("DB tables dropped at start");
            db.drop_tables().await?;
        }

        db.migrate().await?;
        debug!("migrated DB entities");

        Ok(db)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn drop_tables(&self) -> Result<()> {
        for table in ["states", B::TABLE, T::TABLE] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        let statements = [STATES_DDL, VERSIONS_DDL]
            .into_iter()
            .chain(B::MIGRATIONS.iter().copied())
            .chain(T::MIGRATIONS.iter().copied());

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Read the singleton state row; an absent row yields the zero-valued
    /// initial state without inserting it.
    pub async fn get_state(&self) -> Result<State> {
        let state = sqlx::query_as::<_, State>("SELECT * FROM states WHERE id = $1")
            .bind(GLOBAL_STATE_ID as i64)
            .fetch_optional(&self.pool)
            .await?;

        Ok(state.unwrap_or_else(State::initial))
    }

    /// Persist one iteration atomically: blocks and transactions with
    /// conflict-do-nothing, then the advanced state.
    pub async fn save_all_entities(
        &self,
        blocks: &[B],
        transactions: &[T],
        state: &State,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        insert_entities(&mut tx, blocks).await?;
        insert_entities(&mut tx, transactions).await?;
        upsert_state(&mut tx, state).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn save_version(&self, version: &Version) -> Result<()> {
        sqlx::query(UPSERT_VERSION)
            .bind(version.id as i64)
            .bind(&version.node_version)
            .bind(&version.git_tag)
            .bind(&version.git_hash)
            .bind(version.build_date as i64)
            .bind(version.num_confirmations as i64)
            .bind(version.history_seconds as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

async fn connect(config: &DbConfig) -> Result<PgPool> {
    let statement_level = if config.log_queries {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Off
    };

    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.db_name)
        .log_statements(statement_level);

    let pool = PgPoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

async fn insert_entities<E: Entity>(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[E],
) -> Result<()> {
    for chunk in rows.chunks(BATCH_SIZE) {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) ",
            E::TABLE,
            E::COLUMNS.join(", ")
        ));
        builder.push_values(chunk, |mut row, entity| entity.push_tuple(&mut row));
        builder.push(" ON CONFLICT DO NOTHING");

        builder.build().execute(&mut **tx).await?;
    }

    Ok(())
}

async fn upsert_state(tx: &mut Transaction<'_, Postgres>, state: &State) -> Result<()> {
    sqlx::query(UPSERT_STATE)
        .bind(state.id as i64)
        .bind(state.last_chain_block_number as i64)
        .bind(state.last_chain_block_timestamp as i64)
        .bind(state.last_indexed_block_number as i64)
        .bind(state.last_indexed_block_timestamp as i64)
        .bind(state.first_indexed_block_number as i64)
        .bind(state.first_indexed_block_timestamp as i64)
        .bind(state.last_indexed_block_updated as i64)
        .bind(state.last_chain_block_updated as i64)
        .bind(state.last_history_drop as i64)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
