//! PostgreSQL swap store

use super::models::{MatchTx, SwapRecord, SwapResult, SwapStats, SwapStatus};
use super::SwapStore;
use crate::config::DatabaseConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{SwapDirection, SwapType};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

/// Swap store backed by PostgreSQL
pub struct PgSwapStore {
    pool: PgPool,
}

impl PgSwapStore {
    pub async fn new(config: &DatabaseConfig) -> BridgeResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Create tables and indexes
    pub async fn run_migrations(&self) -> BridgeResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS swaps (
                tx_id VARCHAR(128) NOT NULL,
                direction VARCHAR(10) NOT NULL,
                bind VARCHAR(128) NOT NULL,
                status VARCHAR(20) NOT NULL,
                memo TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (tx_id, direction)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_swaps_scan
            ON swaps (direction, status, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS swap_results (
                tx_id VARCHAR(128) NOT NULL,
                direction VARCHAR(10) NOT NULL,
                from_address VARCHAR(128) NOT NULL,
                to_address VARCHAR(128) NOT NULL,
                bind VARCHAR(128) NOT NULL,
                value NUMERIC(78, 0) NOT NULL,
                height BIGINT NOT NULL,
                timestamp BIGINT NOT NULL,
                swap_tx VARCHAR(128) NOT NULL DEFAULT '',
                swap_value VARCHAR(80) NOT NULL DEFAULT '',
                swap_type VARCHAR(10) NOT NULL DEFAULT 'noswap',
                swap_height BIGINT NOT NULL DEFAULT 0,
                swap_time BIGINT NOT NULL DEFAULT 0,
                status VARCHAR(20) NOT NULL,
                memo TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (tx_id, direction)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> BridgeResult<T> {
    let text: String = row.try_get(column)?;
    text.parse::<T>()
        .map_err(|e| BridgeError::Internal(format!("bad {} column: {}", column, e)))
}

fn record_from_row(row: &PgRow) -> BridgeResult<SwapRecord> {
    Ok(SwapRecord {
        tx_id: row.try_get("tx_id")?,
        direction: parse_column(row, "direction")?,
        bind: row.try_get("bind")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        memo: row.try_get("memo")?,
    })
}

fn result_from_row(row: &PgRow) -> BridgeResult<SwapResult> {
    Ok(SwapResult {
        tx_id: row.try_get("tx_id")?,
        direction: parse_column(row, "direction")?,
        from: row.try_get("from_address")?,
        to: row.try_get("to_address")?,
        bind: row.try_get("bind")?,
        value: row.try_get("value")?,
        height: row.try_get::<i64, _>("height")? as u64,
        timestamp: row.try_get::<i64, _>("timestamp")? as u64,
        swap_tx: row.try_get("swap_tx")?,
        swap_value: row.try_get("swap_value")?,
        swap_type: parse_column(row, "swap_type")?,
        swap_height: row.try_get::<i64, _>("swap_height")? as u64,
        swap_time: row.try_get::<i64, _>("swap_time")? as u64,
        status: parse_column(row, "status")?,
        memo: row.try_get("memo")?,
    })
}

#[async_trait]
impl SwapStore for PgSwapStore {
    async fn find_swaps_with_status(
        &self,
        direction: SwapDirection,
        status: SwapStatus,
        since: DateTime<Utc>,
    ) -> BridgeResult<Vec<SwapRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT tx_id, direction, bind, status, memo, created_at, updated_at
            FROM swaps
            WHERE direction = $1 AND status = $2 AND created_at >= $3
            ORDER BY created_at, tx_id
            "#,
        )
        .bind(direction.as_str())
        .bind(status.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn add_swap(&self, record: &SwapRecord, result: &SwapResult) -> BridgeResult<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO swaps (tx_id, direction, bind, status, memo, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tx_id, direction) DO NOTHING
            "#,
        )
        .bind(&record.tx_id)
        .bind(record.direction.as_str())
        .bind(&record.bind)
        .bind(record.status.as_str())
        .bind(&record.memo)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO swap_results
                (tx_id, direction, from_address, to_address, bind, value, height, timestamp,
                 swap_tx, swap_value, swap_type, swap_height, swap_time, status, memo)
            VALUES ($1, $2, $3, $4, $5, $6::NUMERIC, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(&result.tx_id)
        .bind(result.direction.as_str())
        .bind(&result.from)
        .bind(&result.to)
        .bind(&result.bind)
        .bind(&result.value)
        .bind(result.height as i64)
        .bind(result.timestamp as i64)
        .bind(&result.swap_tx)
        .bind(&result.swap_value)
        .bind(result.swap_type.as_str())
        .bind(result.swap_height as i64)
        .bind(result.swap_time as i64)
        .bind(result.status.as_str())
        .bind(&result.memo)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Stored {} swap {}", record.direction, record.tx_id);
        Ok(true)
    }

    async fn find_swap(&self, direction: SwapDirection, tx_id: &str) -> BridgeResult<Option<SwapRecord>> {
        let row = sqlx::query(
            r#"
            SELECT tx_id, direction, bind, status, memo, created_at, updated_at
            FROM swaps
            WHERE tx_id = $1 AND direction = $2
            "#,
        )
        .bind(tx_id)
        .bind(direction.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn update_swap_status(
        &self,
        direction: SwapDirection,
        tx_id: &str,
        status: SwapStatus,
        memo: &str,
    ) -> BridgeResult<()> {
        sqlx::query(
            r#"
            UPDATE swaps
            SET status = $1, memo = $2, updated_at = NOW()
            WHERE tx_id = $3 AND direction = $4
            "#,
        )
        .bind(status.as_str())
        .bind(memo)
        .bind(tx_id)
        .bind(direction.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_swap_result(
        &self,
        direction: SwapDirection,
        tx_id: &str,
    ) -> BridgeResult<Option<SwapResult>> {
        let row = sqlx::query(
            r#"
            SELECT tx_id, direction, from_address, to_address, bind, value::TEXT AS value,
                   height, timestamp, swap_tx, swap_value, swap_type, swap_height, swap_time,
                   status, memo
            FROM swap_results
            WHERE tx_id = $1 AND direction = $2
            "#,
        )
        .bind(tx_id)
        .bind(direction.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(result_from_row).transpose()
    }

    async fn update_swap_result(
        &self,
        direction: SwapDirection,
        tx_id: &str,
        match_tx: &MatchTx,
    ) -> BridgeResult<()> {
        sqlx::query(
            r#"
            UPDATE swap_results
            SET swap_tx = $1, swap_value = $2, swap_type = $3, swap_height = $4, swap_time = $5
            WHERE tx_id = $6 AND direction = $7
            "#,
        )
        .bind(&match_tx.swap_tx)
        .bind(&match_tx.swap_value)
        .bind(match_tx.swap_type.unwrap_or(SwapType::NoSwap).as_str())
        .bind(match_tx.swap_height as i64)
        .bind(match_tx.swap_time as i64)
        .bind(tx_id)
        .bind(direction.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_swap_result_status(
        &self,
        direction: SwapDirection,
        tx_id: &str,
        status: SwapStatus,
        memo: &str,
    ) -> BridgeResult<()> {
        sqlx::query(
            r#"
            UPDATE swap_results
            SET status = $1, memo = $2
            WHERE tx_id = $3 AND direction = $4
            "#,
        )
        .bind(status.as_str())
        .bind(memo)
        .bind(tx_id)
        .bind(direction.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn swap_stats(&self) -> BridgeResult<SwapStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'not_swapped') as not_swapped,
                COUNT(*) FILTER (WHERE status = 'processed') as processed,
                COUNT(*) FILTER (WHERE status = 'swap_failed') as swap_failed
            FROM swaps
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SwapStats {
            not_swapped: row.try_get::<i64, _>("not_swapped")? as u64,
            processed: row.try_get::<i64, _>("processed")? as u64,
            swap_failed: row.try_get::<i64, _>("swap_failed")? as u64,
        })
    }

    async fn health_check(&self) -> BridgeResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
