//! SQLite persistence (spec §10.3). Kept close to the teacher's own
//! `database.rs` table-per-concern layout and `INSERT OR REPLACE` idiom,
//! retargeted from Aave's base-currency position fields onto the Venus
//! health-factor model and widened with a stats snapshot table.

use crate::types::{Position, Stats};
use alloy_primitives::Address;
use chrono::Utc;
use eyre::Result;
use sqlx::{Pool, Row, Sqlite};
use tracing::info;

pub async fn init_database(database_url: &str) -> Result<Pool<Sqlite>> {
    let pool = sqlx::SqlitePool::connect(database_url).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            borrower TEXT PRIMARY KEY,
            health_factor TEXT NOT NULL,
            collateral_value_usd REAL NOT NULL,
            debt_value_usd REAL NOT NULL,
            shortfall_usd REAL NOT NULL,
            estimated_profit_usd REAL NOT NULL,
            last_updated DATETIME NOT NULL,
            is_liquidatable BOOLEAN NOT NULL DEFAULT FALSE
        )
    "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS liquidation_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            borrower TEXT NOT NULL,
            repay_token TEXT,
            seize_token TEXT,
            profit_usd REAL NOT NULL,
            tx_hash TEXT,
            swap_tx_hash TEXT,
            timestamp DATETIME NOT NULL
        )
    "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS monitoring_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            borrower TEXT,
            health_factor TEXT,
            timestamp DATETIME NOT NULL,
            details TEXT
        )
    "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS asset_prices (
            asset_address TEXT PRIMARY KEY,
            price_usd REAL NOT NULL,
            decimals INTEGER NOT NULL,
            last_updated DATETIME NOT NULL,
            source TEXT NOT NULL DEFAULT 'venus_oracle'
        )
    "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stats_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            swaps_attempted INTEGER NOT NULL,
            swaps_succeeded INTEGER NOT NULL,
            swaps_failed INTEGER NOT NULL,
            total_usd_swapped REAL NOT NULL,
            liquidations_succeeded INTEGER NOT NULL,
            liquidations_failed INTEGER NOT NULL,
            total_profit_usd REAL NOT NULL,
            total_gas_cost_usd REAL NOT NULL,
            daily_loss_usd REAL NOT NULL,
            dry_run_attempts INTEGER NOT NULL,
            timestamp DATETIME NOT NULL
        )
    "#,
    )
    .execute(&pool)
    .await?;

    info!("database initialized at {database_url}");
    Ok(pool)
}

pub async fn save_position(db_pool: &Pool<Sqlite>, position: &Position, min_health_factor: f64) -> Result<()> {
    let is_liquidatable = position.is_liquidatable(min_health_factor, 0.0);
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO positions (
            borrower, health_factor, collateral_value_usd, debt_value_usd,
            shortfall_usd, estimated_profit_usd, last_updated, is_liquidatable
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(position.borrower.to_string())
    .bind(position.health_factor.to_string())
    .bind(position.collateral_value_usd)
    .bind(position.debt_value_usd)
    .bind(position.shortfall_usd)
    .bind(position.estimated_profit_usd)
    .bind(position.timestamp)
    .bind(is_liquidatable)
    .execute(db_pool)
    .await?;

    Ok(())
}

pub async fn log_liquidation_event(
    db_pool: &Pool<Sqlite>,
    borrower: Address,
    repay_token: Option<Address>,
    seize_token: Option<Address>,
    profit_usd: f64,
    tx_hash: &str,
    swap_tx_hash: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO liquidation_events (
            borrower, repay_token, seize_token, profit_usd, tx_hash, swap_tx_hash, timestamp
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(borrower.to_string())
    .bind(repay_token.map(|a| a.to_string()))
    .bind(seize_token.map(|a| a.to_string()))
    .bind(profit_usd)
    .bind(tx_hash)
    .bind(swap_tx_hash)
    .bind(Utc::now())
    .execute(db_pool)
    .await?;

    Ok(())
}

pub async fn log_monitoring_event(
    db_pool: &Pool<Sqlite>,
    event_type: &str,
    borrower: Option<Address>,
    health_factor: Option<f64>,
    details: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO monitoring_events (event_type, borrower, health_factor, timestamp, details)
        VALUES (?, ?, ?, ?, ?)
    "#,
    )
    .bind(event_type)
    .bind(borrower.map(|addr| addr.to_string()))
    .bind(health_factor.map(|hf| hf.to_string()))
    .bind(Utc::now())
    .bind(details)
    .execute(db_pool)
    .await?;

    Ok(())
}

pub async fn get_at_risk_borrowers(db_pool: &Pool<Sqlite>) -> Result<Vec<Address>> {
    let rows = sqlx::query(
        "SELECT borrower FROM positions WHERE is_liquidatable = true ORDER BY CAST(health_factor AS REAL) ASC LIMIT 100",
    )
    .fetch_all(db_pool)
    .await?;

    let mut borrowers = Vec::new();
    for row in rows {
        if let Ok(addr_str) = row.try_get::<String, _>("borrower") {
            if let Ok(addr) = addr_str.parse::<Address>() {
                borrowers.push(addr);
            }
        }
    }

    Ok(borrowers)
}

pub async fn save_asset_price(db_pool: &Pool<Sqlite>, asset: Address, price_usd: f64, decimals: u8) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO asset_prices (asset_address, price_usd, decimals, last_updated, source)
        VALUES (?, ?, ?, ?, 'venus_oracle')
    "#,
    )
    .bind(asset.to_string())
    .bind(price_usd)
    .bind(decimals as i32)
    .bind(Utc::now())
    .execute(db_pool)
    .await?;

    Ok(())
}

pub async fn save_stats_snapshot(db_pool: &Pool<Sqlite>, stats: &Stats) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO stats_snapshots (
            swaps_attempted, swaps_succeeded, swaps_failed, total_usd_swapped,
            liquidations_succeeded, liquidations_failed, total_profit_usd,
            total_gas_cost_usd, daily_loss_usd, dry_run_attempts, timestamp
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(stats.swaps_attempted as i64)
    .bind(stats.swaps_succeeded as i64)
    .bind(stats.swaps_failed as i64)
    .bind(stats.total_usd_swapped)
    .bind(stats.liquidations_succeeded as i64)
    .bind(stats.liquidations_failed as i64)
    .bind(stats.total_profit_usd)
    .bind(stats.total_gas_cost_usd)
    .bind(stats.daily_loss_usd)
    .bind(stats.dry_run_attempts as i64)
    .bind(Utc::now())
    .execute(db_pool)
    .await?;

    Ok(())
}
