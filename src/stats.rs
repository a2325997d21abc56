//! Stats aggregator (spec §3, §10.3). Grounded on
//! `monitoring::liquidation_monitor::LiquidationMonitor`'s
//! `Arc<RwLock<Stats>>` shape, narrowed to the fields the spec names and
//! paired with periodic persistence through [`crate::database`].

use crate::types::Stats;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Clone)]
pub struct StatsRecorder {
    inner: Arc<RwLock<Stats>>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Stats::default())),
        }
    }

    pub async fn snapshot(&self) -> Stats {
        self.inner.read().await.clone()
    }

    pub async fn record_swap_attempt(&self) {
        self.inner.write().await.swaps_attempted += 1;
    }

    pub async fn record_swap_result(&self, succeeded: bool, usd_value: f64) {
        let mut stats = self.inner.write().await;
        if succeeded {
            stats.swaps_succeeded += 1;
            stats.total_usd_swapped += usd_value;
        } else {
            stats.swaps_failed += 1;
        }
    }

    pub async fn record_liquidation_success(&self, profit_usd: f64, gas_cost_usd: f64) {
        let mut stats = self.inner.write().await;
        stats.liquidations_succeeded += 1;
        stats.total_profit_usd += profit_usd;
        stats.total_gas_cost_usd += gas_cost_usd;
    }

    pub async fn record_liquidation_failure(&self) {
        self.inner.write().await.liquidations_failed += 1;
    }

    pub async fn record_dry_run_attempt(&self) {
        self.inner.write().await.dry_run_attempts += 1;
    }

    pub async fn record_loss(&self, loss_usd: f64) {
        self.inner.write().await.daily_loss_usd += loss_usd.max(0.0);
    }

    pub async fn reset_daily_loss(&self) {
        self.inner.write().await.daily_loss_usd = 0.0;
    }

    pub async fn persist(&self, db_pool: &Pool<Sqlite>) -> eyre::Result<()> {
        let snapshot = self.snapshot().await;
        crate::database::save_stats_snapshot(db_pool, &snapshot).await?;
        info!(
            liquidations_succeeded = snapshot.liquidations_succeeded,
            total_profit_usd = snapshot.total_profit_usd,
            "persisted stats snapshot"
        );
        Ok(())
    }
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn swap_outcomes_accumulate_distinctly() {
        let recorder = StatsRecorder::new();
        recorder.record_swap_attempt().await;
        recorder.record_swap_result(true, 150.0).await;
        recorder.record_swap_attempt().await;
        recorder.record_swap_result(false, 0.0).await;

        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.swaps_attempted, 2);
        assert_eq!(snapshot.swaps_succeeded, 1);
        assert_eq!(snapshot.swaps_failed, 1);
        assert_eq!(snapshot.total_usd_swapped, 150.0);
    }

    #[tokio::test]
    async fn daily_loss_resets_independently_of_other_counters() {
        let recorder = StatsRecorder::new();
        recorder.record_loss(40.0).await;
        recorder.record_liquidation_success(100.0, 5.0).await;
        recorder.reset_daily_loss().await;

        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.daily_loss_usd, 0.0);
        assert_eq!(snapshot.total_profit_usd, 100.0);
    }
}
