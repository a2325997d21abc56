//! Collateral Manager (spec §4.8). No direct teacher analogue (Aave
//! liquidations there leave seized aTokens untouched); written in the
//! `liquidation::opportunity` style of a free function taking every
//! collaborator as a parameter, since this module sits downstream of both
//! the Route Optimizer and the Swap Executor.

use crate::config::CollateralSwapConfig;
use crate::oracle::PriceOracleClient;
use crate::price_impact::{calculate_min_amount_out, check_price_impact};
use crate::route::{RouteOptimizer, FEE_MEDIUM};
use crate::stats::StatsRecorder;
use crate::swap::SwapExecutor;
use crate::types::{CollateralStrategy, Route, SwapResult, TokenConfigMap};
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use eyre::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SANITY_CEILING_USD: f64 = 1_000_000.0;

pub struct CollateralManager<P> {
    oracle: Arc<PriceOracleClient<P>>,
    router: Arc<RouteOptimizer<P>>,
    swap_executor: Arc<SwapExecutor<P>>,
    strategy: CollateralStrategy,
    target_stablecoin: Address,
    config: CollateralSwapConfig,
    stats: StatsRecorder,
}

impl<P> CollateralManager<P>
where
    P: Provider,
{
    pub fn new(
        oracle: Arc<PriceOracleClient<P>>,
        router: Arc<RouteOptimizer<P>>,
        swap_executor: Arc<SwapExecutor<P>>,
        strategy: CollateralStrategy,
        target_stablecoin: Address,
        config: CollateralSwapConfig,
        stats: StatsRecorder,
    ) -> Self {
        Self {
            oracle,
            router,
            swap_executor,
            strategy,
            target_stablecoin,
            config,
            stats,
        }
    }

    /// Dispatches per the configured [`CollateralStrategy`]. Returns `None`
    /// for HOLD (and for CONFIGURABLE entries with `auto_sell = false`).
    pub async fn manage_seized_collateral(
        &self,
        seize_token: Address,
        seize_amount: U256,
        seize_token_decimals: u8,
    ) -> Result<Option<SwapResult>> {
        match self.strategy {
            CollateralStrategy::Hold => Ok(None),
            CollateralStrategy::AutoSell => {
                self.auto_sell(seize_token, seize_amount, seize_token_decimals, None)
                    .await
            }
            CollateralStrategy::Configurable => {
                let lowered = format!("{seize_token:#x}").to_lowercase();
                let entry = self
                    .config
                    .token_configs
                    .iter()
                    .find(|(addr, _)| format!("{addr:#x}").to_lowercase() == lowered)
                    .map(|(_, cfg)| cfg.clone());

                match entry {
                    None => {
                        self.auto_sell(seize_token, seize_amount, seize_token_decimals, None)
                            .await
                    }
                    Some(cfg) if !cfg.auto_sell => Ok(None),
                    Some(cfg) => {
                        self.auto_sell(seize_token, seize_amount, seize_token_decimals, cfg.preferred_swap_path)
                            .await
                    }
                }
            }
        }
    }

    async fn auto_sell(
        &self,
        seize_token: Address,
        seize_amount: U256,
        seize_token_decimals: u8,
        preferred_path: Option<Vec<Address>>,
    ) -> Result<Option<SwapResult>> {
        if seize_token == self.target_stablecoin {
            return Ok(Some(SwapResult {
                success: true,
                tx_hash: None,
                amount_in: seize_amount,
                amount_out: Some(seize_amount),
                token_in: seize_token,
                token_out: self.target_stablecoin,
                gas_used: None,
                price_impact: Some(0.0),
                error: None,
            }));
        }

        let price_in = self
            .oracle
            .get_underlying_price_usd(seize_token, seize_token_decimals)
            .await;
        let price_out = self
            .oracle
            .get_underlying_price_usd(self.target_stablecoin, 18)
            .await;

        let (price_in, price_out) = match (price_in, price_out) {
            (Ok(p_in), Ok(p_out))
                if p_in.is_finite() && p_in > 0.0 && p_in < SANITY_CEILING_USD
                    && p_out.is_finite() && p_out > 0.0 && p_out < SANITY_CEILING_USD =>
            {
                (p_in, p_out)
            }
            _ => {
                warn!(%seize_token, "collateral manager: unreliable oracle price, skipping sale");
                return Ok(None);
            }
        };

        let amount_in_human = u256_to_f64(seize_amount, seize_token_decimals);
        let usd_value = amount_in_human * price_in;
        if usd_value < self.config.min_swap_amount_usd {
            debug!(usd_value, min = self.config.min_swap_amount_usd, "below min swap threshold, holding");
            return Ok(None);
        }

        let route = match preferred_path {
            Some(path) if path.len() >= 2 => Some(Route {
                fees: vec![FEE_MEDIUM; path.len() - 1],
                expected_out: U256::ZERO,
                path,
            }),
            _ => self
                .router
                .find_best_route(seize_token, self.target_stablecoin, seize_amount)
                .await?,
        };

        let Some(route) = route else {
            info!(%seize_token, "no route found to target stablecoin, holding collateral");
            return Ok(None);
        };

        let expected_out_human = u256_to_f64(route.expected_out, 18);
        let impact = check_price_impact(amount_in_human, price_in, expected_out_human, price_out, self.config.max_price_impact);
        if !impact.is_acceptable {
            warn!(impact_percent = impact.impact_percent, "price impact too high, holding collateral");
            return Ok(None);
        }

        let min_out = calculate_min_amount_out(
            seize_amount,
            seize_token_decimals,
            price_in,
            price_out,
            18,
            self.config.max_slippage,
        );

        self.stats.record_swap_attempt().await;
        let result = self.swap_executor.execute_swap(&route, seize_amount, min_out).await?;
        self.stats.record_swap_result(result.success, usd_value).await;
        Ok(Some(result))
    }
}

fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    let as_f64: f64 = value.to_string().parse().unwrap_or(0.0);
    as_f64 / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u256_conversion_handles_six_and_eighteen_decimals() {
        let usdt = U256::from(10_000_000u64); // 10 USDT @ 6 decimals
        assert!((u256_to_f64(usdt, 6) - 10.0).abs() < 1e-9);

        let wbnb = U256::from(1_500_000_000_000_000_000u128); // 1.5 WBNB @ 18 decimals
        assert!((u256_to_f64(wbnb, 18) - 1.5).abs() < 1e-9);
    }
}
