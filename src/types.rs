//! Shared data model: positions, gas estimates, profitability analyses,
//! swap routes and results, retry bookkeeping, and running stats.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which execution path a liquidation should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationMode {
    /// Repay with the signer's own balance of the underlying asset.
    Standard,
    /// Borrow the repay amount via a flash loan, repaid atomically.
    FlashLoan,
}

/// How seized collateral should be handled after a successful liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollateralStrategy {
    /// Leave the seized vToken/underlying in the signer's wallet.
    Hold,
    /// Always swap to the configured target stablecoin.
    AutoSell,
    /// Consult per-token configuration; falls back to AutoSell when absent.
    Configurable,
}

/// Per-market entry held inside a [`Position`].
#[derive(Debug, Clone)]
pub struct MarketBalance {
    pub v_token: Address,
    pub underlying: Address,
    pub underlying_decimals: u8,
    pub balance: U256,
    pub borrow_balance: U256,
    pub value_usd: f64,
}

/// A snapshot of one borrower's account across every Venus market they've
/// entered.
#[derive(Debug, Clone)]
pub struct Position {
    pub borrower: Address,
    /// `f64::INFINITY` when the borrower has no outstanding debt.
    pub health_factor: f64,
    pub collateral_markets: Vec<MarketBalance>,
    pub borrow_markets: Vec<MarketBalance>,
    pub collateral_value_usd: f64,
    pub debt_value_usd: f64,
    pub liquidity_usd: f64,
    pub shortfall_usd: f64,
    pub estimated_profit_usd: f64,
    /// Market to repay (largest USD debt).
    pub repay_token: Option<Address>,
    /// Market to seize from (largest USD collateral).
    pub seize_token: Option<Address>,
    /// Amount of the repay token's underlying to cover, scaled by its decimals.
    pub repay_amount: U256,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    /// True once the account's health factor has dropped below `min_health_factor`
    /// and it carries enough debt to be worth the gas of liquidating.
    pub fn is_liquidatable(&self, min_health_factor: f64, min_position_size_usd: f64) -> bool {
        self.health_factor.is_finite()
            && self.health_factor < min_health_factor
            && self.debt_value_usd >= min_position_size_usd
    }
}

/// Gas cost projection for a prospective liquidation transaction.
#[derive(Debug, Clone, Copy)]
pub struct GasEstimate {
    pub estimated_gas: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub gas_price_gwei: f64,
    pub estimated_cost_usd: f64,
}

impl GasEstimate {
    pub fn is_valid(&self) -> bool {
        self.estimated_cost_usd.is_finite()
            && self.estimated_cost_usd >= 0.0
            && self.max_fee_per_gas >= self.max_priority_fee_per_gas
    }
}

/// Net-profit breakdown for one candidate liquidation.
#[derive(Debug, Clone, Copy)]
pub struct ProfitabilityAnalysis {
    pub gross_profit_usd: f64,
    pub gas_cost_usd: f64,
    pub flash_loan_fee_usd: f64,
    pub net_profit_usd: f64,
    pub profit_margin: f64,
    pub is_profitable: bool,
    pub recommended_mode: LiquidationMode,
}

/// A PancakeSwap V3 swap path: `fees.len() == path.len() - 1`.
#[derive(Debug, Clone)]
pub struct Route {
    pub path: Vec<Address>,
    pub fees: Vec<u32>,
    pub expected_out: U256,
}

impl Route {
    pub fn is_well_formed(&self) -> bool {
        self.path.len() >= 2 && self.fees.len() == self.path.len() - 1
    }

    pub fn is_single_hop(&self) -> bool {
        self.path.len() == 2
    }
}

/// Outcome of a single swap attempt against the collateral disposal router.
#[derive(Debug, Clone)]
pub struct SwapResult {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub amount_in: U256,
    pub amount_out: Option<U256>,
    pub token_in: Address,
    pub token_out: Address,
    pub gas_used: Option<u64>,
    pub price_impact: Option<f64>,
    pub error: Option<String>,
}

/// Backoff bookkeeping for one `(borrower, repay_token, seize_token)` key.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub retry_count: u32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: String,
}

/// The composite key identifying a distinct liquidation attempt target.
pub fn retry_key(borrower: Address, repay_token: Address, seize_token: Address) -> String {
    format!(
        "{}|{}|{}",
        borrower.to_string().to_lowercase(),
        repay_token.to_string().to_lowercase(),
        seize_token.to_string().to_lowercase()
    )
}

/// Monotonic counters and running totals for the life of the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub swaps_attempted: u64,
    pub swaps_succeeded: u64,
    pub swaps_failed: u64,
    pub total_usd_swapped: f64,
    pub liquidations_succeeded: u64,
    pub liquidations_failed: u64,
    pub total_profit_usd: f64,
    pub total_gas_cost_usd: f64,
    pub daily_loss_usd: f64,
    pub dry_run_attempts: u64,
}

/// Per-token configuration consulted by the [`CollateralStrategy::Configurable`]
/// dispatch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub is_stablecoin: bool,
    pub auto_sell: bool,
    pub preferred_swap_path: Option<Vec<Address>>,
}

pub type TokenConfigMap = HashMap<Address, TokenConfig>;

/// Outcome of one full liquidation attempt, returned by the Engine.
#[derive(Debug, Clone)]
pub enum LiquidationResult {
    Executed {
        tx_hash: String,
        profit_usd: f64,
        borrower: Address,
        collateral_swap: Option<SwapResult>,
    },
    NotNeeded {
        reason: LiquidationSkipReason,
        borrower: Address,
    },
}

impl LiquidationResult {
    pub fn was_executed(&self) -> bool {
        matches!(self, LiquidationResult::Executed { .. })
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            LiquidationResult::Executed { tx_hash, .. } => Some(tx_hash),
            _ => None,
        }
    }
}

/// Reasons a position was left alone instead of being liquidated.
#[derive(Debug, Clone)]
pub enum LiquidationSkipReason {
    PositionNotFound,
    NoCollateral,
    NoDebt,
    NoProfitableRoute,
    InsufficientProfit { estimated_usd: f64, min_usd: f64 },
    StrategyValidationFailed { reason: String },
    RiskCheckFailed { reason: String },
    SimulationOnly { estimated_profit_usd: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liquidatable_requires_finite_hf_below_threshold_and_minimum_size() {
        let base = Position {
            borrower: Address::ZERO,
            health_factor: 0.9,
            collateral_markets: vec![],
            borrow_markets: vec![],
            collateral_value_usd: 0.0,
            debt_value_usd: 1000.0,
            liquidity_usd: 0.0,
            shortfall_usd: 100.0,
            estimated_profit_usd: 0.0,
            repay_token: None,
            seize_token: None,
            repay_amount: U256::ZERO,
            timestamp: Utc::now(),
        };
        assert!(base.is_liquidatable(1.0, 100.0));

        let mut healthy = base.clone_with_hf(1.2);
        assert!(!healthy.is_liquidatable(1.0, 100.0));

        let mut infinite = base.clone_with_hf(f64::INFINITY);
        assert!(!infinite.is_liquidatable(1.0, 100.0));

        let mut tiny = base.clone_with_hf(0.5);
        tiny.debt_value_usd = 10.0;
        assert!(!tiny.is_liquidatable(1.0, 100.0));

        let _ = &mut healthy;
        let _ = &mut infinite;
    }

    impl Position {
        fn clone_with_hf(&self, hf: f64) -> Position {
            let mut p = self.clone();
            p.health_factor = hf;
            p
        }
    }

    #[test]
    fn retry_key_is_case_insensitive() {
        let a: Address = "0x0000000000000000000000000000000000dEaD".parse().unwrap();
        let b: Address = "0x0000000000000000000000000000000000DEAD".parse().unwrap();
        assert_eq!(retry_key(a, a, a), retry_key(b, b, b));
    }

    #[test]
    fn route_well_formedness() {
        let a: Address = Address::ZERO;
        let route = Route {
            path: vec![a, a, a],
            fees: vec![500, 3000],
            expected_out: U256::ZERO,
        };
        assert!(route.is_well_formed());
        assert!(!route.is_single_hop());

        let bad = Route {
            path: vec![a, a, a],
            fees: vec![500],
            expected_out: U256::ZERO,
        };
        assert!(!bad.is_well_formed());
    }
}
