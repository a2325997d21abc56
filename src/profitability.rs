//! Profitability Calculator (spec §4.4). Keeps the teacher's close-factor /
//! flash-fee / net-profit shape from `liquidation::profitability` almost
//! directly, swapping the Aave wei-denominated math for the spec's
//! USD-denominated model, and layering EIP-1559 fee-cap rejection on top
//! (grounded on `examples/danipolo-liquidator-rust`'s `Eip1559GasStrategy`,
//! since the teacher's own gas handling assumed legacy single-price gas).

use crate::chain::{ChainClient, FeeData};
use crate::types::{GasEstimate, LiquidationMode, Position, ProfitabilityAnalysis};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use eyre::Result;
use tracing::debug;

/// Fallback used when the chain client's `estimateGas` call on
/// `liquidateBorrow` itself fails (spec §4.4 step 4).
const BASE_GAS_LIMIT: u64 = 220_000;
const FLASH_LOAN_OVERHEAD_GAS: u64 = 130_000;
const WEI_PER_BNB: f64 = 1e18;
/// `f64`'s mantissa is 53 bits wide; wei values above this lose precision
/// when normalized to a double, the Rust analogue of the source's "exceeds
/// safe JS number range" rejection.
const MAX_SAFE_INTEGER: u128 = 1u128 << 53;

/// Enough of a `liquidateBorrow` call to ask the chain client for a real
/// `estimateGas` quote. Absent for candidate scoring, where the spec
/// deliberately skips the RPC round-trip.
pub struct LiquidationCallContext {
    pub v_token: Address,
    pub borrower: Address,
    pub repay_amount: U256,
    pub seize_token: Address,
    pub native_value: Option<U256>,
}

async fn liquidate_borrow_gas<P>(chain: &ChainClient<P>, ctx: Option<&LiquidationCallContext>) -> u64
where
    P: Provider,
{
    let Some(ctx) = ctx else { return BASE_GAS_LIMIT };
    let Ok(v_token) = chain.v_token(ctx.v_token) else {
        return BASE_GAS_LIMIT;
    };
    let args = [
        DynSolValue::Address(ctx.borrower),
        DynSolValue::Uint(ctx.repay_amount, 256),
        DynSolValue::Address(ctx.seize_token),
    ];
    let Ok(call) = v_token.function("liquidateBorrow", &args) else {
        return BASE_GAS_LIMIT;
    };
    let call = match ctx.native_value {
        Some(v) => call.value(v),
        None => call,
    };
    match call.estimate_gas().await {
        Ok(gas) => gas as u64,
        Err(e) => {
            debug!(error = %e, "liquidateBorrow estimateGas failed, using base gas limit");
            BASE_GAS_LIMIT
        }
    }
}

fn apply_mode_overhead(base_gas: u64, mode: LiquidationMode) -> u64 {
    match mode {
        LiquidationMode::Standard => base_gas,
        LiquidationMode::FlashLoan => base_gas + FLASH_LOAN_OVERHEAD_GAS,
    }
}

fn gas_cost_usd(estimated_gas: u64, max_fee_per_gas: u128, bnb_price_usd: f64) -> Result<f64> {
    if max_fee_per_gas > MAX_SAFE_INTEGER {
        return Err(eyre::eyre!(
            "max fee per gas {max_fee_per_gas} exceeds safe JS number range"
        ));
    }
    let cost_wei = (estimated_gas as u128).saturating_mul(max_fee_per_gas);
    let cost_bnb = cost_wei as f64 / WEI_PER_BNB;
    let estimated_cost_usd = cost_bnb * bnb_price_usd;
    if !estimated_cost_usd.is_finite() {
        return Err(eyre::eyre!("gas cost estimate is not finite"));
    }
    Ok(estimated_cost_usd)
}

pub async fn estimate_gas<P>(
    chain: &ChainClient<P>,
    mode: LiquidationMode,
    max_gas_price_gwei: f64,
    bnb_price_usd: f64,
    gas_price_multiplier_bps: u64,
    call_ctx: Option<&LiquidationCallContext>,
) -> Result<GasEstimate>
where
    P: Provider,
{
    let fee_data = chain.get_fee_data().await?;
    let max_fee_per_gas = fee_data.max_fee_per_gas(gas_price_multiplier_bps);
    let gas_price_gwei = max_fee_per_gas as f64 / 1e9;

    if gas_price_gwei > max_gas_price_gwei {
        return Err(eyre::eyre!(
            "gas price {gas_price_gwei:.2} gwei exceeds cap {max_gas_price_gwei:.2} gwei"
        ));
    }

    let base_gas = liquidate_borrow_gas(chain, call_ctx).await;
    let estimated_gas = apply_mode_overhead(base_gas, mode);
    let estimated_cost_usd = gas_cost_usd(estimated_gas, max_fee_per_gas, bnb_price_usd)?;

    Ok(GasEstimate {
        estimated_gas,
        max_fee_per_gas,
        max_priority_fee_per_gas: fee_data.max_priority_fee_per_gas,
        gas_price_gwei,
        estimated_cost_usd,
    })
}

/// Cheap candidate-scoring variant of [`estimate_gas`]: reuses already-fetched
/// fee data instead of issuing a fresh `estimateGas` RPC call, so a poll
/// cycle can rank many positions before committing to the expensive path.
pub fn estimate_gas_cost_usd_for_candidate(
    fee_data: &FeeData,
    mode: LiquidationMode,
    bnb_price_usd: f64,
    gas_price_multiplier_bps: u64,
) -> Result<f64> {
    let max_fee_per_gas = fee_data.max_fee_per_gas(gas_price_multiplier_bps);
    gas_cost_usd(apply_mode_overhead(BASE_GAS_LIMIT, mode), max_fee_per_gas, bnb_price_usd)
}

/// `amount × 10^(-decimals) × priceUsd × flashLoanFeeBps / 10_000`, with the
/// price validated finite-positive before it's trusted.
pub fn calculate_flash_loan_fee_usd(
    amount_human: f64,
    price_usd: f64,
    flash_loan_fee_bps: u16,
) -> Result<f64> {
    if !price_usd.is_finite() || price_usd <= 0.0 {
        return Err(eyre::eyre!("non-finite or non-positive price for flash loan fee"));
    }
    Ok(amount_human * price_usd * flash_loan_fee_bps as f64 / 10_000.0)
}

pub fn analyze_profitability(
    position: &Position,
    gas_estimate: &GasEstimate,
    flash_loan_fee_usd: f64,
    min_profit_usd: f64,
    standard_mode_available: bool,
) -> ProfitabilityAnalysis {
    let gross_profit_usd = position.estimated_profit_usd;
    let gas_cost_usd = gas_estimate.estimated_cost_usd;

    let standard_net = gross_profit_usd - gas_cost_usd;
    let flash_net = gross_profit_usd - gas_cost_usd - flash_loan_fee_usd;

    let (recommended_mode, net_profit_usd, applied_flash_fee) =
        if standard_mode_available && standard_net >= flash_net {
            (LiquidationMode::Standard, standard_net, 0.0)
        } else {
            (LiquidationMode::FlashLoan, flash_net, flash_loan_fee_usd)
        };

    let profit_margin = if position.debt_value_usd > 0.0 {
        net_profit_usd / position.debt_value_usd
    } else {
        0.0
    };

    debug!(
        borrower = %position.borrower,
        gross_profit_usd, gas_cost_usd, applied_flash_fee, net_profit_usd,
        "profitability analysis"
    );

    ProfitabilityAnalysis {
        gross_profit_usd,
        gas_cost_usd,
        flash_loan_fee_usd: applied_flash_fee,
        net_profit_usd,
        profit_margin,
        is_profitable: net_profit_usd >= min_profit_usd,
        recommended_mode,
    }
}

pub fn validate_net_profit_equation(analysis: &ProfitabilityAnalysis) -> bool {
    let expected = analysis.gross_profit_usd - analysis.gas_cost_usd - analysis.flash_loan_fee_usd;
    (analysis.net_profit_usd - expected).abs() < 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use chrono::Utc;

    fn gas_estimate(gwei: f64) -> GasEstimate {
        let max_fee_per_gas = (gwei * 1e9) as u128;
        GasEstimate {
            estimated_gas: BASE_GAS_LIMIT,
            max_fee_per_gas,
            max_priority_fee_per_gas: max_fee_per_gas / 10,
            gas_price_gwei: gwei,
            estimated_cost_usd: (BASE_GAS_LIMIT as f64 * max_fee_per_gas as f64 / WEI_PER_BNB) * 300.0,
        }
    }

    fn position(debt_usd: f64, profit_usd: f64) -> Position {
        Position {
            borrower: Address::ZERO,
            health_factor: 0.9,
            collateral_markets: vec![],
            borrow_markets: vec![],
            collateral_value_usd: 0.0,
            debt_value_usd: debt_usd,
            liquidity_usd: 0.0,
            shortfall_usd: 0.0,
            estimated_profit_usd: profit_usd,
            repay_token: None,
            seize_token: None,
            repay_amount: U256::ZERO,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn profitable_standard_scenario() {
        let gas = gas_estimate(5.0);
        let pos = position(1000.0, 100.0);
        let analysis = analyze_profitability(&pos, &gas, 9.0, 10.0, true);
        println!("{analysis:?}");
        assert_eq!(analysis.recommended_mode, LiquidationMode::Standard);
        assert!(validate_net_profit_equation(&analysis));
    }

    #[test]
    fn flash_loan_fee_scales_with_decimals_and_price() {
        // 10000 USDT @ $1, 9 bps -> ~9.0
        let usdt_fee = calculate_flash_loan_fee_usd(10_000.0, 1.0, 9).unwrap();
        assert!((usdt_fee - 9.0).abs() < 1e-6);

        // 0.1 WBTC @ $40000, 9 bps -> ~3.6
        let wbtc_fee = calculate_flash_loan_fee_usd(0.1, 40_000.0, 9).unwrap();
        assert!((wbtc_fee - 3.6).abs() < 1e-6);

        // 10 WBNB @ $300, 9 bps -> ~2.7
        let wbnb_fee = calculate_flash_loan_fee_usd(10.0, 300.0, 9).unwrap();
        assert!((wbnb_fee - 2.7).abs() < 1e-6);
    }

    #[test]
    fn flash_loan_fee_rejects_bad_price() {
        assert!(calculate_flash_loan_fee_usd(10.0, f64::NAN, 9).is_err());
        assert!(calculate_flash_loan_fee_usd(10.0, -1.0, 9).is_err());
    }

    #[test]
    fn net_profit_floors_toward_loss_rather_than_panicking() {
        let gas = gas_estimate(500.0); // absurdly high gas price
        let pos = position(10.0, 5.0);
        let analysis = analyze_profitability(&pos, &gas, 0.1, 1.0, true);
        assert!(!analysis.is_profitable);
        assert!(analysis.net_profit_usd < 0.0);
    }

    #[test]
    fn gas_cost_rejects_wei_outside_safe_integer_range() {
        let err = gas_cost_usd(BASE_GAS_LIMIT, MAX_SAFE_INTEGER + 1, 300.0).unwrap_err();
        assert!(err.to_string().contains("safe JS number range"));
    }

    #[test]
    fn candidate_estimate_matches_gas_limit_for_mode() {
        let fee_data = FeeData {
            base_fee_per_gas: 5_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        };
        let standard = estimate_gas_cost_usd_for_candidate(&fee_data, LiquidationMode::Standard, 300.0, 12_000).unwrap();
        let flash = estimate_gas_cost_usd_for_candidate(&fee_data, LiquidationMode::FlashLoan, 300.0, 12_000).unwrap();
        assert!(flash > standard, "flash loan overhead should cost more gas");
    }
}
