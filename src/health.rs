//! Health Factor Calculator (spec §4.1). Consolidates what the teacher had
//! split across `bootstrap::check_user_health` (manual selector encoding)
//! and `position::check_user_health` (typed `ContractInstance` calls) into
//! one canonical implementation using the typed-call style, which is the
//! direction the teacher's own later code (`bot.rs`) moved toward.

use crate::chain::{extract_address, extract_uint, ChainClient};
use crate::oracle::PriceOracleClient;
use crate::types::{MarketBalance, Position};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use chrono::Utc;
use eyre::Result;
use tracing::debug;

const MANTISSA_1E18: f64 = 1e18;
const DEFAULT_LIQUIDATION_INCENTIVE: f64 = 1.10;
const DEFAULT_CLOSE_FACTOR: f64 = 0.5;

fn u256_mantissa_to_usd(value: U256) -> f64 {
    let as_f64: f64 = value.to_string().parse().unwrap_or(f64::INFINITY);
    as_f64 / MANTISSA_1E18
}

fn scaled_amount_to_f64(amount: U256, decimals: u8) -> f64 {
    let as_f64: f64 = amount.to_string().parse().unwrap_or(f64::INFINITY);
    as_f64 / 10f64.powi(decimals as i32)
}

/// Read the account-wide liquidity/shortfall snapshot and every entered
/// market's balance, converting to USD via the price oracle, and fold it
/// into a [`Position`]. Markets whose snapshot call errors or whose oracle
/// price is unavailable are skipped rather than failing the whole account.
pub async fn compute_position<P>(
    chain: &ChainClient<P>,
    oracle: &PriceOracleClient<P>,
    comptroller_address: Address,
    borrower: Address,
) -> Result<Position>
where
    P: Provider,
{
    let comptroller = chain.comptroller(comptroller_address)?;

    let liquidity_args = [DynSolValue::Address(borrower)];
    let liquidity_result = comptroller
        .function("getAccountLiquidity", &liquidity_args)?
        .call()
        .await?;
    let liquidity_usd = u256_mantissa_to_usd(extract_uint(&liquidity_result, 1)?);
    let shortfall_usd = u256_mantissa_to_usd(extract_uint(&liquidity_result, 2)?);

    let incentive = comptroller
        .function("liquidationIncentiveMantissa", &[])?
        .call()
        .await
        .ok()
        .and_then(|r| extract_uint(&r, 0).ok())
        .map(u256_mantissa_to_usd)
        .filter(|v| v.is_finite() && *v > 1.0)
        .unwrap_or(DEFAULT_LIQUIDATION_INCENTIVE);

    let close_factor = comptroller
        .function("closeFactorMantissa", &[])?
        .call()
        .await
        .ok()
        .and_then(|r| extract_uint(&r, 0).ok())
        .map(u256_mantissa_to_usd)
        .filter(|v| v.is_finite() && *v > 0.0 && *v <= 1.0)
        .unwrap_or(DEFAULT_CLOSE_FACTOR);

    let assets_result = comptroller.function("getAssetsIn", &liquidity_args)?.call().await?;
    let markets = match assets_result.first() {
        Some(DynSolValue::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_address())
            .collect::<Vec<_>>(),
        _ => Vec::new(),
    };

    let mut collateral_markets = Vec::new();
    let mut borrow_markets = Vec::new();
    let mut collateral_value_usd = 0.0;
    let mut debt_value_usd = 0.0;

    for v_token in markets {
        let Ok(snapshot) = read_account_snapshot(chain, v_token, borrower).await else {
            debug!("skipping market {v_token} for {borrower}: snapshot read failed");
            continue;
        };
        let Ok(underlying) = chain.v_token(v_token) else {
            continue;
        };
        let underlying_addr = match underlying.function("underlying", &[]) {
            Ok(call) => match call.call().await {
                Ok(r) => extract_address(&r, 0).unwrap_or(Address::ZERO),
                Err(_) => Address::ZERO,
            },
            Err(_) => Address::ZERO,
        };
        let decimals = chain.erc20_decimals(underlying_addr).await.unwrap_or(18);

        let Ok(price_usd) = oracle.get_underlying_price_usd(v_token, decimals).await else {
            debug!("skipping market {v_token} for {borrower}: no oracle price");
            continue;
        };

        if snapshot.balance > U256::ZERO {
            // exchangeRateMantissa converts vToken units to underlying units,
            // scaled by 1e18.
            let underlying_equiv = snapshot
                .balance
                .saturating_mul(snapshot.exchange_rate_mantissa)
                / U256::from(10u128.pow(18));
            let value_usd = scaled_amount_to_f64(underlying_equiv, decimals) * price_usd;
            collateral_value_usd += value_usd;
            collateral_markets.push(MarketBalance {
                v_token,
                underlying: underlying_addr,
                underlying_decimals: decimals,
                balance: snapshot.balance,
                borrow_balance: U256::ZERO,
                value_usd,
            });
        }

        if snapshot.borrow_balance > U256::ZERO {
            let value_usd = scaled_amount_to_f64(snapshot.borrow_balance, decimals) * price_usd;
            debt_value_usd += value_usd;
            borrow_markets.push(MarketBalance {
                v_token,
                underlying: underlying_addr,
                underlying_decimals: decimals,
                balance: U256::ZERO,
                borrow_balance: snapshot.borrow_balance,
                value_usd,
            });
        }
    }

    let health_factor = compute_health_factor(debt_value_usd, shortfall_usd, liquidity_usd);

    let repay_market = borrow_markets
        .iter()
        .max_by(|a, b| a.value_usd.total_cmp(&b.value_usd));
    let seize_market = collateral_markets
        .iter()
        .max_by(|a, b| a.value_usd.total_cmp(&b.value_usd));

    let estimated_profit_usd = match (repay_market, seize_market) {
        (Some(repay), Some(seize)) => {
            let seizable_usd = (close_factor * repay.value_usd).min(seize.value_usd);
            (seizable_usd * (incentive - 1.0)).max(0.0)
        }
        _ => 0.0,
    };

    let repay_amount = repay_market
        .map(|m| {
            let underlying_debt = scaled_amount_to_f64(m.borrow_balance, m.underlying_decimals);
            let capped = underlying_debt * close_factor;
            scale_to_u256(capped, m.underlying_decimals)
        })
        .unwrap_or(U256::ZERO);

    Ok(Position {
        borrower,
        health_factor,
        collateral_markets,
        borrow_markets,
        collateral_value_usd,
        debt_value_usd,
        liquidity_usd,
        shortfall_usd,
        estimated_profit_usd,
        repay_token: repay_market.map(|m| m.v_token),
        seize_token: seize_market.map(|m| m.v_token),
        repay_amount,
        timestamp: Utc::now(),
    })
}

struct AccountSnapshot {
    balance: U256,
    borrow_balance: U256,
    exchange_rate_mantissa: U256,
}

async fn read_account_snapshot<P>(
    chain: &ChainClient<P>,
    v_token: Address,
    borrower: Address,
) -> Result<AccountSnapshot>
where
    P: Provider,
{
    let contract = chain.v_token(v_token)?;
    let args = [DynSolValue::Address(borrower)];
    let result = contract.function("getAccountSnapshot", &args)?.call().await?;

    let error_code = extract_uint(&result, 0)?;
    if error_code != U256::ZERO {
        return Err(eyre::eyre!("getAccountSnapshot returned error code {error_code}"));
    }

    Ok(AccountSnapshot {
        balance: extract_uint(&result, 1)?,
        borrow_balance: extract_uint(&result, 2)?,
        exchange_rate_mantissa: extract_uint(&result, 3)?,
    })
}

/// HF ∈ (0,1) while shortfall > 0 (closer to 0 the deeper the shortfall),
/// +∞ once debt is fully cleared while liquidity remains, 1.0 as the
/// neutral case of neither liquidity nor shortfall.
fn compute_health_factor(debt_value_usd: f64, shortfall_usd: f64, liquidity_usd: f64) -> f64 {
    if shortfall_usd > 0.0 {
        if debt_value_usd + shortfall_usd <= 0.0 {
            return 0.0;
        }
        debt_value_usd / (debt_value_usd + shortfall_usd)
    } else if liquidity_usd > 0.0 && debt_value_usd == 0.0 {
        f64::INFINITY
    } else {
        1.0
    }
}

fn scale_to_u256(amount: f64, decimals: u8) -> U256 {
    if !amount.is_finite() || amount <= 0.0 {
        return U256::ZERO;
    }
    let scaled = amount * 10f64.powi(decimals as i32);
    U256::try_from(scaled as u128).unwrap_or(U256::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hf_is_between_zero_and_one_during_shortfall() {
        let hf = compute_health_factor(1000.0, 100.0, 0.0);
        assert!(hf > 0.0 && hf < 1.0);
    }

    #[test]
    fn hf_is_infinite_once_debt_clears_with_liquidity() {
        let hf = compute_health_factor(0.0, 0.0, 5000.0);
        assert!(hf.is_infinite());
    }

    #[test]
    fn hf_is_neutral_with_no_liquidity_or_shortfall() {
        let hf = compute_health_factor(0.0, 0.0, 0.0);
        assert_eq!(hf, 1.0);
    }

    #[test]
    fn scale_to_u256_rejects_non_finite_and_negative() {
        assert_eq!(scale_to_u256(f64::NAN, 18), U256::ZERO);
        assert_eq!(scale_to_u256(-1.0, 18), U256::ZERO);
        assert!(scale_to_u256(1.0, 6) > U256::ZERO);
    }
}
