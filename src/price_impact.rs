//! Price Impact Checker (spec §4.6). No direct teacher analogue — written
//! in the same small-pure-function-plus-`#[tokio::test]` style as
//! `liquidation::profitability`.

use alloy_primitives::U256;

#[derive(Debug, Clone, Copy)]
pub struct PriceImpactResult {
    pub expected_usd: f64,
    pub actual_usd: f64,
    pub impact_percent: f64,
    pub is_acceptable: bool,
}

/// Compares the oracle-implied USD value of the input against the DEX
/// router's *quoted* output (not the realized post-trade output — see
/// DESIGN.md open question (a) for why that distinction is preserved).
pub fn check_price_impact(
    amount_in_human: f64,
    price_in_usd: f64,
    quoted_out_human: f64,
    price_out_usd: f64,
    max_price_impact: f64,
) -> PriceImpactResult {
    if price_in_usd <= 0.0 || !price_in_usd.is_finite() || price_out_usd <= 0.0 || !price_out_usd.is_finite() {
        return PriceImpactResult {
            expected_usd: 0.0,
            actual_usd: 0.0,
            impact_percent: 0.0,
            is_acceptable: false,
        };
    }

    let expected_usd = amount_in_human * price_in_usd;
    let actual_usd = quoted_out_human * price_out_usd;
    let impact_percent = if expected_usd > 0.0 {
        (expected_usd - actual_usd) / expected_usd
    } else {
        0.0
    };

    PriceImpactResult {
        expected_usd,
        actual_usd,
        impact_percent,
        is_acceptable: impact_percent <= max_price_impact,
    }
}

/// `minOut` that preserves `(1 - slippage_tolerance)` of the input's USD
/// value, re-scaled into `token_out`'s decimals.
pub fn calculate_min_amount_out(
    amount_in: U256,
    decimals_in: u8,
    price_in_usd: f64,
    price_out_usd: f64,
    decimals_out: u8,
    slippage_tolerance: f64,
) -> U256 {
    if price_out_usd <= 0.0 || !price_out_usd.is_finite() {
        return U256::ZERO;
    }
    let amount_in_human = u256_to_f64(amount_in, decimals_in);
    let min_usd = amount_in_human * price_in_usd * (1.0 - slippage_tolerance);
    let min_out_human = min_usd / price_out_usd;
    f64_to_u256(min_out_human.max(0.0), decimals_out)
}

pub fn validate_slippage(amount_out: U256, amount_out_min: U256, decimals: u8, slippage_tolerance: f64) -> bool {
    let out = u256_to_f64(amount_out, decimals);
    let min = u256_to_f64(amount_out_min, decimals);
    if out <= 0.0 {
        return false;
    }
    (out - min) / out <= slippage_tolerance
}

/// `priceImpact = max(0, (expected - realized) / expected)`, computed via a
/// 6-decimal fixed-point intermediate to avoid float drift at very small
/// output magnitudes. Display-only precision, not a trading input.
pub fn enrich_price_impact(expected_out: U256, realized_out: U256) -> f64 {
    if expected_out.is_zero() {
        return 0.0;
    }
    const SCALE: u128 = 1_000_000;
    let expected = expected_out.to::<u128>().max(1);
    let realized = realized_out.to::<u128>();
    if realized >= expected {
        return 0.0;
    }
    let diff_scaled = (expected - realized).saturating_mul(SCALE) / expected;
    diff_scaled as f64 / SCALE as f64
}

fn u256_to_f64(value: U256, decimals: u8) -> f64 {
    let as_f64: f64 = value.to_string().parse().unwrap_or(0.0);
    as_f64 / 10f64.powi(decimals as i32)
}

fn f64_to_u256(value: f64, decimals: u8) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    let scaled = value * 10f64.powi(decimals as i32);
    U256::try_from(scaled as u128).unwrap_or(U256::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_oracle_price_is_refused_safely() {
        let result = check_price_impact(100.0, 0.0, 99.0, 1.0, 0.05);
        assert!(!result.is_acceptable);
        assert_eq!(result.impact_percent, 0.0);
    }

    #[test]
    fn impact_veto_rejects_when_above_max() {
        let result = check_price_impact(1000.0, 1.0, 800.0, 1.0, 0.10);
        assert!(result.impact_percent > 0.10);
        assert!(!result.is_acceptable);
    }

    #[test]
    fn min_amount_out_preserves_usd_value_when_prices_equal() {
        let min_out = calculate_min_amount_out(
            U256::from(1_000_000_000_000_000_000u128), // 1.0 @ 18 decimals
            18,
            2.0,
            2.0,
            18,
            0.01,
        );
        let expected = 0.99 * 1e18;
        let actual = min_out.to::<u128>() as f64;
        assert!((actual - expected).abs() / expected < 1e-6);
    }

    #[test]
    fn validate_slippage_law() {
        let out = U256::from(1_000_000_000_000_000_000u128);
        let min = U256::from(990_000_000_000_000_000u128);
        assert!(validate_slippage(out, min, 18, 0.02));
        assert!(!validate_slippage(out, min, 18, 0.001));
    }
}
