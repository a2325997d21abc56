//! Liquidation Strategy (spec §4.10). Grounded on
//! `liquidation::opportunity::find_most_profitable_liquidation_pair`'s shape
//! of picking between candidates by comparing projected profit, narrowed
//! here to a binary STANDARD-vs-FLASH_LOAN choice instead of an asset-pair
//! search (Route Optimizer already owns pair/path selection).

use crate::types::{LiquidationMode, Position};
use alloy_primitives::{Address, U256};

#[derive(Debug, Clone)]
pub struct StrategyValidationError {
    pub reason: String,
}

impl std::fmt::Display for StrategyValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for StrategyValidationError {}

pub struct LiquidationStrategy {
    pub use_flash_loans: bool,
    pub flash_liquidator_contract: Option<Address>,
}

impl LiquidationStrategy {
    pub fn new(use_flash_loans: bool, flash_liquidator_contract: Option<Address>) -> Self {
        Self {
            use_flash_loans,
            flash_liquidator_contract,
        }
    }

    /// Confirms the prerequisites for whichever mode `select` would pick
    /// actually exist, before any gas is spent estimating it.
    pub fn validate(&self, position: &Position) -> Result<(), StrategyValidationError> {
        if position.repay_token.is_none() {
            return Err(StrategyValidationError {
                reason: "position has no repay token".to_string(),
            });
        }
        if position.seize_token.is_none() {
            return Err(StrategyValidationError {
                reason: "position has no seize token".to_string(),
            });
        }
        if self.use_flash_loans && self.flash_liquidator_contract.is_none() {
            return Err(StrategyValidationError {
                reason: "flash loans enabled but no flash liquidator contract configured".to_string(),
            });
        }
        Ok(())
    }

    /// STANDARD when the signer already holds enough of the repay token and
    /// standard execution is at least as profitable net of its (zero) flash
    /// fee; otherwise FLASH_LOAN, provided it's actually available.
    pub fn select(
        &self,
        signer_repay_balance: U256,
        repay_amount: U256,
        standard_net_usd: f64,
        flash_net_usd: f64,
    ) -> LiquidationMode {
        let standard_affordable = signer_repay_balance >= repay_amount;
        let flash_available = self.use_flash_loans && self.flash_liquidator_contract.is_some();

        if standard_affordable && (standard_net_usd >= flash_net_usd || !flash_available) {
            LiquidationMode::Standard
        } else if flash_available {
            LiquidationMode::FlashLoan
        } else {
            LiquidationMode::Standard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position_with_tokens(repay: Option<Address>, seize: Option<Address>) -> Position {
        Position {
            borrower: Address::ZERO,
            health_factor: 0.8,
            collateral_markets: vec![],
            borrow_markets: vec![],
            collateral_value_usd: 0.0,
            debt_value_usd: 1000.0,
            liquidity_usd: 0.0,
            shortfall_usd: 100.0,
            estimated_profit_usd: 50.0,
            repay_token: repay,
            seize_token: seize,
            repay_amount: U256::from(100u64),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn validate_rejects_missing_tokens() {
        let strategy = LiquidationStrategy::new(false, None);
        assert!(strategy.validate(&position_with_tokens(None, Some(Address::ZERO))).is_err());
    }

    #[test]
    fn validate_rejects_flash_loans_without_contract() {
        let strategy = LiquidationStrategy::new(true, None);
        let position = position_with_tokens(Some(Address::ZERO), Some(Address::ZERO));
        assert!(strategy.validate(&position).is_err());
    }

    #[test]
    fn selects_standard_when_affordable_and_at_least_as_profitable() {
        let strategy = LiquidationStrategy::new(true, Some(Address::ZERO));
        let mode = strategy.select(U256::from(1000u64), U256::from(100u64), 40.0, 35.0);
        assert_eq!(mode, LiquidationMode::Standard);
    }

    #[test]
    fn falls_back_to_flash_loan_when_insufficient_balance() {
        let strategy = LiquidationStrategy::new(true, Some(Address::ZERO));
        let mode = strategy.select(U256::from(10u64), U256::from(100u64), 40.0, 35.0);
        assert_eq!(mode, LiquidationMode::FlashLoan);
    }

    #[test]
    fn stays_standard_when_flash_loans_unavailable_even_if_unaffordable() {
        let strategy = LiquidationStrategy::new(false, None);
        let mode = strategy.select(U256::from(10u64), U256::from(100u64), 40.0, 35.0);
        assert_eq!(mode, LiquidationMode::Standard);
    }
}
