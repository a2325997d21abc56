//! Risk Manager (spec §4.9). Grounded on `circuit_breaker::CircuitBreaker`'s
//! `Arc<RwLock<...>>`-guarded state machine (Closed/Open/HalfOpen/Disabled)
//! and its `CircuitBreakerStats` accumulator, narrowed from that module's
//! broad market-condition monitoring down to the spec's fixed pre-execution
//! checklist.

use crate::chain::ChainClient;
use crate::types::Position;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct RiskCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct RiskValidationResult {
    pub checks: Vec<RiskCheck>,
}

impl RiskValidationResult {
    pub fn allowed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.checks
            .iter()
            .find(|c| !c.passed)
            .map(|c| format!("{}: {}", c.name, c.detail))
    }
}

pub struct RiskManager<P> {
    chain: Arc<ChainClient<P>>,
    state: RwLock<CircuitState>,
    daily_loss_usd: RwLock<f64>,
    max_daily_loss_usd: f64,
    max_gas_price_gwei: f64,
    min_health_factor: f64,
    allowed_tokens: Option<HashSet<Address>>,
    signer_address: Address,
}

impl<P> RiskManager<P>
where
    P: Provider,
{
    pub fn new(
        chain: Arc<ChainClient<P>>,
        max_daily_loss_usd: f64,
        max_gas_price_gwei: f64,
        min_health_factor: f64,
        allowed_tokens: Option<HashSet<Address>>,
        signer_address: Address,
    ) -> Self {
        Self {
            chain,
            state: RwLock::new(CircuitState::Closed),
            daily_loss_usd: RwLock::new(0.0),
            max_daily_loss_usd,
            max_gas_price_gwei,
            min_health_factor,
            allowed_tokens,
            signer_address,
        }
    }

    pub fn trip(&self) {
        *self.state.write() = CircuitState::Open;
    }

    pub fn reset(&self) {
        *self.state.write() = CircuitState::Closed;
    }

    pub fn record_loss(&self, loss_usd: f64) {
        *self.daily_loss_usd.write() += loss_usd.max(0.0);
    }

    pub fn reset_daily_loss(&self) {
        *self.daily_loss_usd.write() = 0.0;
    }

    /// Runs every guard in spec order, short-circuiting the balance check
    /// (the only one requiring RPC I/O) behind the cheap flag checks.
    ///
    /// `repay_token` is the vToken being repaid (checked against the
    /// allow-list); `repay_underlying` is the asset the signer's balance is
    /// actually checked in (native BNB when `is_native_underlying`, else the
    /// vToken's underlying ERC20 — never the vToken address itself).
    /// `expected_loss_usd` is the amount this attempt itself puts at risk
    /// (the gas cost spent regardless of whether the liquidation succeeds),
    /// added to the already-recorded `dailyLoss` before comparing to the cap.
    pub async fn validate(
        &self,
        position: &Position,
        repay_token: Address,
        repay_underlying: Address,
        repay_amount: U256,
        gas_price_gwei: f64,
        is_native_underlying: bool,
        expected_loss_usd: f64,
    ) -> eyre::Result<RiskValidationResult> {
        let mut checks = Vec::new();

        let state = *self.state.read();
        checks.push(RiskCheck {
            name: "emergency_stop",
            passed: !matches!(state, CircuitState::Open | CircuitState::Disabled),
            detail: format!("circuit state: {state:?}"),
        });

        let daily_loss = *self.daily_loss_usd.read();
        let projected_loss = daily_loss + expected_loss_usd.max(0.0);
        checks.push(RiskCheck {
            name: "daily_loss_cap",
            passed: projected_loss <= self.max_daily_loss_usd,
            detail: format!("{projected_loss:.2} (current {daily_loss:.2} + expected {expected_loss_usd:.2}) / {:.2} USD", self.max_daily_loss_usd),
        });

        checks.push(RiskCheck {
            name: "gas_cap",
            passed: gas_price_gwei <= self.max_gas_price_gwei,
            detail: format!("{gas_price_gwei:.2} / {:.2} gwei", self.max_gas_price_gwei),
        });

        if let Some(allowed) = &self.allowed_tokens {
            checks.push(RiskCheck {
                name: "token_allowlist",
                passed: allowed.contains(&repay_token),
                detail: format!("{repay_token:#x}"),
            });
        }

        checks.push(RiskCheck {
            name: "health_factor_still_unsafe",
            passed: position.health_factor.is_finite() && position.health_factor < self.min_health_factor,
            detail: format!("hf={:.4}", position.health_factor),
        });

        let balance = if is_native_underlying {
            self.chain.get_balance(self.signer_address).await?
        } else {
            self.chain.erc20_balance(repay_underlying, self.signer_address).await?
        };
        checks.push(RiskCheck {
            name: "signer_balance",
            passed: balance >= repay_amount,
            detail: format!("balance={balance} required={repay_amount}"),
        });

        let result = RiskValidationResult { checks };
        if !result.allowed() {
            warn!(borrower = %position.borrower, reason = ?result.failure_reason(), "risk checks blocked liquidation");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_result_reports_first_failure() {
        let result = RiskValidationResult {
            checks: vec![
                RiskCheck { name: "a", passed: true, detail: "ok".into() },
                RiskCheck { name: "b", passed: false, detail: "nope".into() },
                RiskCheck { name: "c", passed: false, detail: "also nope".into() },
            ],
        };
        assert!(!result.allowed());
        assert_eq!(result.failure_reason().unwrap(), "b: nope");
    }

    #[test]
    fn validation_result_passes_when_all_checks_pass() {
        let result = RiskValidationResult {
            checks: vec![RiskCheck { name: "a", passed: true, detail: "ok".into() }],
        };
        assert!(result.allowed());
        assert!(result.failure_reason().is_none());
    }
}
