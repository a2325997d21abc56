//! Configuration assembly. Required fields come from the environment (via
//! `dotenvy`) and missing/invalid values abort startup with a descriptive
//! error — this is the one place allowed to fail hard before the runtime
//! gets going, matching the teacher's `BotConfig::from_env` pattern.

use crate::types::{CollateralStrategy, TokenConfig, TokenConfigMap};
use alloy_primitives::Address;
use eyre::Result;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct VenusAddresses {
    pub comptroller: Address,
    pub oracle: Address,
    /// vBNB market, queried through the oracle for the native-token USD price
    /// used to convert gas estimates from wei into dollars.
    pub vbnb: Address,
}

#[derive(Debug, Clone)]
pub struct DexAddresses {
    pub pancakeswap_router: Address,
    pub pancakeswap_v3_factory: Address,
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub interval_ms: u64,
    pub max_retries: u32,
    pub base_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub success_cooldown_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CollateralSwapConfig {
    pub target_stablecoins: Vec<Address>,
    pub token_configs: TokenConfigMap,
    pub max_slippage: f64,
    pub max_price_impact: f64,
    pub min_swap_amount_usd: f64,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub rpc_url: String,
    pub ws_url: Option<String>,
    pub chain_id: u64,
    pub private_key: String,
    pub database_url: String,

    pub min_profit_usd: f64,
    pub min_position_size_usd: f64,
    pub max_position_size_usd: f64,

    pub gas_price_multiplier_bps: u64,
    pub max_gas_price_gwei: f64,

    pub use_flash_loans: bool,
    pub flash_loan_fee_bps: u16,
    pub flash_liquidator_contract: Option<Address>,

    pub collateral_strategy: CollateralStrategy,
    pub slippage_tolerance: f64,
    pub min_swap_amount_usd: f64,
    pub max_price_impact: f64,
    pub preferred_stablecoin: Address,

    pub polling_interval_ms: u64,
    pub min_health_factor: f64,
    pub healthy_polls_before_drop: u32,
    pub max_daily_loss_usd: f64,

    pub venus: VenusAddresses,
    pub dex: DexAddresses,
    pub execution: ExecutionConfig,
    pub collateral_swap: CollateralSwapConfig,

    pub dry_run: bool,
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| eyre::eyre!("{key} environment variable not set"))
}

fn env_address(key: &str) -> Result<Address> {
    env_var(key)?
        .parse()
        .map_err(|e| eyre::eyre!("{key} is not a valid address: {e}"))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn env_strategy(key: &str, default: CollateralStrategy) -> CollateralStrategy {
    match std::env::var(key).ok().as_deref() {
        Some("HOLD") => CollateralStrategy::Hold,
        Some("AUTO_SELL") => CollateralStrategy::AutoSell,
        Some("CONFIGURABLE") => CollateralStrategy::Configurable,
        _ => default,
    }
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let rpc_url = env_var("RPC_URL")?;
        let ws_url = std::env::var("WS_URL").ok();
        let private_key = env_var("PRIVATE_KEY")?;
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:venus_liquidator.db".into());

        let venus = VenusAddresses {
            comptroller: env_address("VENUS_COMPTROLLER")?,
            oracle: env_address("VENUS_ORACLE")?,
            vbnb: env_address("VENUS_VBNB")?,
        };
        let dex = DexAddresses {
            pancakeswap_router: env_address("PANCAKESWAP_ROUTER")?,
            pancakeswap_v3_factory: env_address("PANCAKESWAP_V3_FACTORY")?,
        };

        let execution = ExecutionConfig {
            interval_ms: env_or("EXECUTION_INTERVAL_MS", 2_000),
            max_retries: env_or("EXECUTION_MAX_RETRIES", 5),
            base_retry_delay_ms: env_or("EXECUTION_BASE_RETRY_DELAY_MS", 1_000),
            max_retry_delay_ms: env_or("EXECUTION_MAX_RETRY_DELAY_MS", 60_000),
            success_cooldown_ms: env_or("EXECUTION_SUCCESS_COOLDOWN_MS", 30_000),
        };

        let collateral_swap = CollateralSwapConfig {
            target_stablecoins: Vec::new(),
            token_configs: HashMap::new(),
            max_slippage: env_or("COLLATERAL_MAX_SLIPPAGE", 0.01),
            max_price_impact: env_or("COLLATERAL_MAX_PRICE_IMPACT", 0.03),
            min_swap_amount_usd: env_or("COLLATERAL_MIN_SWAP_AMOUNT_USD", 10.0),
        };

        Ok(Self {
            rpc_url,
            ws_url,
            chain_id: env_or("CHAIN_ID", 56),
            private_key,
            database_url,

            min_profit_usd: env_or("MIN_PROFIT_USD", 10.0),
            min_position_size_usd: env_or("MIN_POSITION_SIZE_USD", 50.0),
            max_position_size_usd: env_or("MAX_POSITION_SIZE_USD", 1_000_000.0),

            gas_price_multiplier_bps: env_or("GAS_PRICE_MULTIPLIER_BPS", 12_000),
            max_gas_price_gwei: env_or("MAX_GAS_PRICE_GWEI", 10.0),

            use_flash_loans: env_bool("USE_FLASH_LOANS", true),
            flash_loan_fee_bps: env_or("FLASH_LOAN_FEE_BPS", 9),
            flash_liquidator_contract: std::env::var("FLASH_LIQUIDATOR_CONTRACT")
                .ok()
                .and_then(|a| a.parse().ok()),

            collateral_strategy: env_strategy("COLLATERAL_STRATEGY", CollateralStrategy::AutoSell),
            slippage_tolerance: env_or("SLIPPAGE_TOLERANCE", 0.01),
            min_swap_amount_usd: env_or("MIN_SWAP_AMOUNT_USD", 10.0),
            max_price_impact: env_or("MAX_PRICE_IMPACT", 0.03),
            preferred_stablecoin: env_address("PREFERRED_STABLECOIN")
                .unwrap_or_else(|_| Address::ZERO),

            polling_interval_ms: env_or("POLLING_INTERVAL_MS", 6_000),
            min_health_factor: env_or("MIN_HEALTH_FACTOR", 1.0),
            // Three consecutive healthy, debt-free polls before a position is
            // dropped from the tracker — small enough to reclaim memory
            // quickly, large enough to absorb one stale RPC read.
            healthy_polls_before_drop: env_or("HEALTHY_POLLS_BEFORE_DROP", 3),
            max_daily_loss_usd: env_or("MAX_DAILY_LOSS_USD", 500.0),

            venus,
            dex,
            execution,
            collateral_swap,

            dry_run: env_bool("DRY_RUN", true),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_profit_usd < 0.0 {
            return Err(eyre::eyre!("min_profit_usd must be non-negative"));
        }
        if self.max_position_size_usd < self.min_position_size_usd {
            return Err(eyre::eyre!(
                "max_position_size_usd must be >= min_position_size_usd"
            ));
        }
        if !(0.0..1.0).contains(&self.slippage_tolerance) {
            return Err(eyre::eyre!("slippage_tolerance must be in [0, 1)"));
        }
        if self.use_flash_loans && self.flash_liquidator_contract.is_none() {
            return Err(eyre::eyre!(
                "USE_FLASH_LOANS is set but FLASH_LIQUIDATOR_CONTRACT is missing"
            ));
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        format!(
            "rpc_url={} chain_id={} dry_run={} min_profit_usd={:.2} min_health_factor={:.3} \
             collateral_strategy={:?} use_flash_loans={}",
            self.rpc_url,
            self.chain_id,
            self.dry_run,
            self.min_profit_usd,
            self.min_health_factor,
            self.collateral_strategy,
            self.use_flash_loans
        )
    }

    pub fn set_token_config(&mut self, token: TokenConfig) {
        self.collateral_swap.token_configs.insert(token.address, token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> BotConfig {
        BotConfig {
            rpc_url: "http://localhost:8545".into(),
            ws_url: None,
            chain_id: 56,
            private_key: "0x00".into(),
            database_url: "sqlite::memory:".into(),
            min_profit_usd: 10.0,
            min_position_size_usd: 50.0,
            max_position_size_usd: 1000.0,
            gas_price_multiplier_bps: 12_000,
            max_gas_price_gwei: 10.0,
            use_flash_loans: false,
            flash_loan_fee_bps: 9,
            flash_liquidator_contract: None,
            collateral_strategy: CollateralStrategy::AutoSell,
            slippage_tolerance: 0.01,
            min_swap_amount_usd: 10.0,
            max_price_impact: 0.03,
            preferred_stablecoin: Address::ZERO,
            polling_interval_ms: 6000,
            min_health_factor: 1.0,
            healthy_polls_before_drop: 3,
            max_daily_loss_usd: 500.0,
            venus: VenusAddresses {
                comptroller: Address::ZERO,
                oracle: Address::ZERO,
                vbnb: Address::ZERO,
            },
            dex: DexAddresses {
                pancakeswap_router: Address::ZERO,
                pancakeswap_v3_factory: Address::ZERO,
            },
            execution: ExecutionConfig {
                interval_ms: 2000,
                max_retries: 5,
                base_retry_delay_ms: 1000,
                max_retry_delay_ms: 60_000,
                success_cooldown_ms: 30_000,
            },
            collateral_swap: CollateralSwapConfig {
                target_stablecoins: vec![],
                token_configs: HashMap::new(),
                max_slippage: 0.01,
                max_price_impact: 0.03,
                min_swap_amount_usd: 10.0,
            },
            dry_run: true,
        }
    }

    #[test]
    fn validate_rejects_inverted_position_bounds() {
        let mut cfg = base_config();
        cfg.max_position_size_usd = 10.0;
        cfg.min_position_size_usd = 50.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_flash_liquidator_when_enabled() {
        let mut cfg = base_config();
        cfg.use_flash_loans = true;
        cfg.flash_liquidator_contract = None;
        assert!(cfg.validate().is_err());

        cfg.flash_liquidator_contract = Some(Address::ZERO);
        assert!(cfg.validate().is_ok());
    }
}
