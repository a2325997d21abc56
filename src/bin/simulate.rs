//! Dry-run simulation CLI (spec §10.5): computes one borrower's position and
//! runs it through the full Engine pipeline with `dry_run` forced on, so an
//! operator can check what the bot *would* do without a signer or a live
//! transaction. Mirrors the reference bot's `simulate` binary in spirit —
//! a small, read-only companion to the main monitor/liquidate loop.

use alloy_primitives::Address;
use alloy_provider::ProviderBuilder;
use clap::Parser;
use eyre::Result;
use std::collections::HashSet;
use std::sync::Arc;
use venus_liquidator::chain::ChainClient;
use venus_liquidator::collateral::CollateralManager;
use venus_liquidator::engine::{EngineConfig, LiquidationEngine};
use venus_liquidator::health;
use venus_liquidator::oracle::PriceOracleClient;
use venus_liquidator::risk::RiskManager;
use venus_liquidator::route::RouteOptimizer;
use venus_liquidator::stats::StatsRecorder;
use venus_liquidator::strategy::LiquidationStrategy;
use venus_liquidator::swap::SwapExecutor;
use venus_liquidator::BotConfig;

/// Simulate a liquidation attempt against a single borrower, with no
/// transactions sent regardless of the DRY_RUN environment setting.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Borrower address to evaluate
    #[arg(long)]
    borrower: Address,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = BotConfig::from_env()?;
    config.validate()?;

    let provider = Arc::new(ProviderBuilder::new().on_http(url::Url::parse(&config.rpc_url)?));
    let chain = Arc::new(ChainClient::new(provider));
    let oracle = Arc::new(PriceOracleClient::new(&chain, config.venus.oracle)?);

    println!("fetching position for {:#x}...", args.borrower);
    let position =
        health::compute_position(&chain, &oracle, config.venus.comptroller, args.borrower).await?;

    println!(
        "health_factor={:.4} debt_usd={:.2} collateral_usd={:.2} estimated_profit_usd={:.2}",
        position.health_factor,
        position.debt_value_usd,
        position.collateral_value_usd,
        position.estimated_profit_usd
    );

    if !position.is_liquidatable(config.min_health_factor, config.min_position_size_usd) {
        println!("not liquidatable under current thresholds — nothing to simulate.");
        return Ok(());
    }

    let signer_address = Address::ZERO;
    let route_optimizer = Arc::new(RouteOptimizer::new(
        chain.clone(),
        config.dex.pancakeswap_v3_factory,
        config.dex.pancakeswap_router,
        vec![config.preferred_stablecoin],
    ));
    let swap_executor = Arc::new(SwapExecutor::new(
        chain.clone(),
        config.dex.pancakeswap_router,
        signer_address,
        true,
        (config.slippage_tolerance * 10_000.0).round() as u32,
    ));
    let stats = StatsRecorder::new();
    let collateral = Arc::new(CollateralManager::new(
        oracle.clone(),
        route_optimizer,
        swap_executor,
        config.collateral_strategy,
        config.preferred_stablecoin,
        config.collateral_swap.clone(),
        stats.clone(),
    ));
    let risk = Arc::new(RiskManager::new(
        chain.clone(),
        config.max_daily_loss_usd,
        config.max_gas_price_gwei,
        config.min_health_factor,
        None::<HashSet<Address>>,
        signer_address,
    ));
    let strategy = LiquidationStrategy::new(config.use_flash_loans, config.flash_liquidator_contract);

    let engine = LiquidationEngine::new(
        chain.clone(),
        oracle.clone(),
        strategy,
        risk,
        collateral,
        stats,
        None,
        signer_address,
        config.venus.vbnb,
        EngineConfig {
            min_profit_usd: config.min_profit_usd,
            min_position_size_usd: config.min_position_size_usd,
            max_position_size_usd: config.max_position_size_usd,
            max_gas_price_gwei: config.max_gas_price_gwei,
            gas_price_multiplier_bps: config.gas_price_multiplier_bps,
            flash_loan_fee_bps: config.flash_loan_fee_bps,
            dry_run: true,
        },
    );

    let result = engine.liquidate(&position).await?;
    println!("{result:#?}");
    Ok(())
}
