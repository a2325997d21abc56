//! Entry point (spec §10.5). Mirrors the reference bot's `liquidation-monitor`
//! binary's `clap` subcommand shape and banner/ctrl-c conventions, rewired to
//! bootstrap the Venus components and drive the polling + execution loops
//! with `tokio::try_join!` instead of a single `LiquidationMonitor::start_monitoring`.

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_provider::{Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use clap::{Parser, Subcommand};
use eyre::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use venus_liquidator::chain::ChainClient;
use venus_liquidator::collateral::CollateralManager;
use venus_liquidator::engine::{EngineConfig, LiquidationEngine};
use venus_liquidator::execution::ExecutionService;
use venus_liquidator::monitor;
use venus_liquidator::oracle::PriceOracleClient;
use venus_liquidator::risk::RiskManager;
use venus_liquidator::route::RouteOptimizer;
use venus_liquidator::stats::StatsRecorder;
use venus_liquidator::strategy::LiquidationStrategy;
use venus_liquidator::swap::SwapExecutor;
use venus_liquidator::tracker::PositionTracker;
use venus_liquidator::types::retry_key;
use venus_liquidator::{database, BotConfig};

#[derive(Parser)]
#[command(name = "venus-liquidator")]
#[command(about = "Monitor and liquidate undercollateralized Venus positions on BSC", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live monitor + liquidation loop
    Run,
    /// Scan a historical block range for Comptroller MarketEntered events
    Historical {
        #[arg(long)]
        from_block: u64,
        #[arg(long)]
        to_block: Option<u64>,
    },
    /// Print a sample .env configuration
    GenerateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    print_banner();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::GenerateConfig => generate_config(),
        Commands::Historical { from_block, to_block } => {
            run_historical_scan(from_block, to_block).await
        }
        Commands::Run => run(cli.verbose).await,
    }
}

fn print_banner() {
    println!(
        r#"
    ╔══════════════════════════════════════════╗
    ║        VENUS LIQUIDATOR (BSC)             ║
    ║   Health-factor monitoring + liquidation   ║
    ╚══════════════════════════════════════════╝
    "#
    );
}

fn generate_config() -> Result<()> {
    println!(
        r#"RPC_URL=https://bsc-dataseed.binance.org
WS_URL=
CHAIN_ID=56
PRIVATE_KEY=0x...
DATABASE_URL=sqlite:venus_liquidator.db

VENUS_COMPTROLLER=0xfD36E2c2a6789Db23113685031d7F16329158384
VENUS_ORACLE=0x6592b5DE802159F3E74B2486b091D11a8256ab8A
VENUS_VBNB=0xA07c5b74C9B40447a954e1466938b865b6BBea36

PANCAKESWAP_ROUTER=0x1b81D678ffb9C0263b24A97847620C99d213eB14
PANCAKESWAP_V3_FACTORY=0x0BFbCF9fa4f9C56B0F40a671Ad40E0805A091865

MIN_PROFIT_USD=10.0
MIN_POSITION_SIZE_USD=50.0
MAX_POSITION_SIZE_USD=1000000.0

GAS_PRICE_MULTIPLIER_BPS=12000
MAX_GAS_PRICE_GWEI=10.0

USE_FLASH_LOANS=true
FLASH_LOAN_FEE_BPS=9
FLASH_LIQUIDATOR_CONTRACT=

COLLATERAL_STRATEGY=AUTO_SELL
SLIPPAGE_TOLERANCE=0.01
MIN_SWAP_AMOUNT_USD=10.0
MAX_PRICE_IMPACT=0.03
PREFERRED_STABLECOIN=0x55d398326f99059fF775485246999027B3197955

POLLING_INTERVAL_MS=6000
MIN_HEALTH_FACTOR=1.0
HEALTHY_POLLS_BEFORE_DROP=3
MAX_DAILY_LOSS_USD=500.0

EXECUTION_INTERVAL_MS=2000
EXECUTION_MAX_RETRIES=5
EXECUTION_BASE_RETRY_DELAY_MS=1000
EXECUTION_MAX_RETRY_DELAY_MS=60000
EXECUTION_SUCCESS_COOLDOWN_MS=30000

DRY_RUN=true
"#
    );
    Ok(())
}

async fn run_historical_scan(from_block: u64, to_block: Option<u64>) -> Result<()> {
    let config = BotConfig::from_env()?;
    let provider = Arc::new(ProviderBuilder::new().on_http(url::Url::parse(&config.rpc_url)?));
    let to_block = match to_block {
        Some(b) => b,
        None => provider.get_block_number().await?,
    };

    info!("scanning blocks {from_block}..{to_block} for borrower candidates");
    let borrowers = monitor::historical_borrowers(&provider, config.venus.comptroller, from_block, to_block).await?;
    println!("found {} candidate borrower(s):", borrowers.len());
    for borrower in borrowers {
        println!("  {borrower:#x}");
    }
    Ok(())
}

async fn run(verbose: bool) -> Result<()> {
    let _ = verbose;
    let config = BotConfig::from_env()?;
    config.validate()?;
    info!(summary = %config.summary(), "configuration loaded");

    let signer: PrivateKeySigner = config.private_key.parse()?;
    let signer_address = signer.address();
    let wallet = EthereumWallet::from(signer);

    let provider = Arc::new(
        ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url::Url::parse(&config.rpc_url)?),
    );

    let db_pool = database::init_database(&config.database_url).await?;

    let chain = Arc::new(ChainClient::new(provider.clone()));
    let oracle = Arc::new(PriceOracleClient::new(&chain, config.venus.oracle)?);
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
        config.dry_run,
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
    let execution = Arc::new(ExecutionService::new(
        config.execution.max_retries,
        config.execution.base_retry_delay_ms,
        config.execution.max_retry_delay_ms,
        config.execution.success_cooldown_ms,
    ));

    let engine = Arc::new(LiquidationEngine::new(
        chain.clone(),
        oracle.clone(),
        strategy,
        risk,
        collateral,
        stats.clone(),
        Some(db_pool.clone()),
        signer_address,
        config.venus.vbnb,
        EngineConfig {
            min_profit_usd: config.min_profit_usd,
            min_position_size_usd: config.min_position_size_usd,
            max_position_size_usd: config.max_position_size_usd,
            max_gas_price_gwei: config.max_gas_price_gwei,
            gas_price_multiplier_bps: config.gas_price_multiplier_bps,
            flash_loan_fee_bps: config.flash_loan_fee_bps,
            dry_run: config.dry_run,
        },
    ));

    let tracker = Arc::new(PositionTracker::new(
        config.min_health_factor,
        config.min_position_size_usd,
        config.healthy_polls_before_drop,
    ));

    info!("discovering borrower candidates from recent MarketEntered events");
    match monitor::discover_borrowers(&provider, config.venus.comptroller).await {
        Ok(borrowers) => {
            for borrower in borrowers {
                if let Ok(position) =
                    venus_liquidator::health::compute_position(&chain, &oracle, config.venus.comptroller, borrower)
                        .await
                {
                    tracker.update_position(position);
                }
            }
            info!(tracked = tracker.len(), "seeded tracker with discovered positions");
        }
        Err(e) => warn!("borrower discovery failed, starting with an empty tracker: {e}"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (new_position_tx, new_position_rx) = mpsc::unbounded_channel();

    let polling_task = {
        let chain = chain.clone();
        let oracle = oracle.clone();
        let tracker = tracker.clone();
        let comptroller = config.venus.comptroller;
        let polling_interval_ms = config.polling_interval_ms;
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            monitor::run_polling_loop(
                chain,
                oracle,
                comptroller,
                tracker,
                polling_interval_ms,
                new_position_tx,
                shutdown_rx,
            )
            .await
        })
    };

    let execution_task = {
        let engine = engine.clone();
        let tracker = tracker.clone();
        let execution = execution.clone();
        let stats = stats.clone();
        let db_pool = db_pool.clone();
        let interval_ms = config.execution.interval_ms;
        let min_health_factor = config.min_health_factor;
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            run_execution_loop(
                engine,
                tracker,
                execution,
                stats,
                db_pool,
                interval_ms,
                min_health_factor,
                new_position_rx,
                &mut shutdown_rx,
            )
            .await
        })
    };

    let ctrl_c_stats = stats.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("unable to listen for shutdown signal: {e}");
            return;
        }
        info!("shutdown requested, letting in-flight work finish...");
        let snapshot = ctrl_c_stats.snapshot().await;
        info!(
            liquidations_succeeded = snapshot.liquidations_succeeded,
            liquidations_failed = snapshot.liquidations_failed,
            total_profit_usd = snapshot.total_profit_usd,
            "final stats"
        );
        let _ = shutdown_tx.send(true);
    });

    tokio::try_join!(flatten_task(polling_task), flatten_task(execution_task))?;

    stats.persist(&db_pool).await?;
    info!("shutdown complete");
    Ok(())
}

/// Collapses a `JoinHandle<Result<T>>` into a single-layer `Result<T>`,
/// turning a task panic into a regular propagated error instead of a nested
/// `JoinError` the caller has to unwrap separately.
async fn flatten_task<T>(handle: tokio::task::JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(eyre::eyre!("task panicked: {e}")),
    }
}

/// Drives the single-executor liquidation loop: on a fixed interval, scans
/// the tracker's liquidatable positions (highest debt first, per §4.2) and
/// attempts each one that isn't currently backing off or in its post-success
/// cooldown, honoring the cooperative single-poll-at-a-time model of §5.
#[allow(clippy::too_many_arguments)]
async fn run_execution_loop<P>(
    engine: Arc<LiquidationEngine<P>>,
    tracker: Arc<PositionTracker>,
    execution: Arc<ExecutionService>,
    stats: StatsRecorder,
    db_pool: sqlx::Pool<sqlx::Sqlite>,
    interval_ms: u64,
    min_health_factor: f64,
    mut new_position_rx: mpsc::UnboundedReceiver<Address>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<()>
where
    P: Provider,
{
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            Some(_) = new_position_rx.recv() => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("execution loop received shutdown signal");
                    return Ok(());
                }
            }
        }

        for position in tracker.liquidatable_positions() {
            let (repay, seize) = match (position.repay_token, position.seize_token) {
                (Some(r), Some(s)) => (r, s),
                _ => continue,
            };
            let key = retry_key(position.borrower, repay, seize);
            if execution.is_in_cooldown(&key) || execution.is_backing_off(&key) {
                continue;
            }

            match engine.liquidate(&position).await {
                Ok(result) => {
                    if result.was_executed() {
                        execution.record_success(&key);
                        info!(borrower = %position.borrower, tx_hash = ?result.tx_hash(), "liquidation executed");
                    }
                    let _ = database::save_position(&db_pool, &position, min_health_factor).await;
                }
                Err(e) => {
                    let classified = venus_liquidator::error::classify_chain_error(&e);
                    stats.record_liquidation_failure().await;
                    if classified.is_retryable() {
                        warn!(borrower = %position.borrower, error = %e, "liquidation attempt errored, scheduling retry");
                        execution.schedule_retry(&key, &e.to_string());
                    } else {
                        warn!(borrower = %position.borrower, error = %classified, "liquidation attempt failed permanently, not retrying this cycle");
                    }
                }
            }
        }
    }
}
