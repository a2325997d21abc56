pub mod chain;
pub mod collateral;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod execution;
pub mod health;
pub mod monitor;
pub mod oracle;
pub mod price_impact;
pub mod profitability;
pub mod risk;
pub mod route;
pub mod stats;
pub mod strategy;
pub mod swap;
pub mod tracker;
pub mod types;

pub use config::BotConfig;
pub use engine::LiquidationEngine;
pub use types::*;
