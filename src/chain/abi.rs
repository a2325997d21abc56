//! Inline ABI fragments for the contracts this bot talks to. The teacher
//! repo embeds the one ABI it needs (`liquidation::executor::get_liquidator_abi`)
//! as a string literal next to the code that uses it rather than vendoring
//! `.json` artifact files; this crate follows the same approach for every
//! contract surface, keeping each fragment to the functions actually called.

use alloy_json_abi::JsonAbi;
use eyre::Result;

pub fn comptroller_abi() -> Result<JsonAbi> {
    let json = r#"[
        {"inputs":[{"name":"account","type":"address"}],"name":"getAccountLiquidity",
         "outputs":[{"name":"error","type":"uint256"},{"name":"liquidity","type":"uint256"},{"name":"shortfall","type":"uint256"}],
         "stateMutability":"view","type":"function"},
        {"inputs":[{"name":"account","type":"address"}],"name":"getAssetsIn",
         "outputs":[{"name":"","type":"address[]"}],"stateMutability":"view","type":"function"},
        {"inputs":[{"name":"","type":"address"}],"name":"markets",
         "outputs":[{"name":"isListed","type":"bool"},{"name":"collateralFactorMantissa","type":"uint256"},{"name":"isVenus","type":"bool"}],
         "stateMutability":"view","type":"function"},
        {"inputs":[],"name":"liquidationIncentiveMantissa",
         "outputs":[{"name":"","type":"uint256"}],"stateMutability":"view","type":"function"},
        {"inputs":[],"name":"closeFactorMantissa",
         "outputs":[{"name":"","type":"uint256"}],"stateMutability":"view","type":"function"}
    ]"#;
    Ok(serde_json::from_str(json)?)
}

pub fn vtoken_abi() -> Result<JsonAbi> {
    let json = r#"[
        {"inputs":[{"name":"account","type":"address"}],"name":"getAccountSnapshot",
         "outputs":[{"name":"error","type":"uint256"},{"name":"vTokenBalance","type":"uint256"},{"name":"borrowBalance","type":"uint256"},{"name":"exchangeRateMantissa","type":"uint256"}],
         "stateMutability":"view","type":"function"},
        {"inputs":[],"name":"underlying","outputs":[{"name":"","type":"address"}],
         "stateMutability":"view","type":"function"},
        {"inputs":[{"name":"borrower","type":"address"},{"name":"repayAmount","type":"uint256"},
                   {"name":"vTokenCollateral","type":"address"}],
         "name":"liquidateBorrow","outputs":[{"name":"","type":"uint256"}],
         "stateMutability":"nonpayable","type":"function"},
        {"inputs":[{"name":"borrower","type":"address"}],
         "name":"liquidateBorrow","outputs":[],"stateMutability":"payable","type":"function"}
    ]"#;
    Ok(serde_json::from_str(json)?)
}

pub fn erc20_abi() -> Result<JsonAbi> {
    let json = r#"[
        {"inputs":[{"name":"account","type":"address"}],"name":"balanceOf",
         "outputs":[{"name":"","type":"uint256"}],"stateMutability":"view","type":"function"},
        {"inputs":[{"name":"owner","type":"address"},{"name":"spender","type":"address"}],
         "name":"allowance","outputs":[{"name":"","type":"uint256"}],"stateMutability":"view","type":"function"},
        {"inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],
         "name":"approve","outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable","type":"function"},
        {"inputs":[],"name":"decimals","outputs":[{"name":"","type":"uint8"}],
         "stateMutability":"view","type":"function"}
    ]"#;
    Ok(serde_json::from_str(json)?)
}

pub fn v3_factory_abi() -> Result<JsonAbi> {
    let json = r#"[
        {"inputs":[{"name":"tokenA","type":"address"},{"name":"tokenB","type":"address"},{"name":"fee","type":"uint24"}],
         "name":"getPool","outputs":[{"name":"pool","type":"address"}],
         "stateMutability":"view","type":"function"}
    ]"#;
    Ok(serde_json::from_str(json)?)
}

pub fn v3_pool_abi() -> Result<JsonAbi> {
    let json = r#"[
        {"inputs":[],"name":"liquidity","outputs":[{"name":"","type":"uint128"}],
         "stateMutability":"view","type":"function"}
    ]"#;
    Ok(serde_json::from_str(json)?)
}

/// Minimal surface for the optional flash-liquidator contract: one entry
/// point that borrows the repay amount, repays the vToken, and forwards
/// seized collateral back to the caller.
pub fn flash_liquidator_abi() -> Result<JsonAbi> {
    let json = r#"[
        {"inputs":[
            {"name":"borrower","type":"address"},{"name":"vTokenBorrowed","type":"address"},
            {"name":"vTokenCollateral","type":"address"},{"name":"repayAmount","type":"uint256"}],
         "name":"liquidateWithFlashLoan","outputs":[{"name":"seized","type":"uint256"}],
         "stateMutability":"nonpayable","type":"function"}
    ]"#;
    Ok(serde_json::from_str(json)?)
}

pub fn v3_router_abi() -> Result<JsonAbi> {
    let json = r#"[
        {"inputs":[{"components":[
            {"name":"tokenIn","type":"address"},{"name":"tokenOut","type":"address"},
            {"name":"fee","type":"uint24"},{"name":"recipient","type":"address"},
            {"name":"amountIn","type":"uint256"},{"name":"amountOutMinimum","type":"uint256"},
            {"name":"sqrtPriceLimitX96","type":"uint160"}],"name":"params","type":"tuple"}],
         "name":"exactInputSingle","outputs":[{"name":"amountOut","type":"uint256"}],
         "stateMutability":"payable","type":"function"},
        {"inputs":[{"components":[
            {"name":"path","type":"bytes"},{"name":"recipient","type":"address"},
            {"name":"amountIn","type":"uint256"},{"name":"amountOutMinimum","type":"uint256"}],
            "name":"params","type":"tuple"}],
         "name":"exactInput","outputs":[{"name":"amountOut","type":"uint256"}],
         "stateMutability":"payable","type":"function"}
    ]"#;
    Ok(serde_json::from_str(json)?)
}
