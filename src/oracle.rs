//! Price Oracle Client: USD pricing backed by Venus's on-chain
//! `PriceOracle`. Grounded on `monitoring::oracle`'s Chainlink-feed call
//! shape, adapted to the Compound-style `getUnderlyingPrice(vToken)`
//! convention (price scaled by `1e(36 - underlyingDecimals)`, so the raw
//! mantissa already prices one whole unit of the underlying in USD once
//! divided out).

use crate::chain::ChainClient;
use alloy_contract::{ContractInstance, Interface};
use alloy_dyn_abi::DynSolValue;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use alloy_transport::BoxTransport;
use eyre::Result;
use std::sync::Arc;

const SANITY_CEILING_USD: f64 = 1_000_000.0;

fn price_oracle_abi() -> Result<JsonAbi> {
    let json = r#"[
        {"inputs":[{"name":"vToken","type":"address"}],"name":"getUnderlyingPrice",
         "outputs":[{"name":"","type":"uint256"}],"stateMutability":"view","type":"function"}
    ]"#;
    Ok(serde_json::from_str(json)?)
}

pub struct PriceOracleClient<P> {
    contract: ContractInstance<BoxTransport, Arc<P>>,
}

impl<P> PriceOracleClient<P>
where
    P: Provider,
{
    pub fn new(chain: &ChainClient<P>, oracle_address: Address) -> Result<Self> {
        let interface = Interface::new(price_oracle_abi()?);
        Ok(Self {
            contract: interface.connect(oracle_address, chain.provider()),
        })
    }

    /// USD price of one whole unit of `v_token`'s underlying asset, or an
    /// error if the oracle returned zero, a non-finite value, or something
    /// implausibly large (a likely decimals/mantissa mismatch rather than a
    /// real price).
    pub async fn get_underlying_price_usd(
        &self,
        v_token: Address,
        underlying_decimals: u8,
    ) -> Result<f64> {
        let args = [DynSolValue::Address(v_token)];
        let result = self
            .contract
            .function("getUnderlyingPrice", &args)?
            .call()
            .await?;
        let mantissa = crate::chain::extract_uint(&result, 0)?;

        // Compound/Venus convention: mantissa is scaled by 1e(36 - underlyingDecimals).
        let scale_exponent = 36i32 - underlying_decimals as i32;
        let price = mantissa_to_f64(mantissa, scale_exponent)?;

        if !price.is_finite() || price <= 0.0 {
            return Err(eyre::eyre!(
                "oracle returned non-positive or non-finite price for {v_token}"
            ));
        }
        if price > SANITY_CEILING_USD {
            return Err(eyre::eyre!(
                "oracle price {price} for {v_token} exceeds sanity ceiling"
            ));
        }
        Ok(price)
    }
}

fn mantissa_to_f64(mantissa: U256, scale_exponent: i32) -> Result<f64> {
    // U256 -> f64 via its decimal string; Venus mantissas always fit for any
    // realistic price, but the conversion is guarded rather than trusted.
    let as_f64: f64 = mantissa
        .to_string()
        .parse()
        .map_err(|_| eyre::eyre!("mantissa {mantissa} does not fit in f64"))?;
    Ok(as_f64 * 10f64.powi(-scale_exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mantissa_scaling_for_18_decimal_token() {
        // 1e18 mantissa at scale exponent 36-18=18 => price 1.0
        let mantissa = U256::from(1_000_000_000_000_000_000u128);
        let price = mantissa_to_f64(mantissa, 18).unwrap();
        assert!((price - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mantissa_scaling_for_6_decimal_token() {
        // USDT-like: 1 USD mantissa is scaled by 1e(36-6)=1e30
        let mantissa = U256::from(1u128) * U256::from(10u128).pow(U256::from(30u128));
        let price = mantissa_to_f64(mantissa, 30).unwrap();
        assert!((price - 1.0).abs() < 1e-6);
    }
}
