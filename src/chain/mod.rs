//! Thin typed wrapper over an `alloy` [`Provider`], giving the rest of the
//! crate small, named methods instead of raw ABI encoding at every call
//! site. Grounded on `providers::mod` for provider construction and
//! `liquidation::executor::get_liquidator_abi` for the inline-ABI pattern.

pub mod abi;

use alloy_contract::{ContractInstance, Interface};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use alloy_transport::BoxTransport;
use eyre::Result;
use std::sync::Arc;

/// Current EIP-1559 fee parameters, sampled fresh on every call.
#[derive(Debug, Clone, Copy)]
pub struct FeeData {
    pub base_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl FeeData {
    pub fn max_fee_per_gas(&self, multiplier_bps: u64) -> u128 {
        let base = self.base_fee_per_gas.saturating_mul(2);
        let with_tip = base.saturating_add(self.max_priority_fee_per_gas);
        with_tip.saturating_mul(multiplier_bps as u128) / 10_000
    }
}

pub struct ChainClient<P> {
    provider: Arc<P>,
}

impl<P> ChainClient<P>
where
    P: Provider,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> Arc<P> {
        self.provider.clone()
    }

    pub async fn get_fee_data(&self) -> Result<FeeData> {
        let base_fee = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| eyre::eyre!("failed to fetch gas price: {e}"))?;
        let priority_fee = self
            .provider
            .get_max_priority_fee_per_gas()
            .await
            .unwrap_or(base_fee / 10);
        Ok(FeeData {
            base_fee_per_gas: base_fee,
            max_priority_fee_per_gas: priority_fee,
        })
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address).await?)
    }

    pub fn comptroller(&self, address: Address) -> Result<ContractInstance<BoxTransport, Arc<P>>> {
        let interface = Interface::new(abi::comptroller_abi()?);
        Ok(interface.connect(address, self.provider.clone()))
    }

    pub fn v_token(&self, address: Address) -> Result<ContractInstance<BoxTransport, Arc<P>>> {
        let interface = Interface::new(abi::vtoken_abi()?);
        Ok(interface.connect(address, self.provider.clone()))
    }

    pub fn erc20(&self, address: Address) -> Result<ContractInstance<BoxTransport, Arc<P>>> {
        let interface = Interface::new(abi::erc20_abi()?);
        Ok(interface.connect(address, self.provider.clone()))
    }

    pub fn v3_factory(&self, address: Address) -> Result<ContractInstance<BoxTransport, Arc<P>>> {
        let interface = Interface::new(abi::v3_factory_abi()?);
        Ok(interface.connect(address, self.provider.clone()))
    }

    pub fn v3_pool(&self, address: Address) -> Result<ContractInstance<BoxTransport, Arc<P>>> {
        let interface = Interface::new(abi::v3_pool_abi()?);
        Ok(interface.connect(address, self.provider.clone()))
    }

    pub fn v3_router(&self, address: Address) -> Result<ContractInstance<BoxTransport, Arc<P>>> {
        let interface = Interface::new(abi::v3_router_abi()?);
        Ok(interface.connect(address, self.provider.clone()))
    }

    pub fn flash_liquidator(&self, address: Address) -> Result<ContractInstance<BoxTransport, Arc<P>>> {
        let interface = Interface::new(abi::flash_liquidator_abi()?);
        Ok(interface.connect(address, self.provider.clone()))
    }

    pub async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let contract = self.erc20(token)?;
        let args = [DynSolValue::Address(owner)];
        let result = contract.function("balanceOf", &args)?.call().await?;
        extract_uint(&result, 0)
    }

    pub async fn erc20_allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let contract = self.erc20(token)?;
        let args = [DynSolValue::Address(owner), DynSolValue::Address(spender)];
        let result = contract.function("allowance", &args)?.call().await?;
        extract_uint(&result, 0)
    }

    pub async fn erc20_decimals(&self, token: Address) -> Result<u8> {
        let contract = self.erc20(token)?;
        let result = contract.function("decimals", &[])?.call().await?;
        match result.first() {
            Some(DynSolValue::Uint(v, _)) => Ok(v.to::<u8>()),
            _ => Err(eyre::eyre!("decimals() returned unexpected type")),
        }
    }
}

/// Pull a `Uint` out of a dynamic call result at `index`, erroring with
/// context instead of panicking on a malformed/empty response.
pub fn extract_uint(values: &[DynSolValue], index: usize) -> Result<U256> {
    match values.get(index) {
        Some(DynSolValue::Uint(v, _)) => Ok(*v),
        Some(other) => Err(eyre::eyre!("expected Uint at index {index}, got {other:?}")),
        None => Err(eyre::eyre!("missing return value at index {index}")),
    }
}

pub fn extract_address(values: &[DynSolValue], index: usize) -> Result<Address> {
    match values.get(index) {
        Some(DynSolValue::Address(a)) => Ok(*a),
        Some(other) => Err(eyre::eyre!("expected Address at index {index}, got {other:?}")),
        None => Err(eyre::eyre!("missing return value at index {index}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_fee_respects_priority_floor() {
        let fee = FeeData {
            base_fee_per_gas: 5_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        };
        let max_fee = fee.max_fee_per_gas(10_000);
        assert!(max_fee >= fee.max_priority_fee_per_gas);
    }

    #[test]
    fn abi_fragments_parse() {
        assert!(abi::comptroller_abi().is_ok());
        assert!(abi::vtoken_abi().is_ok());
        assert!(abi::erc20_abi().is_ok());
        assert!(abi::v3_factory_abi().is_ok());
        assert!(abi::v3_pool_abi().is_ok());
        assert!(abi::v3_router_abi().is_ok());
        assert!(abi::flash_liquidator_abi().is_ok());
    }
}
