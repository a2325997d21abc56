//! Route Optimizer (spec §4.5). The teacher has no DEX-routing code at all
//! (Aave liquidations repay a flat amount, no swap involved), so this module
//! is written fresh in the same `ContractInstance`/`Interface` calling idiom
//! `liquidation::executor` uses for its liquidator contract, enriched with
//! PancakeSwap V3 path-finding conventions from the wider example pack.

use crate::chain::{extract_address, extract_uint, ChainClient};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use dashmap::DashMap;
use eyre::Result;

pub const FEE_LOW: u32 = 500;
pub const FEE_MEDIUM: u32 = 3000;
pub const FEE_HIGH: u32 = 10_000;
const FEE_TIERS: [u32; 3] = [FEE_LOW, FEE_MEDIUM, FEE_HIGH];

use crate::types::Route;

pub struct RouteOptimizer<P> {
    chain: std::sync::Arc<ChainClient<P>>,
    factory_address: Address,
    router_address: Address,
    hub_tokens: Vec<Address>,
    pool_cache: DashMap<(Address, Address, u32), Option<Address>>,
}

impl<P> RouteOptimizer<P>
where
    P: Provider,
{
    pub fn new(
        chain: std::sync::Arc<ChainClient<P>>,
        factory_address: Address,
        router_address: Address,
        hub_tokens: Vec<Address>,
    ) -> Self {
        Self {
            chain,
            factory_address,
            router_address,
            hub_tokens,
            pool_cache: DashMap::new(),
        }
    }

    pub fn router_address(&self) -> Address {
        self.router_address
    }

    async fn pool_for(&self, token_a: Address, token_b: Address, fee: u32) -> Result<Option<Address>> {
        let key = order_pair(token_a, token_b, fee);
        if let Some(cached) = self.pool_cache.get(&key) {
            return Ok(*cached);
        }
        let factory = self.chain.v3_factory(self.factory_address)?;
        let args = [
            DynSolValue::Address(token_a),
            DynSolValue::Address(token_b),
            DynSolValue::Uint(U256::from(fee), 24),
        ];
        let result = factory.function("getPool", &args)?.call().await?;
        let pool = extract_address(&result, 0).ok().filter(|a| !a.is_zero());
        self.pool_cache.insert(key, pool);
        Ok(pool)
    }

    async fn pool_liquidity(&self, pool: Address) -> Result<U256> {
        let contract = self.chain.v3_pool(pool)?;
        let result = contract.function("liquidity", &[])?.call().await?;
        extract_uint(&result, 0)
    }

    /// Pick the fee tier with the deepest liquidity among tiers that have a
    /// pool at all; falls back to `FEE_MEDIUM` when no tier can be scored.
    async fn best_fee_tier(&self, token_a: Address, token_b: Address) -> Result<Option<(u32, Address)>> {
        let mut best: Option<(u32, Address, U256)> = None;
        for &fee in &FEE_TIERS {
            if let Some(pool) = self.pool_for(token_a, token_b, fee).await? {
                let liquidity = self.pool_liquidity(pool).await.unwrap_or(U256::ZERO);
                let improves = match &best {
                    Some((_, _, best_liq)) => liquidity > *best_liq,
                    None => true,
                };
                if improves {
                    best = Some((fee, pool, liquidity));
                }
            }
        }
        Ok(best.map(|(fee, pool, _)| (fee, pool)))
    }

    async fn quote_exact_input_single(
        &self,
        token_in: Address,
        token_out: Address,
        fee: u32,
        amount_in: U256,
    ) -> Result<U256> {
        let router = self.chain.v3_router(self.router_address)?;
        let params = DynSolValue::Tuple(vec![
            DynSolValue::Address(token_in),
            DynSolValue::Address(token_out),
            DynSolValue::Uint(U256::from(fee), 24),
            DynSolValue::Address(Address::ZERO),
            DynSolValue::Uint(amount_in, 256),
            DynSolValue::Uint(U256::ZERO, 256),
            DynSolValue::Uint(U256::ZERO, 160),
        ]);
        let result = router
            .function("exactInputSingle", &[params])?
            .call()
            .await?;
        extract_uint(&result, 0)
    }

    /// Finds the best available path (direct, or two-hop via a configured
    /// hub token) and its estimated output. Returns `None` when no pool
    /// exists on any tier for any candidate path.
    pub async fn find_best_route(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Option<Route>> {
        let mut best: Option<Route> = None;

        if let Some((fee, _pool)) = self.best_fee_tier(token_in, token_out).await? {
            if let Ok(out) = self.quote_exact_input_single(token_in, token_out, fee, amount_in).await {
                best = Some(Route {
                    path: vec![token_in, token_out],
                    fees: vec![fee],
                    expected_out: out,
                });
            }
        }

        for &hub in &self.hub_tokens {
            if hub == token_in || hub == token_out {
                continue;
            }
            let Some((fee_in, _)) = self.best_fee_tier(token_in, hub).await? else {
                continue;
            };
            let Ok(mid_out) = self.quote_exact_input_single(token_in, hub, fee_in, amount_in).await else {
                continue;
            };
            let Some((fee_out, _)) = self.best_fee_tier(hub, token_out).await? else {
                continue;
            };
            let Ok(final_out) = self.quote_exact_input_single(hub, token_out, fee_out, mid_out).await else {
                continue;
            };

            let improves = match &best {
                Some(r) => final_out > r.expected_out,
                None => true,
            };
            if improves {
                best = Some(Route {
                    path: vec![token_in, hub, token_out],
                    fees: vec![fee_in, fee_out],
                    expected_out: final_out,
                });
            }
        }

        Ok(best)
    }
}

fn order_pair(a: Address, b: Address, fee: u32) -> (Address, Address, u32) {
    if a < b {
        (a, b, fee)
    } else {
        (b, a, fee)
    }
}

/// Encodes a V3 multi-hop path as `address‖fee(3 bytes)‖address‖fee‖...‖address`.
pub fn encode_path(path: &[Address], fees: &[u32]) -> Result<Vec<u8>> {
    if path.len() < 2 || fees.len() != path.len() - 1 {
        return Err(eyre::eyre!(
            "path/fees length mismatch: {} tokens, {} fees",
            path.len(),
            fees.len()
        ));
    }
    let mut bytes = Vec::with_capacity(path.len() * 20 + fees.len() * 3);
    for (i, token) in path.iter().enumerate() {
        bytes.extend_from_slice(token.as_slice());
        if i < fees.len() {
            let fee = fees[i];
            bytes.push((fee >> 16) as u8);
            bytes.push((fee >> 8) as u8);
            bytes.push(fee as u8);
        }
    }
    Ok(bytes)
}

/// Inverse of [`encode_path`], used only by tests to assert the round-trip.
pub fn decode_path(bytes: &[u8]) -> Result<(Vec<Address>, Vec<u32>)> {
    if bytes.len() < 20 || (bytes.len() - 20) % 23 != 0 {
        return Err(eyre::eyre!("malformed V3 path: {} bytes", bytes.len()));
    }
    let mut path = Vec::new();
    let mut fees = Vec::new();
    let mut offset = 0;
    path.push(Address::from_slice(&bytes[offset..offset + 20]));
    offset += 20;
    while offset < bytes.len() {
        let fee = ((bytes[offset] as u32) << 16) | ((bytes[offset + 1] as u32) << 8) | bytes[offset + 2] as u32;
        fees.push(fee);
        offset += 3;
        path.push(Address::from_slice(&bytes[offset..offset + 20]));
        offset += 20;
    }
    Ok((path, fees))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    #[test]
    fn path_round_trips_when_well_formed() {
        let path = vec![addr(1), addr(2), addr(3)];
        let fees = vec![FEE_LOW, FEE_MEDIUM];
        let encoded = encode_path(&path, &fees).unwrap();
        assert_eq!(encoded.len(), 3 * 20 + 2 * 3);
        let (decoded_path, decoded_fees) = decode_path(&encoded).unwrap();
        assert_eq!(decoded_path, path);
        assert_eq!(decoded_fees, fees);
    }

    #[test]
    fn path_encode_rejects_mismatched_lengths() {
        let path = vec![addr(1), addr(2), addr(3)];
        let fees = vec![FEE_LOW];
        assert!(encode_path(&path, &fees).is_err());
    }

    #[test]
    fn three_hop_path_length_matches_spec() {
        let path = vec![addr(1), addr(2), addr(3), addr(4)];
        let fees = vec![FEE_LOW, FEE_MEDIUM, FEE_HIGH];
        let encoded = encode_path(&path, &fees).unwrap();
        assert_eq!(encoded.len(), 4 * 20 + 3 * 3);
    }
}
