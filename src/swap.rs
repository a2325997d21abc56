//! Swap Executor (spec §4.7). Grounded on `liquidation::executor`'s
//! mock-vs-real transaction split (`LIQUIDATION_REAL_EXECUTION` style env
//! toggle) and its `ContractInstance` calling convention, retargeted from the
//! Aave liquidator contract onto PancakeSwap V3's router.

use crate::chain::ChainClient;
use crate::route::encode_path;
use crate::types::{Route, SwapResult};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::Provider;
use alloy_rpc_types::TransactionReceipt;
use eyre::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{info, warn};

/// Canonical keccak256 of `Transfer(address,address,uint256)`, per spec §6.
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

pub struct SwapExecutor<P> {
    chain: Arc<ChainClient<P>>,
    router_address: Address,
    signer_address: Address,
    dry_run: bool,
    tolerance_bps: u32,
}

impl<P> SwapExecutor<P>
where
    P: Provider,
{
    pub fn new(
        chain: Arc<ChainClient<P>>,
        router_address: Address,
        signer_address: Address,
        dry_run: bool,
        tolerance_bps: u32,
    ) -> Self {
        Self {
            chain,
            router_address,
            signer_address,
            dry_run,
            tolerance_bps,
        }
    }

    /// Approves the router for `amount` if the current allowance is
    /// insufficient. No-op (and no transaction) when already approved.
    pub async fn ensure_approval(&self, token: Address, amount: U256) -> Result<bool> {
        let allowance = self
            .chain
            .erc20_allowance(token, self.signer_address, self.router_address)
            .await?;
        if allowance >= amount {
            return Ok(false);
        }
        if self.dry_run {
            info!(%token, %amount, "dry run: would approve router");
            return Ok(true);
        }
        let erc20 = self.chain.erc20(token)?;
        let args = [DynSolValue::Address(self.router_address), DynSolValue::Uint(amount, 256)];
        erc20.function("approve", &args)?.send().await?.get_receipt().await?;
        Ok(true)
    }

    /// Derives `amountOutMinimum` per spec §4.7: a positive caller-supplied
    /// minimum is used as-is; otherwise the router is quoted with
    /// `amountOutMinimum = 0` and a `tolerance_bps` haircut is applied. A
    /// failed quote falls back to the caller's (possibly zero) minimum.
    async fn derive_min_amount_out(&self, route: &Route, amount_in: U256, explicit_min: U256, tolerance_bps: u32) -> U256 {
        if !explicit_min.is_zero() {
            return explicit_min;
        }
        let router = match self.chain.v3_router(self.router_address) {
            Ok(r) => r,
            Err(_) => return explicit_min,
        };
        let quoted = if route.is_single_hop() {
            let params = DynSolValue::Tuple(vec![
                DynSolValue::Address(route.path[0]),
                DynSolValue::Address(route.path[1]),
                DynSolValue::Uint(U256::from(route.fees[0]), 24),
                DynSolValue::Address(self.signer_address),
                DynSolValue::Uint(amount_in, 256),
                DynSolValue::Uint(U256::ZERO, 256),
                DynSolValue::Uint(U256::ZERO, 160),
            ]);
            router.function("exactInputSingle", &[params]).ok()
        } else {
            let Ok(path_bytes) = encode_path(&route.path, &route.fees) else {
                return explicit_min;
            };
            let params = DynSolValue::Tuple(vec![
                DynSolValue::Bytes(path_bytes),
                DynSolValue::Address(self.signer_address),
                DynSolValue::Uint(amount_in, 256),
                DynSolValue::Uint(U256::ZERO, 256),
            ]);
            router.function("exactInput", &[params]).ok()
        };

        let Some(call) = quoted else { return explicit_min };
        match call.call().await.ok().and_then(|values| crate::chain::extract_uint(&values, 0).ok()) {
            Some(quote) => quote.saturating_mul(U256::from(10_000 - tolerance_bps.min(10_000))) / U256::from(10_000u64),
            None => explicit_min,
        }
    }

    /// Executes `route` for `amount_in`, enforcing `min_amount_out` on-chain
    /// via the router call. Falls back to a deterministic mock transaction
    /// hash in dry-run mode, mirroring the teacher's mock execution path.
    pub async fn execute_swap(
        &self,
        route: &Route,
        amount_in: U256,
        min_amount_out: U256,
    ) -> Result<SwapResult> {
        if !route.is_well_formed() {
            return Ok(SwapResult {
                success: false,
                tx_hash: None,
                amount_in,
                amount_out: None,
                token_in: route.path.first().copied().unwrap_or(Address::ZERO),
                token_out: route.path.last().copied().unwrap_or(Address::ZERO),
                gas_used: None,
                price_impact: None,
                error: Some("malformed route".to_string()),
            });
        }

        let token_in = route.path[0];
        let token_out = *route.path.last().unwrap();

        self.ensure_approval(token_in, amount_in).await?;

        if self.dry_run {
            let mock_hash = mock_tx_hash(token_in, token_out, amount_in, route.expected_out);
            info!(%token_in, %token_out, %amount_in, tx_hash = %mock_hash, "dry run: simulated swap");
            return Ok(SwapResult {
                success: true,
                tx_hash: Some(mock_hash),
                amount_in,
                amount_out: Some(route.expected_out),
                token_in,
                token_out,
                gas_used: None,
                price_impact: None,
                error: None,
            });
        }

        let router = self.chain.v3_router(self.router_address)?;
        let min_out = self.derive_min_amount_out(route, amount_in, min_amount_out, self.tolerance_bps).await;

        let pending = if route.is_single_hop() {
            let params = DynSolValue::Tuple(vec![
                DynSolValue::Address(token_in),
                DynSolValue::Address(token_out),
                DynSolValue::Uint(U256::from(route.fees[0]), 24),
                DynSolValue::Address(self.signer_address),
                DynSolValue::Uint(amount_in, 256),
                DynSolValue::Uint(min_out, 256),
                DynSolValue::Uint(U256::ZERO, 160),
            ]);
            router.function("exactInputSingle", &[params])?.send().await
        } else {
            let path_bytes = encode_path(&route.path, &route.fees)?;
            let params = DynSolValue::Tuple(vec![
                DynSolValue::Bytes(path_bytes),
                DynSolValue::Address(self.signer_address),
                DynSolValue::Uint(amount_in, 256),
                DynSolValue::Uint(min_out, 256),
            ]);
            router.function("exactInput", &[params])?.send().await
        };

        match pending {
            Ok(pending) => {
                let receipt = pending.get_receipt().await?;
                let tx_hash = format!("{:#x}", receipt.transaction_hash);
                let amount_out = net_transfer_delta(&receipt, token_out, self.signer_address);
                info!(%token_in, %token_out, ?amount_out, %tx_hash, "swap executed");
                Ok(SwapResult {
                    success: true,
                    tx_hash: Some(tx_hash),
                    amount_in,
                    amount_out,
                    token_in,
                    token_out,
                    gas_used: Some(receipt.gas_used as u64),
                    price_impact: None,
                    error: None,
                })
            }
            Err(e) => {
                warn!(%token_in, %token_out, error = %e, "swap reverted");
                Ok(SwapResult {
                    success: false,
                    tx_hash: None,
                    amount_in,
                    amount_out: None,
                    token_in,
                    token_out,
                    gas_used: None,
                    price_impact: None,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}

/// Post-trade `amountOut` derivation per spec §4.7: scan the receipt's
/// `Transfer(address,address,uint256)` logs on `token_out` and net out the
/// signer's inflow minus outflow. No matching logs is not an error — the
/// swap is still reported as successful with `amount_out: None`.
fn net_transfer_delta(receipt: &TransactionReceipt, token_out: Address, signer: Address) -> Option<U256> {
    let transfer_topic: B256 = TRANSFER_TOPIC.parse().ok()?;
    let mut inflow = U256::ZERO;
    let mut outflow = U256::ZERO;
    let mut saw_any = false;

    for log in receipt.inner.logs() {
        if log.inner.address != token_out {
            continue;
        }
        let topics = log.inner.data.topics();
        if topics.first() != Some(&transfer_topic) || topics.len() < 3 {
            continue;
        }
        let from = Address::from_slice(&topics[1].as_slice()[12..32]);
        let to = Address::from_slice(&topics[2].as_slice()[12..32]);
        let value = U256::from_be_slice(log.inner.data.data.as_ref());
        saw_any = true;
        if to == signer {
            inflow += value;
        }
        if from == signer {
            outflow += value;
        }
    }

    if !saw_any || inflow < outflow {
        return None;
    }
    Some(inflow - outflow)
}

fn mock_tx_hash(token_in: Address, token_out: Address, amount_in: U256, amount_out: U256) -> String {
    let mut hasher = DefaultHasher::new();
    token_in.hash(&mut hasher);
    token_out.hash(&mut hasher);
    amount_in.hash(&mut hasher);
    amount_out.hash(&mut hasher);
    format!("0x{:064x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_hash_is_deterministic_for_identical_inputs() {
        let a = Address::ZERO;
        let b: Address = "0x0000000000000000000000000000000000dEaD".parse().unwrap();
        let h1 = mock_tx_hash(a, b, U256::from(100u64), U256::from(99u64));
        let h2 = mock_tx_hash(a, b, U256::from(100u64), U256::from(99u64));
        assert_eq!(h1, h2);
        assert!(h1.starts_with("0x"));
    }

    #[test]
    fn mock_hash_changes_with_amount() {
        let a = Address::ZERO;
        let b: Address = "0x0000000000000000000000000000000000dEaD".parse().unwrap();
        let h1 = mock_tx_hash(a, b, U256::from(100u64), U256::from(99u64));
        let h2 = mock_tx_hash(a, b, U256::from(200u64), U256::from(99u64));
        assert_ne!(h1, h2);
    }
}
