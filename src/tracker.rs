//! Position Tracker (spec §4.2): the live set of known borrowers and their
//! latest snapshot. Grounded on `monitoring::scanner`'s periodic re-check
//! loop and `bootstrap::bootstrap_user_positions`'s per-account progress
//! logging/at-risk counting, folded into a single owned map instead of a
//! one-shot bootstrap pass.

use crate::types::Position;
use alloy_primitives::Address;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

struct TrackedEntry {
    position: Position,
    healthy_polls: AtomicU32,
}

pub struct PositionTracker {
    entries: DashMap<Address, TrackedEntry>,
    min_health_factor: f64,
    min_position_size_usd: f64,
    healthy_polls_before_drop: u32,
}

impl PositionTracker {
    pub fn new(min_health_factor: f64, min_position_size_usd: f64, healthy_polls_before_drop: u32) -> Self {
        Self {
            entries: DashMap::new(),
            min_health_factor,
            min_position_size_usd,
            healthy_polls_before_drop,
        }
    }

    /// Merge a freshly fetched snapshot. Applying the same snapshot twice is
    /// idempotent: the stored position and poll counter end up identical.
    pub fn update_position(&self, position: Position) {
        let borrower = position.borrower;
        let is_healthy_zero_debt = position.debt_value_usd == 0.0
            && position.health_factor >= self.min_health_factor;

        match self.entries.get_mut(&borrower) {
            Some(mut entry) => {
                if is_healthy_zero_debt {
                    entry.healthy_polls.fetch_add(1, Ordering::Relaxed);
                } else {
                    entry.healthy_polls.store(0, Ordering::Relaxed);
                }
                entry.position = position;
            }
            None => {
                self.entries.insert(
                    borrower,
                    TrackedEntry {
                        position,
                        healthy_polls: AtomicU32::new(if is_healthy_zero_debt { 1 } else { 0 }),
                    },
                );
            }
        }

        if let Some(entry) = self.entries.get(&borrower) {
            if entry.healthy_polls.load(Ordering::Relaxed) >= self.healthy_polls_before_drop {
                drop(entry);
                self.entries.remove(&borrower);
            }
        }
    }

    pub fn get(&self, borrower: Address) -> Option<Position> {
        self.entries.get(&borrower).map(|e| e.position.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tracked_borrowers(&self) -> Vec<Address> {
        self.entries.iter().map(|e| *e.key()).collect()
    }

    /// Liquidatable positions, sorted by descending debt size (ties broken
    /// by descending estimated profit), matching the priority order the
    /// Engine should work through a poll cycle in.
    pub fn liquidatable_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self
            .entries
            .iter()
            .map(|e| e.position.clone())
            .filter(|p| p.is_liquidatable(self.min_health_factor, self.min_position_size_usd))
            .collect();
        positions.sort_by(|a, b| {
            b.debt_value_usd
                .total_cmp(&a.debt_value_usd)
                .then_with(|| b.estimated_profit_usd.total_cmp(&a.estimated_profit_usd))
        });
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(borrower: Address, hf: f64, debt_usd: f64) -> Position {
        Position {
            borrower,
            health_factor: hf,
            collateral_markets: vec![],
            borrow_markets: vec![],
            collateral_value_usd: 0.0,
            debt_value_usd: debt_usd,
            liquidity_usd: 0.0,
            shortfall_usd: 0.0,
            estimated_profit_usd: 0.0,
            repay_token: None,
            seize_token: None,
            repay_amount: Default::default(),
            timestamp: Utc::now(),
        }
    }

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::from(bytes)
    }

    #[test]
    fn update_position_is_idempotent() {
        let tracker = PositionTracker::new(1.0, 50.0, 3);
        let p = position(addr(1), 0.8, 1000.0);
        tracker.update_position(p.clone());
        tracker.update_position(p);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.liquidatable_positions().len(), 1);
    }

    #[test]
    fn healthy_zero_debt_position_is_evicted_after_threshold_polls() {
        let tracker = PositionTracker::new(1.0, 50.0, 3);
        let borrower = addr(2);
        for _ in 0..3 {
            tracker.update_position(position(borrower, 1.5, 0.0));
        }
        assert!(tracker.get(borrower).is_none());
    }

    #[test]
    fn liquidatable_positions_sorted_by_descending_debt() {
        let tracker = PositionTracker::new(1.0, 50.0, 3);
        tracker.update_position(position(addr(1), 0.9, 100.0));
        tracker.update_position(position(addr(2), 0.9, 5000.0));
        let sorted = tracker.liquidatable_positions();
        assert_eq!(sorted[0].borrower, addr(2));
    }
}
