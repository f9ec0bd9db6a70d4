//! Exact-precision balance accumulator.
//!
//! Credits and debits are summed separately as 512-bit totals, so replaying
//! any number of 256-bit amounts cannot overflow and a balance may go
//! negative while events are still being applied.

use alloy_primitives::{U256, U512};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

/// Net position of one ledger key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedBalance {
    Positive(U512),
    Zero,
    Negative(U512),
}

impl SignedBalance {
    pub fn is_positive(&self) -> bool {
        matches!(self, SignedBalance::Positive(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Position {
    credited: U512,
    debited: U512,
}

impl Position {
    fn net(&self) -> SignedBalance {
        match self.credited.cmp(&self.debited) {
            Ordering::Greater => SignedBalance::Positive(self.credited - self.debited),
            Ordering::Equal => SignedBalance::Zero,
            Ordering::Less => SignedBalance::Negative(self.debited - self.credited),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ledger<K> {
    positions: HashMap<K, Position>,
    total_credited: U512,
    total_debited: U512,
}

impl<K> Default for Ledger<K> {
    fn default() -> Self {
        Self {
            positions: HashMap::new(),
            total_credited: U512::ZERO,
            total_debited: U512::ZERO,
        }
    }
}

impl<K> Ledger<K>
where
    K: Eq + Hash + Clone + Ord,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&mut self, key: K, amount: U256) {
        let amount = U512::from(amount);
        let position = self.positions.entry(key).or_default();
        position.credited += amount;
        self.total_credited += amount;
    }

    pub fn debit(&mut self, key: K, amount: U256) {
        let amount = U512::from(amount);
        let position = self.positions.entry(key).or_default();
        position.debited += amount;
        self.total_debited += amount;
    }

    pub fn balance(&self, key: &K) -> SignedBalance {
        self.positions
            .get(key)
            .map(Position::net)
            .unwrap_or(SignedBalance::Zero)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn total_credited(&self) -> U512 {
        self.total_credited
    }

    pub fn total_debited(&self) -> U512 {
        self.total_debited
    }

    /// Keys with a strictly positive balance, sorted by key.
    ///
    /// Balances above `U256::MAX` can only come from inconsistent event data
    /// and are clamped to `U256::MAX`.
    pub fn positive_balances(&self) -> Vec<(K, U256)> {
        let mut balances: Vec<(K, U256)> = self
            .positions
            .iter()
            .filter_map(|(key, position)| match position.net() {
                SignedBalance::Positive(value) => Some((key.clone(), U256::saturating_from(value))),
                _ => None,
            })
            .collect();
        balances.sort_by(|a, b| a.0.cmp(&b.0));
        balances
    }
}
