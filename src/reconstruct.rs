//! Folds the decoded event stream into final ownership and balances.
//!
//! Events are applied one at a time in the order given. Finalized output is
//! always explicitly sorted, so the result never depends on map iteration
//! order.

use crate::events::{LogEvent, TokenStandard};
use crate::ledger::Ledger;
use alloy_primitives::{Address, U256};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftOwnership {
    pub token_id: U256,
    pub owner: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHolding {
    pub address: Address,
    pub token_id: U256,
    pub balance: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHolder {
    pub address: Address,
    pub balance: U256,
}

/// Finalized entries, one variant per standard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotEntries {
    Erc721(Vec<NftOwnership>),
    Erc1155(Vec<TokenHolding>),
    Erc20(Vec<TokenHolder>),
}

impl SnapshotEntries {
    pub fn len(&self) -> usize {
        match self {
            SnapshotEntries::Erc721(entries) => entries.len(),
            SnapshotEntries::Erc1155(entries) => entries.len(),
            SnapshotEntries::Erc20(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn standard(&self) -> TokenStandard {
        match self {
            SnapshotEntries::Erc721(_) => TokenStandard::Erc721,
            SnapshotEntries::Erc1155(_) => TokenStandard::Erc1155,
            SnapshotEntries::Erc20(_) => TokenStandard::Erc20,
        }
    }
}

/// tokenId -> owner, last writer wins.
#[derive(Debug, Clone, Default)]
pub struct Erc721State {
    owners: HashMap<U256, Address>,
}

impl Erc721State {
    pub fn apply(&mut self, event: &LogEvent) {
        if let Some(token_id) = event.token_id {
            // No check against the previous owner; delivery order is authoritative.
            self.owners.insert(token_id, event.to);
        }
    }

    pub fn finalize(self) -> Vec<NftOwnership> {
        let mut entries: Vec<NftOwnership> = self
            .owners
            .into_iter()
            .filter(|(_, owner)| *owner != Address::ZERO)
            .map(|(token_id, owner)| NftOwnership { token_id, owner })
            .collect();
        entries.sort_by(|a, b| a.token_id.cmp(&b.token_id));
        entries
    }
}

#[derive(Debug, Clone, Default)]
pub struct Erc1155State {
    ledger: Ledger<(Address, U256)>,
}

impl Erc1155State {
    pub fn apply(&mut self, event: &LogEvent) {
        let Some(token_id) = event.token_id else {
            return;
        };
        if event.from != Address::ZERO {
            self.ledger.debit((event.from, token_id), event.amount);
        }
        if event.to != Address::ZERO {
            self.ledger.credit((event.to, token_id), event.amount);
        }
    }

    pub fn ledger(&self) -> &Ledger<(Address, U256)> {
        &self.ledger
    }

    pub fn finalize(self) -> Vec<TokenHolding> {
        let mut entries: Vec<TokenHolding> = self
            .ledger
            .positive_balances()
            .into_iter()
            .map(|((address, token_id), balance)| TokenHolding {
                address,
                token_id,
                balance,
            })
            .collect();
        entries.sort_by(|a, b| {
            a.token_id
                .cmp(&b.token_id)
                .then_with(|| b.balance.cmp(&a.balance))
                .then_with(|| a.address.cmp(&b.address))
        });
        entries
    }
}

#[derive(Debug, Clone, Default)]
pub struct Erc20State {
    ledger: Ledger<Address>,
}

impl Erc20State {
    pub fn apply(&mut self, event: &LogEvent) {
        if event.from != Address::ZERO {
            self.ledger.debit(event.from, event.amount);
        }
        if event.to != Address::ZERO {
            self.ledger.credit(event.to, event.amount);
        }
    }

    pub fn ledger(&self) -> &Ledger<Address> {
        &self.ledger
    }

    pub fn finalize(self) -> Vec<TokenHolder> {
        let mut entries: Vec<TokenHolder> = self
            .ledger
            .positive_balances()
            .into_iter()
            .map(|(address, balance)| TokenHolder { address, balance })
            .collect();
        entries.sort_by(|a, b| {
            b.balance
                .cmp(&a.balance)
                .then_with(|| a.address.cmp(&b.address))
        });
        entries
    }
}

#[derive(Debug, Clone)]
pub enum LedgerState {
    Erc721(Erc721State),
    Erc1155(Erc1155State),
    Erc20(Erc20State),
}

impl LedgerState {
    pub fn new(standard: TokenStandard) -> Self {
        match standard {
            TokenStandard::Erc721 => LedgerState::Erc721(Erc721State::default()),
            TokenStandard::Erc1155 => LedgerState::Erc1155(Erc1155State::default()),
            TokenStandard::Erc20 => LedgerState::Erc20(Erc20State::default()),
        }
    }

    pub fn apply(&mut self, event: &LogEvent) {
        match self {
            LedgerState::Erc721(state) => state.apply(event),
            LedgerState::Erc1155(state) => state.apply(event),
            LedgerState::Erc20(state) => state.apply(event),
        }
    }

    pub fn finalize(self) -> SnapshotEntries {
        match self {
            LedgerState::Erc721(state) => SnapshotEntries::Erc721(state.finalize()),
            LedgerState::Erc1155(state) => SnapshotEntries::Erc1155(state.finalize()),
            LedgerState::Erc20(state) => SnapshotEntries::Erc20(state.finalize()),
        }
    }
}

pub fn reduce<'a, I>(standard: TokenStandard, events: I) -> LedgerState
where
    I: IntoIterator<Item = &'a LogEvent>,
{
    let mut state = LedgerState::new(standard);
    for event in events {
        state.apply(event);
    }
    state
}
