use crate::config::Network;
use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedSnapshot {
    pub contract_address: Address,
    pub network: Network,
    pub block_height: u64,
    pub merkle_root: Option<B256>,
    pub total_nfts: usize,
    pub unique_owners: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<CachedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub token_id: U256,
    pub owner: Address,
    pub leaf_hash: Option<B256>,
    pub proof: Option<Vec<B256>>,
}
