use super::models::{CachedEntry, CachedSnapshot};
use crate::config::Network;
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use std::str::FromStr;

pub struct SnapshotRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> SnapshotRepository<'a> {
    // created_at survives overwrites; everything else is replaced
    const UPSERT_SNAPSHOT: &'static str = "INSERT INTO snapshots (
            contract_address, network, block_height, merkle_root,
            total_nfts, unique_owners, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT (contract_address, network) DO UPDATE SET
            block_height = excluded.block_height,
            merkle_root = excluded.merkle_root,
            total_nfts = excluded.total_nfts,
            unique_owners = excluded.unique_owners,
            updated_at = excluded.updated_at";

    const SELECT_SNAPSHOT_ID: &'static str =
        "SELECT id FROM snapshots WHERE contract_address = ?1 AND network = ?2";

    const SELECT_SNAPSHOT: &'static str = "SELECT id, block_height, merkle_root, total_nfts,
            unique_owners, created_at, updated_at
        FROM snapshots WHERE contract_address = ?1 AND network = ?2";

    const DELETE_ENTRIES: &'static str = "DELETE FROM snapshot_entries WHERE snapshot_id = ?1";

    const INSERT_ENTRY: &'static str = "INSERT INTO snapshot_entries (
            snapshot_id, token_id_padded, owner, leaf_hash, proof
        ) VALUES (?1, ?2, ?3, ?4, ?5)";

    const SELECT_ENTRIES: &'static str = "SELECT token_id_padded, owner, leaf_hash, proof
        FROM snapshot_entries WHERE snapshot_id = ?1
        ORDER BY token_id_padded ASC";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Pad a U256 token id to 78 digits so text ordering matches numeric ordering.
    /// U256 max is approximately 10^77, so 78 digits is sufficient
    pub fn pad_token_id(token_id: &U256) -> String {
        format!("{:0>78}", token_id.to_string())
    }

    pub fn unpad_token_id(padded: &str) -> Result<U256> {
        let trimmed = padded.trim_start_matches('0');
        if trimmed.is_empty() {
            return Ok(U256::ZERO);
        }
        U256::from_str(trimmed).with_context(|| format!("Invalid token id in cache: {padded}"))
    }

    /// Upserts the header and replaces every entry row in one transaction.
    pub fn save(&self, snapshot: &CachedSnapshot) -> Result<usize> {
        let address = format!("{:?}", snapshot.contract_address);
        let network = snapshot.network.as_str();
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            Self::UPSERT_SNAPSHOT,
            params![
                address,
                network,
                snapshot.block_height,
                snapshot.merkle_root.map(|root| format!("{root:?}")),
                snapshot.total_nfts,
                snapshot.unique_owners,
                snapshot.created_at.timestamp(),
                snapshot.updated_at.timestamp(),
            ],
        )?;

        let snapshot_id: i64 =
            tx.query_row(Self::SELECT_SNAPSHOT_ID, params![address, network], |row| {
                row.get(0)
            })?;

        tx.execute(Self::DELETE_ENTRIES, params![snapshot_id])?;

        let mut count = 0;
        {
            let mut stmt = tx.prepare(Self::INSERT_ENTRY)?;
            for entry in &snapshot.entries {
                let proof = entry
                    .proof
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                count += stmt.execute(params![
                    snapshot_id,
                    Self::pad_token_id(&entry.token_id),
                    format!("{:?}", entry.owner),
                    entry.leaf_hash.map(|leaf| format!("{leaf:?}")),
                    proof,
                ])?;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    pub fn load(&self, contract_address: &Address, network: Network) -> Result<Option<CachedSnapshot>> {
        let address = format!("{contract_address:?}");
        let header = self
            .conn
            .query_row(
                Self::SELECT_SNAPSHOT,
                params![address, network.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, u64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, usize>(3)?,
                        row.get::<_, usize>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, block_height, merkle_root, total_nfts, unique_owners, created, updated)) =
            header
        else {
            return Ok(None);
        };

        let merkle_root = merkle_root
            .map(|root| root.parse::<B256>())
            .transpose()
            .context("Invalid merkle root in cache")?;

        let mut stmt = self.conn.prepare(Self::SELECT_ENTRIES)?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (token_id, owner, leaf_hash, proof) in rows {
            entries.push(CachedEntry {
                token_id: Self::unpad_token_id(&token_id)?,
                owner: Address::from_str(&owner)
                    .with_context(|| format!("Invalid owner in cache: {owner}"))?,
                leaf_hash: leaf_hash
                    .map(|leaf| leaf.parse::<B256>())
                    .transpose()
                    .context("Invalid leaf hash in cache")?,
                proof: proof
                    .map(|proof| serde_json::from_str::<Vec<B256>>(&proof))
                    .transpose()
                    .context("Invalid proof in cache")?,
            });
        }

        Ok(Some(CachedSnapshot {
            contract_address: *contract_address,
            network,
            block_height,
            merkle_root,
            total_nfts,
            unique_owners,
            created_at: timestamp(created)?,
            updated_at: timestamp(updated)?,
            entries,
        }))
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid timestamp in cache: {}", secs))
}
