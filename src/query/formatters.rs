use crate::error::SnapshotError;
use crate::reconstruct::SnapshotEntries;
use crate::snapshot::{Analytics, MerkleCommitment, Snapshot};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::{Value, json};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Merkle,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Table => "text/plain; charset=utf-8",
            OutputFormat::Csv => "text/csv; charset=utf-8",
            OutputFormat::Json | OutputFormat::Merkle => "application/json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "merkle" => Ok(OutputFormat::Merkle),
            other => Err(SnapshotError::InvalidRequest(format!(
                "Unknown format '{other}', expected json, csv, merkle or table"
            ))),
        }
    }
}

/// Renders a snapshot. Balances are raw integers in every format.
pub fn format_snapshot(snapshot: &Snapshot, format: OutputFormat) -> Result<String, SnapshotError> {
    match format {
        OutputFormat::Table => Ok(format_snapshot_table(snapshot)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&snapshot_json(snapshot))?),
        OutputFormat::Csv => format_snapshot_csv(&snapshot.entries),
        OutputFormat::Merkle => {
            let document = merkle_json(snapshot).ok_or_else(|| {
                SnapshotError::InvalidRequest(format!(
                    "No merkle commitment available for {} snapshots",
                    snapshot.token_standard
                ))
            })?;
            Ok(serde_json::to_string_pretty(&document)?)
        }
    }
}

pub fn snapshot_json(snapshot: &Snapshot) -> Value {
    let proofs = snapshot.merkle.as_ref().map(|m| &m.proofs);
    let entries: Vec<Value> = match &snapshot.entries {
        SnapshotEntries::Erc721(entries) => entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut entry = json!({
                    "tokenId": e.token_id.to_string(),
                    "owner": format!("{:?}", e.owner),
                });
                if let Some(proof) = proofs.and_then(|p| p.get(i)) {
                    entry["proof"] = proof_json(proof);
                }
                entry
            })
            .collect(),
        SnapshotEntries::Erc1155(entries) => entries
            .iter()
            .map(|e| {
                json!({
                    "address": format!("{:?}", e.address),
                    "tokenId": e.token_id.to_string(),
                    "balance": e.balance.to_string(),
                })
            })
            .collect(),
        SnapshotEntries::Erc20(entries) => entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut entry = json!({
                    "address": format!("{:?}", e.address),
                    "balance": e.balance.to_string(),
                });
                if let Some(proof) = proofs.and_then(|p| p.get(i)) {
                    entry["proof"] = proof_json(proof);
                }
                entry
            })
            .collect(),
    };

    json!({
        "contractAddress": format!("{:?}", snapshot.contract_address),
        "network": snapshot.network.as_str(),
        "tokenStandard": snapshot.token_standard.as_str(),
        "snapshotBlockHeight": snapshot.snapshot_block_height,
        "limited": snapshot.limited,
        "fromCache": snapshot.from_cache,
        "computedAt": snapshot.computed_at.to_rfc3339(),
        "merkleRoot": snapshot.merkle.as_ref().map(|m| format!("{:?}", m.root)),
        "analytics": analytics_json(&snapshot.analytics),
        "stats": {
            "pages": snapshot.stats.pages,
            "logsSeen": snapshot.stats.decode.logs_seen,
            "eventsDecoded": snapshot.stats.decode.events_decoded,
            "malformed": snapshot.stats.decode.malformed,
        },
        "entries": entries,
    })
}

fn analytics_json(analytics: &Analytics) -> Value {
    let mut value = json!({
        "uniqueHolders": analytics.unique_holders,
        "totalEntries": analytics.total_entries,
    });
    if let Some(total_nfts) = analytics.total_nfts {
        value["totalNfts"] = json!(total_nfts);
        value["uniqueOwners"] = json!(analytics.unique_holders);
    }
    if let Some(unique_token_ids) = analytics.unique_token_ids {
        value["uniqueTokenIds"] = json!(unique_token_ids);
    }
    if let Some(total_supply) = analytics.total_supply {
        value["totalSupply"] = json!(total_supply.to_string());
    }
    value
}

fn proof_json(proof: &[alloy_primitives::B256]) -> Value {
    Value::Array(proof.iter().map(|h| json!(format!("{h:?}"))).collect())
}

/// `{root, totalLeaves, blockHeight, limited, proofs}` with one proof per entry.
pub fn merkle_json(snapshot: &Snapshot) -> Option<Value> {
    let MerkleCommitment {
        root,
        leaves,
        proofs,
    } = snapshot.merkle.as_ref()?;

    let pairs: Vec<(String, String)> = match &snapshot.entries {
        SnapshotEntries::Erc721(entries) => entries
            .iter()
            .map(|e| (format!("{:?}", e.owner), e.token_id.to_string()))
            .collect(),
        SnapshotEntries::Erc20(entries) => entries
            .iter()
            .map(|e| (format!("{:?}", e.address), e.balance.to_string()))
            .collect(),
        SnapshotEntries::Erc1155(_) => return None,
    };

    let proofs: Vec<Value> = pairs
        .into_iter()
        .zip(leaves.iter().zip(proofs))
        .map(|((address, value), (leaf, proof))| {
            json!({
                "address": address,
                "value": value,
                "leaf": format!("{leaf:?}"),
                "proof": proof_json(proof),
            })
        })
        .collect();

    Some(json!({
        "root": format!("{root:?}"),
        "totalLeaves": leaves.len(),
        "blockHeight": snapshot.snapshot_block_height,
        "limited": snapshot.limited,
        "proofs": proofs,
    }))
}

fn format_snapshot_csv(entries: &SnapshotEntries) -> Result<String, SnapshotError> {
    let mut wtr = Writer::from_writer(vec![]);

    match entries {
        SnapshotEntries::Erc721(entries) => {
            write_record(&mut wtr, ["tokenId", "owner"])?;
            for e in entries {
                write_record(&mut wtr, [&e.token_id.to_string(), &format!("{:?}", e.owner)])?;
            }
        }
        SnapshotEntries::Erc1155(entries) => {
            write_record(&mut wtr, ["address", "tokenId", "balance"])?;
            for e in entries {
                write_record(
                    &mut wtr,
                    [
                        &format!("{:?}", e.address),
                        &e.token_id.to_string(),
                        &e.balance.to_string(),
                    ],
                )?;
            }
        }
        SnapshotEntries::Erc20(entries) => {
            write_record(&mut wtr, ["address", "balance"])?;
            for e in entries {
                write_record(&mut wtr, [&format!("{:?}", e.address), &e.balance.to_string()])?;
            }
        }
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| SnapshotError::Internal(format!("Failed to flush CSV: {e}")))?;
    String::from_utf8(bytes).map_err(|e| SnapshotError::Internal(e.to_string()))
}

fn write_record<I, T>(wtr: &mut Writer<Vec<u8>>, record: I) -> Result<(), SnapshotError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    wtr.write_record(record)
        .map_err(|e| SnapshotError::Internal(format!("Failed to write CSV: {e}")))
}

fn format_snapshot_table(snapshot: &Snapshot) -> String {
    let mut summary = Table::new();
    summary
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Metric", "Value"]);

    summary.add_row(vec![
        Cell::new("Contract"),
        Cell::new(format!("{:?}", snapshot.contract_address)),
    ]);
    summary.add_row(vec![Cell::new("Network"), Cell::new(snapshot.network)]);
    summary.add_row(vec![Cell::new("Standard"), Cell::new(snapshot.token_standard)]);
    summary.add_row(vec![
        Cell::new("Block Height"),
        Cell::new(snapshot.snapshot_block_height),
    ]);
    summary.add_row(vec![
        Cell::new("Unique Holders"),
        Cell::new(snapshot.analytics.unique_holders),
    ]);
    if let Some(total_nfts) = snapshot.analytics.total_nfts {
        summary.add_row(vec![Cell::new("Total NFTs"), Cell::new(total_nfts)]);
    }
    if let Some(unique_ids) = snapshot.analytics.unique_token_ids {
        summary.add_row(vec![Cell::new("Unique Token IDs"), Cell::new(unique_ids)]);
    }
    if let Some(supply) = snapshot.analytics.total_supply {
        summary.add_row(vec![Cell::new("Total Supply"), Cell::new(supply.to_string())]);
    }
    if let Some(merkle) = &snapshot.merkle {
        summary.add_row(vec![
            Cell::new("Merkle Root"),
            Cell::new(format!("{:?}", merkle.root)),
        ]);
    }
    summary.add_row(vec![Cell::new("Partial"), Cell::new(snapshot.limited)]);

    if snapshot.entries.is_empty() {
        return format!("{summary}\nNo holders found.");
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);

    match &snapshot.entries {
        SnapshotEntries::Erc721(entries) => {
            table.set_header(vec!["Token ID", "Owner"]);
            for e in entries {
                table.add_row(vec![
                    Cell::new(e.token_id.to_string()),
                    Cell::new(format!("{:#}", e.owner)),
                ]);
            }
        }
        SnapshotEntries::Erc1155(entries) => {
            table.set_header(vec!["Address", "Token ID", "Balance"]);
            for e in entries {
                table.add_row(vec![
                    Cell::new(format!("{:#}", e.address)),
                    Cell::new(e.token_id.to_string()),
                    Cell::new(e.balance.to_string()),
                ]);
            }
        }
        SnapshotEntries::Erc20(entries) => {
            table.set_header(vec!["Rank", "Address", "Balance"]);
            for (i, e) in entries.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(i + 1),
                    Cell::new(format!("{:#}", e.address)),
                    Cell::new(e.balance.to_string()),
                ]);
            }
        }
    }

    format!("{summary}\n{table}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::reconstruct::{NftOwnership, TokenHolder, TokenHolding};
    use crate::snapshot::{FetchStats, build_commitment};
    use alloy_primitives::{Address, U256};
    use chrono::Utc;

    fn snapshot(entries: SnapshotEntries, with_merkle: bool) -> Snapshot {
        let merkle = if with_merkle {
            build_commitment(&entries)
        } else {
            None
        };
        Snapshot {
            contract_address: Address::repeat_byte(0xaa),
            network: Network::Mainnet,
            token_standard: entries.standard(),
            snapshot_block_height: 1234,
            analytics: Analytics::from_entries(&entries),
            entries,
            merkle,
            limited: false,
            stats: FetchStats::default(),
            from_cache: false,
            computed_at: Utc::now(),
        }
    }

    fn nft_snapshot() -> Snapshot {
        snapshot(
            SnapshotEntries::Erc721(vec![
                NftOwnership {
                    token_id: U256::from(1u64),
                    owner: Address::repeat_byte(0x0b),
                },
                NftOwnership {
                    token_id: U256::from(2u64),
                    owner: Address::repeat_byte(0x0c),
                },
            ]),
            true,
        )
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("merkle".parse::<OutputFormat>().unwrap(), OutputFormat::Merkle);
        assert!(matches!(
            "xml".parse::<OutputFormat>(),
            Err(SnapshotError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_csv_schemas() {
        let csv = format_snapshot(&nft_snapshot(), OutputFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("tokenId,owner"));
        assert_eq!(
            lines.next(),
            Some("1,0x0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b")
        );

        let multi = snapshot(
            SnapshotEntries::Erc1155(vec![TokenHolding {
                address: Address::repeat_byte(0x0d),
                token_id: U256::from(7u64),
                balance: U256::from(3u64),
            }]),
            false,
        );
        let csv = format_snapshot(&multi, OutputFormat::Csv).unwrap();
        assert!(csv.starts_with("address,tokenId,balance\n"));
        assert!(csv.contains(",7,3"));

        let fungible = snapshot(
            SnapshotEntries::Erc20(vec![TokenHolder {
                address: Address::repeat_byte(0x0e),
                balance: U256::MAX,
            }]),
            false,
        );
        let csv = format_snapshot(&fungible, OutputFormat::Csv).unwrap();
        assert!(csv.starts_with("address,balance\n"));
        assert!(csv.contains(&U256::MAX.to_string()));
    }

    #[test]
    fn test_json_carries_analytics_and_strings() {
        let value = snapshot_json(&nft_snapshot());
        assert_eq!(value["tokenStandard"], "erc721");
        assert_eq!(value["snapshotBlockHeight"], 1234);
        assert_eq!(value["limited"], false);
        assert_eq!(value["analytics"]["uniqueOwners"], 2);
        assert_eq!(value["analytics"]["totalNfts"], 2);
        assert_eq!(value["entries"][0]["tokenId"], "1");
        assert!(value["entries"][0]["proof"].is_array());
        assert!(value["merkleRoot"].is_string());
    }

    #[test]
    fn test_merkle_document() {
        let snap = nft_snapshot();
        let value = merkle_json(&snap).unwrap();
        let root = snap.merkle.as_ref().unwrap().root;

        assert_eq!(value["root"], format!("{root:?}"));
        assert_eq!(value["totalLeaves"], 2);
        assert_eq!(value["blockHeight"], 1234);
        assert_eq!(value["proofs"][1]["value"], "2");
        assert_eq!(
            value["proofs"][1]["address"],
            format!("{:?}", Address::repeat_byte(0x0c))
        );
        assert_eq!(value["proofs"][1]["proof"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_merkle_requires_commitment() {
        let multi = snapshot(SnapshotEntries::Erc1155(vec![]), false);
        assert!(matches!(
            format_snapshot(&multi, OutputFormat::Merkle),
            Err(SnapshotError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_table_prints_raw_erc20_balance() {
        let fungible = snapshot(
            SnapshotEntries::Erc20(vec![TokenHolder {
                address: Address::repeat_byte(0x0e),
                balance: U256::from(1_500_000u64),
            }]),
            false,
        );
        let table = format_snapshot(&fungible, OutputFormat::Table).unwrap();
        assert!(table.contains("1500000"));
        assert!(!table.contains("1.5"));
        assert!(!table.contains("Wei"));
    }

    #[test]
    fn test_table_empty_snapshot() {
        let empty = snapshot(SnapshotEntries::Erc721(vec![]), true);
        let table = format_snapshot(&empty, OutputFormat::Table).unwrap();
        assert!(table.contains("No holders found."));
    }
}
