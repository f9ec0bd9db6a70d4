use crate::hypersync::RawLog;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub mod erc20 {
    use alloy::sol;

    sol! {
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

pub mod erc721 {
    use alloy::sol;

    sol! {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

pub mod erc1155 {
    use alloy::sol;

    sol! {
        event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);
        event TransferBatch(address indexed operator, address indexed from, address indexed to, uint256[] ids, uint256[] values);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStandard {
    Erc721,
    Erc1155,
    Erc20,
}

impl TokenStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStandard::Erc721 => "erc721",
            TokenStandard::Erc1155 => "erc1155",
            TokenStandard::Erc20 => "erc20",
        }
    }

    /// topic0 values to filter the upstream query on.
    pub fn event_signatures(&self) -> Vec<B256> {
        match self {
            TokenStandard::Erc721 => vec![erc721::Transfer::SIGNATURE_HASH],
            TokenStandard::Erc20 => vec![erc20::Transfer::SIGNATURE_HASH],
            TokenStandard::Erc1155 => vec![
                erc1155::TransferSingle::SIGNATURE_HASH,
                erc1155::TransferBatch::SIGNATURE_HASH,
            ],
        }
    }
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStandard {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "erc721" | "721" => Ok(TokenStandard::Erc721),
            "erc1155" | "1155" => Ok(TokenStandard::Erc1155),
            "erc20" | "20" => Ok(TokenStandard::Erc20),
            other => Err(anyhow::anyhow!("Unsupported token standard: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Erc721,
    Erc1155Single,
    Erc1155Batch,
    Erc20,
}

/// One decoded transfer. Batch transfers are flattened into one event per id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub kind: EventKind,
    pub from: Address,
    pub to: Address,
    pub token_id: Option<U256>,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeFailure {
    #[error("missing topic{0}")]
    MissingTopic(usize),
    #[error("unexpected event signature {0}")]
    UnknownSignature(B256),
    #[error("abi decoding failed: {0}")]
    Abi(String),
    #[error("batch arrays differ in length: {ids} ids, {amounts} amounts")]
    LengthMismatch { ids: usize, amounts: usize },
    #[error("batch arrays are empty")]
    EmptyBatch,
}

impl From<alloy::sol_types::Error> for DecodeFailure {
    fn from(e: alloy::sol_types::Error) -> Self {
        DecodeFailure::Abi(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeStats {
    pub logs_seen: usize,
    pub events_decoded: usize,
    pub malformed: usize,
}

fn present_topics(topics: &[Option<B256>]) -> Result<Vec<B256>, DecodeFailure> {
    topics
        .iter()
        .enumerate()
        .map(|(index, topic)| topic.ok_or(DecodeFailure::MissingTopic(index)))
        .collect()
}

/// Mints are sometimes indexed without a `from` topic; it reads as the zero address.
pub fn decode_erc721(log: &RawLog) -> Result<LogEvent, DecodeFailure> {
    let mut topics = log.topics.clone();
    if let Some(from) = topics.get_mut(1) {
        if from.is_none() {
            *from = Some(B256::ZERO);
        }
    }
    let transfer = erc721::Transfer::decode_raw_log(present_topics(&topics)?, &log.data)?;

    Ok(LogEvent {
        kind: EventKind::Erc721,
        from: transfer.from,
        to: transfer.to,
        token_id: Some(transfer.tokenId),
        amount: U256::from(1u64),
    })
}

pub fn decode_erc20(log: &RawLog) -> Result<LogEvent, DecodeFailure> {
    let transfer = erc20::Transfer::decode_raw_log(present_topics(&log.topics)?, &log.data)?;

    Ok(LogEvent {
        kind: EventKind::Erc20,
        from: transfer.from,
        to: transfer.to,
        token_id: None,
        amount: transfer.value,
    })
}

pub fn decode_erc1155_single(log: &RawLog) -> Result<LogEvent, DecodeFailure> {
    let transfer = erc1155::TransferSingle::decode_raw_log(present_topics(&log.topics)?, &log.data)?;

    Ok(LogEvent {
        kind: EventKind::Erc1155Single,
        from: transfer.from,
        to: transfer.to,
        token_id: Some(transfer.id),
        amount: transfer.value,
    })
}

/// Emits one event per `(id, value)` pair of the batch.
pub fn decode_erc1155_batch(log: &RawLog) -> Result<Vec<LogEvent>, DecodeFailure> {
    let transfer = erc1155::TransferBatch::decode_raw_log(present_topics(&log.topics)?, &log.data)?;

    if transfer.ids.len() != transfer.values.len() {
        return Err(DecodeFailure::LengthMismatch {
            ids: transfer.ids.len(),
            amounts: transfer.values.len(),
        });
    }
    if transfer.ids.is_empty() {
        return Err(DecodeFailure::EmptyBatch);
    }

    let (from, to) = (transfer.from, transfer.to);
    Ok(transfer
        .ids
        .into_iter()
        .zip(transfer.values)
        .map(|(id, amount)| LogEvent {
            kind: EventKind::Erc1155Batch,
            from,
            to,
            token_id: Some(id),
            amount,
        })
        .collect())
}

pub fn decode_log(standard: TokenStandard, log: &RawLog) -> Result<Vec<LogEvent>, DecodeFailure> {
    match standard {
        TokenStandard::Erc721 => decode_erc721(log).map(|event| vec![event]),
        TokenStandard::Erc20 => decode_erc20(log).map(|event| vec![event]),
        TokenStandard::Erc1155 => match log.topic(0) {
            Some(topic0) if topic0 == erc1155::TransferBatch::SIGNATURE_HASH => {
                decode_erc1155_batch(log)
            }
            Some(topic0) if topic0 == erc1155::TransferSingle::SIGNATURE_HASH => {
                decode_erc1155_single(log).map(|event| vec![event])
            }
            Some(topic0) => Err(DecodeFailure::UnknownSignature(topic0)),
            None => Err(DecodeFailure::MissingTopic(0)),
        },
    }
}

/// Decodes logs in order, dropping and counting the ones that fail.
pub fn decode_logs<'a, I>(standard: TokenStandard, logs: I) -> (Vec<LogEvent>, DecodeStats)
where
    I: IntoIterator<Item = &'a RawLog>,
{
    let mut stats = DecodeStats::default();
    let mut events = Vec::new();

    for log in logs {
        stats.logs_seen += 1;
        match decode_log(standard, log) {
            Ok(decoded) => {
                stats.events_decoded += decoded.len();
                events.extend(decoded);
            }
            Err(e) => {
                debug!("Dropping malformed {} log: {}", standard, e);
                stats.malformed += 1;
            }
        }
    }

    (events, stats)
}
