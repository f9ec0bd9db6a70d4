//! Snapshot orchestration: fetch, decode, reduce and (optionally) commit.
//!
//! Shared-credential requests are admitted one at a time; a second caller is
//! turned away with a retry hint instead of queueing. ERC-721 snapshots are
//! cached per (contract, network).

use crate::config::{Config, Network};
use crate::error::SnapshotError;
use crate::events::{DecodeStats, TokenStandard, decode_logs};
use crate::hypersync::{HyperSyncClient, LogSource, field_selection};
use crate::merkle::MerkleTree;
use crate::reconstruct::{NftOwnership, SnapshotEntries, reduce};
use crate::repository::{CachedEntry, CachedSnapshot, Database, SnapshotRepository};
use crate::scanner::{FetchBounds, FetchOutcome, Scanner};
use alloy_primitives::{Address, B256, U256, U512};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

const ADDRESS_PATTERN: &str = r"^0x[0-9a-fA-F]{40}$";

pub fn parse_contract_address(raw: &str) -> Result<Address, SnapshotError> {
    let raw = raw.trim();
    let re = Regex::new(ADDRESS_PATTERN).map_err(|e| SnapshotError::Internal(e.to_string()))?;
    if !re.is_match(raw) {
        return Err(SnapshotError::InvalidAddress(format!(
            "'{raw}' must be 0x followed by 40 hex characters"
        )));
    }
    Address::from_str(raw).map_err(|e| SnapshotError::InvalidAddress(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleCommitment {
    pub root: B256,
    /// Parallel to the snapshot entries.
    pub leaves: Vec<B256>,
    pub proofs: Vec<Vec<B256>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analytics {
    pub unique_holders: usize,
    pub total_entries: usize,
    pub total_nfts: Option<usize>,
    pub unique_token_ids: Option<usize>,
    pub total_supply: Option<U512>,
}

impl Analytics {
    pub fn from_entries(entries: &SnapshotEntries) -> Self {
        match entries {
            SnapshotEntries::Erc721(entries) => Analytics {
                unique_holders: entries.iter().map(|e| e.owner).collect::<HashSet<_>>().len(),
                total_entries: entries.len(),
                total_nfts: Some(entries.len()),
                ..Default::default()
            },
            SnapshotEntries::Erc1155(entries) => Analytics {
                unique_holders: entries.iter().map(|e| e.address).collect::<HashSet<_>>().len(),
                total_entries: entries.len(),
                unique_token_ids: Some(
                    entries.iter().map(|e| e.token_id).collect::<HashSet<_>>().len(),
                ),
                ..Default::default()
            },
            SnapshotEntries::Erc20(entries) => Analytics {
                unique_holders: entries.len(),
                total_entries: entries.len(),
                total_supply: Some(total_balance(entries.iter().map(|h| h.balance))),
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub pages: usize,
    pub decode: DecodeStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub contract_address: Address,
    pub network: Network,
    pub token_standard: TokenStandard,
    /// Head observed when the fetch started; an upper bound on included events.
    pub snapshot_block_height: u64,
    pub entries: SnapshotEntries,
    pub analytics: Analytics,
    pub merkle: Option<MerkleCommitment>,
    /// Set when a fetch bound stopped pagination before the source was exhausted.
    pub limited: bool,
    pub stats: FetchStats,
    pub from_cache: bool,
    pub computed_at: DateTime<Utc>,
}

/// Builds the commitment over `(address, value)` pairs in entry order.
/// ERC-1155 entries carry two numeric fields and have no leaf encoding.
pub fn build_commitment(entries: &SnapshotEntries) -> Option<MerkleCommitment> {
    let tree = match entries {
        SnapshotEntries::Erc721(entries) => {
            MerkleTree::from_entries(entries.iter().map(|e| (&e.owner, &e.token_id)))
        }
        SnapshotEntries::Erc20(entries) => {
            MerkleTree::from_entries(entries.iter().map(|e| (&e.address, &e.balance)))
        }
        SnapshotEntries::Erc1155(_) => return None,
    };

    Some(MerkleCommitment {
        root: tree.root(),
        leaves: tree.leaves().to_vec(),
        proofs: tree.proofs(),
    })
}

/// Decodes and reduces a completed fetch. Pure apart from the timestamp.
pub fn build_snapshot(
    contract_address: Address,
    network: Network,
    standard: TokenStandard,
    outcome: FetchOutcome,
    with_merkle: bool,
) -> Snapshot {
    let observed_height = outcome.observed_height;
    let limited = outcome.limited;
    let pages = outcome.iterations;
    let logs = outcome.into_ordered_logs();

    let (events, decode) = decode_logs(standard, &logs);
    if decode.malformed > 0 {
        warn!(
            "Dropped {} malformed {} logs out of {}",
            decode.malformed, standard, decode.logs_seen
        );
    }

    let entries = reduce(standard, &events).finalize();
    let analytics = Analytics::from_entries(&entries);
    let merkle = if with_merkle {
        build_commitment(&entries)
    } else {
        None
    };

    info!(
        "Snapshot for {:?} on {}: {} entries, {} holders{}",
        contract_address,
        network,
        entries.len(),
        analytics.unique_holders,
        if limited { " (partial)" } else { "" }
    );

    Snapshot {
        contract_address,
        network,
        token_standard: standard,
        snapshot_block_height: observed_height,
        entries,
        analytics,
        merkle,
        limited,
        stats: FetchStats { pages, decode },
        from_cache: false,
        computed_at: Utc::now(),
    }
}

/// Hands out a log source for a network, using the caller's credential when
/// one is given.
pub trait SourceProvider: Send + Sync {
    fn source(
        &self,
        network: Network,
        credential: Option<&str>,
    ) -> Result<Arc<dyn LogSource>, SnapshotError>;
}

pub struct HyperSyncProvider {
    config: Config,
}

impl HyperSyncProvider {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl SourceProvider for HyperSyncProvider {
    fn source(
        &self,
        network: Network,
        credential: Option<&str>,
    ) -> Result<Arc<dyn LogSource>, SnapshotError> {
        let token = credential
            .map(str::to_string)
            .or_else(|| self.config.bearer_token.clone());
        let client = HyperSyncClient::new(
            self.config.source_url(network),
            token,
            self.config.request_timeout,
        )?;
        Ok(Arc::new(client))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    pub refresh: bool,
    /// Caller-supplied upstream credential; bypasses admission control.
    pub credential: Option<String>,
    pub with_merkle: bool,
    pub bounds: Option<FetchBounds>,
}

#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub contract_address: String,
    pub network: Network,
    pub standard: TokenStandard,
    pub options: SnapshotOptions,
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub cache_ttl: Duration,
    pub retry_after_secs: u64,
    pub bounds: FetchBounds,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        ServiceSettings {
            cache_ttl: config.cache_ttl,
            retry_after_secs: config.retry_after_secs,
            bounds: FetchBounds {
                timeout: config.fetch_timeout,
                max_iterations: config.max_iterations,
            },
        }
    }
}

#[derive(Clone)]
pub struct SnapshotService {
    provider: Arc<dyn SourceProvider>,
    admission: Arc<Semaphore>,
    cache: Option<Arc<Mutex<Database>>>,
    settings: ServiceSettings,
}

impl SnapshotService {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        cache: Option<Database>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            provider,
            admission: Arc::new(Semaphore::new(1)),
            cache: cache.map(|db| Arc::new(Mutex::new(db))),
            settings,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = Database::new(&config.database_url)?;
        Ok(Self::new(
            Arc::new(HyperSyncProvider::new(config.clone())),
            Some(db),
            ServiceSettings::from(config),
        ))
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    fn admit(&self, credential: Option<&str>) -> Result<Option<OwnedSemaphorePermit>, SnapshotError> {
        if credential.is_some() {
            debug!("Caller supplied a credential, skipping admission control");
            return Ok(None);
        }
        match self.admission.clone().try_acquire_owned() {
            Ok(permit) => Ok(Some(permit)),
            Err(_) => {
                warn!("Rejecting shared-credential request, a fetch is already in flight");
                Err(SnapshotError::Busy {
                    retry_after_secs: self.settings.retry_after_secs,
                })
            }
        }
    }

    pub async fn compute_snapshot(&self, request: SnapshotRequest) -> Result<Snapshot, SnapshotError> {
        let contract_address = parse_contract_address(&request.contract_address)?;
        let standard = request.standard;
        let network = request.network;
        let options = request.options;

        if options.with_merkle && standard == TokenStandard::Erc1155 {
            return Err(SnapshotError::InvalidRequest(
                "merkle output is only available for erc721 and erc20".to_string(),
            ));
        }

        let cacheable = standard == TokenStandard::Erc721;
        if cacheable && !options.refresh {
            if let Some(cached) = self.load_cached(contract_address, network).await {
                if self.is_fresh(&cached) {
                    info!(
                        "Serving cached snapshot for {:?} on {} (block {})",
                        contract_address, network, cached.block_height
                    );
                    return Ok(snapshot_from_cache(cached));
                }
                debug!("Cached snapshot for {:?} is stale", contract_address);
            }
        }

        // Held until this function returns, on every path.
        let _permit = self.admit(options.credential.as_deref())?;

        let source = self
            .provider
            .source(network, options.credential.as_deref())?;
        let bounds = options.bounds.unwrap_or(self.settings.bounds);
        let scanner = Scanner::new(
            &*source,
            contract_address,
            standard.event_signatures(),
            field_selection(standard),
            bounds,
        );
        let outcome = scanner.fetch_all_logs().await?;

        let with_merkle = options.with_merkle || cacheable;
        let snapshot = build_snapshot(contract_address, network, standard, outcome, with_merkle);

        if cacheable && !snapshot.limited {
            self.store_cached(&snapshot).await;
        }

        Ok(snapshot)
    }

    fn is_fresh(&self, cached: &CachedSnapshot) -> bool {
        match Utc::now().signed_duration_since(cached.updated_at).to_std() {
            Ok(age) => age < self.settings.cache_ttl,
            // updated in the future, clock skew
            Err(_) => true,
        }
    }

    async fn load_cached(&self, contract_address: Address, network: Network) -> Option<CachedSnapshot> {
        let db = self.cache.clone()?;
        let result = tokio::task::spawn_blocking(move || {
            let db = db
                .lock()
                .map_err(|_| anyhow::anyhow!("Cache lock poisoned"))?;
            SnapshotRepository::new(&db.conn).load(&contract_address, network)
        })
        .await;

        match result {
            Ok(Ok(cached)) => cached,
            Ok(Err(e)) => {
                warn!("Failed to read snapshot cache: {:#}", e);
                None
            }
            Err(e) => {
                warn!("Snapshot cache task failed: {}", e);
                None
            }
        }
    }

    async fn store_cached(&self, snapshot: &Snapshot) {
        let Some(db) = self.cache.clone() else {
            return;
        };
        let Some(cached) = cached_from_snapshot(snapshot) else {
            return;
        };

        let result = tokio::task::spawn_blocking(move || {
            let db = db
                .lock()
                .map_err(|_| anyhow::anyhow!("Cache lock poisoned"))?;
            SnapshotRepository::new(&db.conn).save(&cached)
        })
        .await;

        match result {
            Ok(Ok(rows)) => info!("Cached snapshot with {} entries", rows),
            Ok(Err(e)) => warn!("Failed to write snapshot cache: {:#}", e),
            Err(e) => warn!("Snapshot cache task failed: {}", e),
        }
    }
}

fn cached_from_snapshot(snapshot: &Snapshot) -> Option<CachedSnapshot> {
    let SnapshotEntries::Erc721(entries) = &snapshot.entries else {
        return None;
    };
    let merkle = snapshot.merkle.as_ref();

    let entries = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| CachedEntry {
            token_id: entry.token_id,
            owner: entry.owner,
            leaf_hash: merkle.and_then(|m| m.leaves.get(i).copied()),
            proof: merkle.and_then(|m| m.proofs.get(i).cloned()),
        })
        .collect();

    Some(CachedSnapshot {
        contract_address: snapshot.contract_address,
        network: snapshot.network,
        block_height: snapshot.snapshot_block_height,
        merkle_root: merkle.map(|m| m.root),
        total_nfts: snapshot.analytics.total_nfts.unwrap_or(snapshot.entries.len()),
        unique_owners: snapshot.analytics.unique_holders,
        created_at: snapshot.computed_at,
        updated_at: snapshot.computed_at,
        entries,
    })
}

fn snapshot_from_cache(cached: CachedSnapshot) -> Snapshot {
    let complete_proofs = cached
        .entries
        .iter()
        .all(|e| e.leaf_hash.is_some() && e.proof.is_some());

    let merkle = match cached.merkle_root {
        Some(root) if complete_proofs => Some(MerkleCommitment {
            root,
            leaves: cached.entries.iter().filter_map(|e| e.leaf_hash).collect(),
            proofs: cached.entries.iter().filter_map(|e| e.proof.clone()).collect(),
        }),
        _ => None,
    };

    let entries = SnapshotEntries::Erc721(
        cached
            .entries
            .into_iter()
            .map(|e| NftOwnership {
                token_id: e.token_id,
                owner: e.owner,
            })
            .collect(),
    );

    let mut analytics = Analytics::from_entries(&entries);
    analytics.total_nfts = Some(cached.total_nfts);
    analytics.unique_holders = cached.unique_owners;

    Snapshot {
        contract_address: cached.contract_address,
        network: cached.network,
        token_standard: TokenStandard::Erc721,
        snapshot_block_height: cached.block_height,
        entries,
        analytics,
        merkle,
        limited: false,
        stats: FetchStats::default(),
        from_cache: true,
        computed_at: cached.updated_at,
    }
}

/// Sum of balances without overflow.
pub fn total_balance(balances: impl IntoIterator<Item = U256>) -> U512 {
    balances
        .into_iter()
        .fold(U512::ZERO, |total, balance| total + U512::from(balance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::{erc1155_batch_log, erc20_log, erc721_log};
    use crate::merkle::verify;
    use crate::reconstruct::TokenHolding;
    use crate::testing::{MockProvider, MockSource};

    const CONTRACT: &str = "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA0001";

    fn settings() -> ServiceSettings {
        ServiceSettings {
            cache_ttl: Duration::from_secs(3600),
            retry_after_secs: 30,
            bounds: FetchBounds::default(),
        }
    }

    fn request(standard: TokenStandard) -> SnapshotRequest {
        SnapshotRequest {
            contract_address: CONTRACT.to_string(),
            network: Network::Testnet,
            standard,
            options: SnapshotOptions::default(),
        }
    }

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn nft_source() -> MockSource {
        MockSource::single_page(
            1_000,
            vec![
                erc721_log(Address::ZERO, addr(0xb), 5),
                erc721_log(addr(0xb), addr(0xc), 5),
            ],
        )
    }

    #[test]
    fn test_parse_contract_address() {
        assert!(parse_contract_address(CONTRACT).is_ok());
        assert!(matches!(
            parse_contract_address("0x1234"),
            Err(SnapshotError::InvalidAddress(_))
        ));
        assert!(parse_contract_address("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").is_err());
        assert!(parse_contract_address("0xZZAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA0001").is_err());
    }

    #[tokio::test]
    async fn test_erc721_worked_example() {
        let provider = MockProvider::new(nft_source());
        let service = SnapshotService::new(provider, None, settings());

        let snapshot = service
            .compute_snapshot(request(TokenStandard::Erc721))
            .await
            .unwrap();

        assert_eq!(
            snapshot.entries,
            SnapshotEntries::Erc721(vec![NftOwnership {
                token_id: U256::from(5u64),
                owner: addr(0xc),
            }])
        );
        assert_eq!(snapshot.analytics.unique_holders, 1);
        assert_eq!(snapshot.analytics.total_nfts, Some(1));
        assert_eq!(snapshot.snapshot_block_height, 1_000);
        assert!(!snapshot.limited);

        let merkle = snapshot.merkle.expect("erc721 snapshots carry a commitment");
        assert!(verify(&merkle.leaves[0], &merkle.proofs[0], &merkle.root));
    }

    #[tokio::test]
    async fn test_erc1155_batch_example() {
        let provider = MockProvider::new(MockSource::single_page(
            50,
            vec![erc1155_batch_log(Address::ZERO, addr(0xd), &[1, 2], &[10, 20])],
        ));
        let service = SnapshotService::new(provider, None, settings());

        let snapshot = service
            .compute_snapshot(request(TokenStandard::Erc1155))
            .await
            .unwrap();

        assert_eq!(
            snapshot.entries,
            SnapshotEntries::Erc1155(vec![
                TokenHolding {
                    address: addr(0xd),
                    token_id: U256::from(1u64),
                    balance: U256::from(10u64),
                },
                TokenHolding {
                    address: addr(0xd),
                    token_id: U256::from(2u64),
                    balance: U256::from(20u64),
                },
            ])
        );
        assert_eq!(snapshot.analytics.unique_token_ids, Some(2));
        assert!(snapshot.merkle.is_none());
    }

    #[tokio::test]
    async fn test_erc20_merkle_proofs_verify() {
        let logs = vec![
            erc20_log(Address::ZERO, addr(1), 100),
            erc20_log(addr(1), addr(2), 40),
            erc20_log(Address::ZERO, addr(3), 7),
        ];
        let provider = MockProvider::new(MockSource::paged(10, logs, 1));
        let service = SnapshotService::new(provider, None, settings());

        let mut req = request(TokenStandard::Erc20);
        req.options.with_merkle = true;
        let snapshot = service.compute_snapshot(req).await.unwrap();

        assert_eq!(snapshot.stats.pages, 3);
        assert_eq!(snapshot.analytics.total_supply, Some(U512::from(U256::from(107u64))));
        let merkle = snapshot.merkle.unwrap();
        assert_eq!(merkle.leaves.len(), 3);
        for (leaf, proof) in merkle.leaves.iter().zip(&merkle.proofs) {
            assert!(verify(leaf, proof, &merkle.root));
        }
    }

    #[tokio::test]
    async fn test_merkle_rejected_for_erc1155() {
        let provider = MockProvider::new(MockSource::single_page(1, vec![]));
        let service = SnapshotService::new(provider.clone(), None, settings());

        let mut req = request(TokenStandard::Erc1155);
        req.options.with_merkle = true;
        let result = service.compute_snapshot(req).await;

        assert!(matches!(result, Err(SnapshotError::InvalidRequest(_))));
        assert_eq!(provider.source.query_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_address_rejected_before_fetch() {
        let provider = MockProvider::new(nft_source());
        let service = SnapshotService::new(provider.clone(), None, settings());

        let mut req = request(TokenStandard::Erc721);
        req.contract_address = "0xnothex".to_string();
        let result = service.compute_snapshot(req).await;

        assert!(matches!(result, Err(SnapshotError::InvalidAddress(_))));
        assert_eq!(provider.source.height_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_shared_request_is_rejected() {
        let source = nft_source().with_delay(Duration::from_millis(50));
        let provider = MockProvider::new(source);
        let service = SnapshotService::new(provider, None, settings());

        let (first, second) = tokio::join!(
            service.compute_snapshot(request(TokenStandard::Erc721)),
            service.compute_snapshot(request(TokenStandard::Erc721)),
        );

        assert!(first.is_ok());
        let err = second.unwrap_err();
        assert_eq!(err.retry_after(), Some(30));
    }

    #[tokio::test]
    async fn test_own_credential_bypasses_admission() {
        let source = nft_source().with_delay(Duration::from_millis(50));
        let provider = MockProvider::new(source);
        let service = SnapshotService::new(provider.clone(), None, settings());

        let mut own = request(TokenStandard::Erc721);
        own.options.credential = Some("user-key".to_string());

        let (first, second) = tokio::join!(
            service.compute_snapshot(request(TokenStandard::Erc721)),
            service.compute_snapshot(own),
        );

        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(
            provider
                .credentials
                .lock()
                .unwrap()
                .contains(&Some("user-key".to_string()))
        );
    }

    #[tokio::test]
    async fn test_permit_released_after_failure() {
        let provider = MockProvider::new(nft_source().failing_at(0));
        let service = SnapshotService::new(provider, None, settings());

        let first = service.compute_snapshot(request(TokenStandard::Erc721)).await;
        assert!(matches!(first, Err(SnapshotError::Upstream { .. })));

        // Still failing upstream, but admitted rather than rejected as busy.
        let second = service.compute_snapshot(request(TokenStandard::Erc721)).await;
        assert!(matches!(second, Err(SnapshotError::Upstream { .. })));
    }

    #[tokio::test]
    async fn test_fresh_cache_hit_skips_upstream() {
        let provider = MockProvider::new(nft_source());
        let db = Database::in_memory().unwrap();
        let service = SnapshotService::new(provider.clone(), Some(db), settings());

        let fetched = service
            .compute_snapshot(request(TokenStandard::Erc721))
            .await
            .unwrap();
        let queries = provider.source.query_count();

        let cached = service
            .compute_snapshot(request(TokenStandard::Erc721))
            .await
            .unwrap();

        assert_eq!(provider.source.query_count(), queries);
        assert!(cached.from_cache);
        assert_eq!(cached.entries, fetched.entries);
        assert_eq!(cached.merkle, fetched.merkle);
        assert_eq!(cached.snapshot_block_height, fetched.snapshot_block_height);
    }

    #[tokio::test]
    async fn test_refresh_and_stale_cache_refetch() {
        let provider = MockProvider::new(nft_source());
        let db = Database::in_memory().unwrap();
        let mut stale = settings();
        stale.cache_ttl = Duration::ZERO;
        let service = SnapshotService::new(provider.clone(), Some(db), stale);

        service
            .compute_snapshot(request(TokenStandard::Erc721))
            .await
            .unwrap();
        let again = service
            .compute_snapshot(request(TokenStandard::Erc721))
            .await
            .unwrap();
        assert!(!again.from_cache);
        assert_eq!(provider.source.height_calls.load(std::sync::atomic::Ordering::SeqCst), 2);

        let fresh_service = SnapshotService {
            settings: settings(),
            ..service.clone()
        };
        let mut forced = request(TokenStandard::Erc721);
        forced.options.refresh = true;
        let refreshed = fresh_service.compute_snapshot(forced).await.unwrap();
        assert!(!refreshed.from_cache);
    }

    #[tokio::test]
    async fn test_limited_snapshot_is_flagged_and_not_cached() {
        let logs = vec![
            erc721_log(Address::ZERO, addr(1), 1),
            erc721_log(Address::ZERO, addr(2), 2),
            erc721_log(Address::ZERO, addr(3), 3),
        ];
        let provider = MockProvider::new(MockSource::paged(900, logs, 1));
        let db = Database::in_memory().unwrap();
        let service = SnapshotService::new(provider.clone(), Some(db), settings());

        let mut req = request(TokenStandard::Erc721);
        req.options.bounds = Some(FetchBounds {
            timeout: None,
            max_iterations: Some(1),
        });
        let snapshot = service.compute_snapshot(req.clone()).await.unwrap();

        assert!(snapshot.limited);
        assert_eq!(snapshot.snapshot_block_height, 900);
        assert_eq!(snapshot.entries.len(), 1);

        let again = service.compute_snapshot(req).await.unwrap();
        assert!(!again.from_cache);
    }

    #[tokio::test]
    async fn test_erc20_is_never_cached() {
        let provider = MockProvider::new(MockSource::single_page(
            5,
            vec![erc20_log(Address::ZERO, addr(1), 1)],
        ));
        let db = Database::in_memory().unwrap();
        let service = SnapshotService::new(provider.clone(), Some(db), settings());

        service.compute_snapshot(request(TokenStandard::Erc20)).await.unwrap();
        let second = service.compute_snapshot(request(TokenStandard::Erc20)).await.unwrap();

        assert!(!second.from_cache);
        assert_eq!(provider.source.height_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_total_balance_widens() {
        assert_eq!(
            total_balance([U256::MAX, U256::from(1u64)]),
            U512::from(U256::MAX) + U512::from(1u64)
        );
    }
}
