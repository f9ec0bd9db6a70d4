use crate::error::SnapshotError;
use crate::hypersync::{LogPage, LogQuery, LogSource, RawLog};
use alloy_primitives::{Address, B256};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Overall budget for one multi-page fetch. Either bound ends the fetch early
/// and marks the outcome as limited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchBounds {
    pub timeout: Option<Duration>,
    pub max_iterations: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub pages: Vec<LogPage>,
    /// Source head at fetch start, never updated afterwards.
    pub observed_height: u64,
    pub limited: bool,
    pub iterations: usize,
    pub elapsed: Duration,
}

impl FetchOutcome {
    pub fn log_count(&self) -> usize {
        self.pages.iter().map(|page| page.logs.len()).sum()
    }

    /// Flattens pages in delivery order. When every log carries its
    /// (block, log index) position they are stable-sorted by it.
    pub fn into_ordered_logs(self) -> Vec<RawLog> {
        let mut logs: Vec<RawLog> = self.pages.into_iter().flat_map(|page| page.logs).collect();
        if !logs.is_empty() && logs.iter().all(|log| log.position().is_some()) {
            logs.sort_by_key(|log| log.position());
        } else if !logs.is_empty() {
            debug!("Logs lack chain positions, keeping delivery order");
        }
        logs
    }
}

pub struct Scanner<'a, S: LogSource + ?Sized> {
    source: &'a S,
    contract_address: Address,
    event_signatures: Vec<B256>,
    fields: Vec<String>,
    bounds: FetchBounds,
}

impl<'a, S: LogSource + ?Sized> Scanner<'a, S> {
    pub fn new(
        source: &'a S,
        contract_address: Address,
        event_signatures: Vec<B256>,
        fields: Vec<String>,
        bounds: FetchBounds,
    ) -> Self {
        Scanner {
            source,
            contract_address,
            event_signatures,
            fields,
            bounds,
        }
    }

    /// Pages through every matching log from block 0. Pages are fetched
    /// strictly one after another; any failed page aborts the whole fetch.
    pub async fn fetch_all_logs(&self) -> Result<FetchOutcome, SnapshotError> {
        let started = Instant::now();
        let observed_height = self.source.height().await?;
        info!(
            "Fetching logs for {:?} up to observed height {}",
            self.contract_address, observed_height
        );

        let mut pages = Vec::new();
        let mut cursor = 0u64;
        let mut iterations = 0usize;
        let mut limited = false;

        loop {
            if let Some(max) = self.bounds.max_iterations {
                if iterations >= max {
                    warn!(
                        "Iteration limit {} reached at block {}, snapshot is partial",
                        max, cursor
                    );
                    limited = true;
                    break;
                }
            }
            if let Some(budget) = self.bounds.timeout {
                if started.elapsed() >= budget {
                    warn!(
                        "Fetch time budget of {:?} exhausted at block {}, snapshot is partial",
                        budget, cursor
                    );
                    limited = true;
                    break;
                }
            }

            let query = LogQuery {
                from_block: cursor,
                address: self.contract_address,
                topics: self.event_signatures.clone(),
                fields: self.fields.clone(),
            };
            let page = match self.bounds.timeout {
                Some(budget) => {
                    let remaining = budget.saturating_sub(started.elapsed());
                    match tokio::time::timeout(remaining, self.source.query(&query)).await {
                        Ok(result) => result?,
                        Err(_) => {
                            warn!(
                                "Fetch time budget of {:?} exhausted during page at block {}, snapshot is partial",
                                budget, cursor
                            );
                            limited = true;
                            break;
                        }
                    }
                }
                None => self.source.query(&query).await?,
            };
            iterations += 1;

            let received = page.logs.len();
            let next_block = page.next_block;
            let archive_height = page.archive_height.unwrap_or(observed_height);
            info!(
                "Page {}: received {} logs from block {} (next: {:?})",
                iterations, received, cursor, next_block
            );
            pages.push(page);

            match next_block {
                None => break,
                Some(next) if next <= cursor => {
                    debug!("Cursor did not advance past block {}, stopping", cursor);
                    break;
                }
                Some(next) => {
                    cursor = next;
                    if received == 0 && cursor >= archive_height {
                        break;
                    }
                }
            }
        }

        let outcome = FetchOutcome {
            pages,
            observed_height,
            limited,
            iterations,
            elapsed: started.elapsed(),
        };
        info!(
            "Fetched {} logs in {} pages ({:?}){}",
            outcome.log_count(),
            outcome.iterations,
            outcome.elapsed,
            if outcome.limited { ", limited" } else { "" }
        );
        Ok(outcome)
    }
}
