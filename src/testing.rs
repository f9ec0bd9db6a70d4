//! In-memory log source for tests.

use crate::config::Network;
use crate::error::SnapshotError;
use crate::hypersync::{LogPage, LogQuery, LogSource, RawLog};
use crate::snapshot::SourceProvider;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct MockSource {
    height: u64,
    pages: Vec<LogPage>,
    /// Cursor each page is served at: 0, then each page's `next_block`.
    cursors: Vec<u64>,
    fail_at: Option<usize>,
    delay: Option<Duration>,
    pub queried_cursors: Mutex<Vec<u64>>,
    pub height_calls: AtomicUsize,
}

impl MockSource {
    pub fn new(height: u64, pages: Vec<LogPage>) -> Self {
        let mut cursors = vec![0];
        cursors.extend(pages.iter().filter_map(|page| page.next_block));
        Self {
            height,
            pages,
            cursors,
            fail_at: None,
            delay: None,
            queried_cursors: Mutex::new(Vec::new()),
            height_calls: AtomicUsize::new(0),
        }
    }

    /// All logs in one final page.
    pub fn single_page(height: u64, logs: Vec<RawLog>) -> Self {
        Self::new(
            height,
            vec![LogPage {
                logs,
                next_block: None,
                archive_height: Some(height),
            }],
        )
    }

    /// Splits logs into pages of `per_page`, chaining `next_block` cursors.
    pub fn paged(height: u64, logs: Vec<RawLog>, per_page: usize) -> Self {
        let chunks: Vec<Vec<RawLog>> = logs.chunks(per_page).map(|c| c.to_vec()).collect();
        let total = chunks.len();
        let pages = chunks
            .into_iter()
            .enumerate()
            .map(|(i, logs)| LogPage {
                logs,
                next_block: if i + 1 < total {
                    Some((i as u64 + 1) * 10)
                } else {
                    None
                },
                archive_height: Some(height),
            })
            .collect();
        Self::new(height, pages)
    }

    pub fn failing_at(mut self, page: usize) -> Self {
        self.fail_at = Some(page);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn query_count(&self) -> usize {
        self.queried_cursors.lock().unwrap().len()
    }
}

#[async_trait]
impl LogSource for MockSource {
    async fn height(&self) -> Result<u64, SnapshotError> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.height)
    }

    async fn query(&self, query: &LogQuery) -> Result<LogPage, SnapshotError> {
        self.queried_cursors.lock().unwrap().push(query.from_block);
        let index = self
            .cursors
            .iter()
            .position(|cursor| *cursor == query.from_block);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if index.is_some() && self.fail_at == index {
            return Err(SnapshotError::Upstream {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }

        Ok(index
            .and_then(|index| self.pages.get(index))
            .cloned()
            .unwrap_or_default())
    }
}

/// Hands out the same mock source for every network and records credentials.
pub struct MockProvider {
    pub source: Arc<MockSource>,
    pub credentials: Mutex<Vec<Option<String>>>,
}

impl MockProvider {
    pub fn new(source: MockSource) -> Arc<Self> {
        Arc::new(Self {
            source: Arc::new(source),
            credentials: Mutex::new(Vec::new()),
        })
    }
}

impl SourceProvider for MockProvider {
    fn source(
        &self,
        _network: Network,
        credential: Option<&str>,
    ) -> Result<Arc<dyn LogSource>, SnapshotError> {
        self.credentials
            .lock()
            .unwrap()
            .push(credential.map(str::to_string));
        Ok(self.source.clone())
    }
}
