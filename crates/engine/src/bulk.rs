//! Bulk ingest
//!
//! Applies a batch of row mutations, one repository call per item: a
//! create when the item carries no id, an update when it does. This is an
//! explicit partial-failure batch, not a transaction: no item's failure
//! touches any other item, and the per-item outcomes stream back in input
//! order so arbitrarily large batches never buffer a whole response.
//!
//! Items execute with bounded concurrency for throughput; ordering of the
//! *applications* is unspecified, only the outcome order is.

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use shelf_core::{JsonMap, OwnerId, Result, Row, RowId, StoreId};

use crate::repository::RowRepository;

/// Outcomes buffered between producer and consumer
const STREAM_CAPACITY: usize = 16;

/// Default in-flight repository calls per batch
const DEFAULT_CONCURRENCY: usize = 8;

/// One input item: an optional target id plus the data to write
#[derive(Debug, Clone, Deserialize)]
pub struct BulkItem {
    /// Update this row when present; create a fresh row when absent
    #[serde(default, rename = "id")]
    pub row_id: Option<RowId>,
    /// Candidate data mapping
    pub data: JsonMap,
}

/// Per-item outcome, reported in input order
#[derive(Debug)]
pub struct BulkOutcome {
    /// Zero-based index of the input item
    pub position: usize,
    /// The written row, or why this item failed
    pub result: Result<Row>,
}

/// Lazy sequence of per-item outcomes
pub type OutcomeStream = ReceiverStream<BulkOutcome>;

/// Batch application of row creates and updates
#[derive(Clone)]
pub struct BulkProcessor {
    repo: RowRepository,
    concurrency: usize,
}

impl BulkProcessor {
    /// New processor with the default concurrency
    pub fn new(repo: RowRepository) -> Self {
        BulkProcessor {
            repo,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Cap the in-flight repository calls per batch
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Apply `items` against one store, streaming outcomes in input order
    ///
    /// Dropping the stream cancels the remaining items; outcomes already
    /// produced stand (each item is an independent write).
    pub fn ingest(&self, owner: OwnerId, store_id: StoreId, items: Vec<BulkItem>) -> OutcomeStream {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let repo = self.repo.clone();
        let concurrency = self.concurrency;

        tokio::spawn(async move {
            let total = items.len();
            let mut failures = 0usize;
            let mut outcomes = futures::stream::iter(items.into_iter().enumerate())
                .map(|(position, item)| {
                    let repo = repo.clone();
                    let owner = owner.clone();
                    let store_id = store_id.clone();
                    async move {
                        let result = apply(&repo, &owner, &store_id, item).await;
                        BulkOutcome { position, result }
                    }
                })
                .buffered(concurrency);

            while let Some(outcome) = outcomes.next().await {
                if outcome.result.is_err() {
                    failures += 1;
                }
                if tx.send(outcome).await.is_err() {
                    return; // consumer hung up; remaining items are dropped
                }
            }
            tracing::info!(total, failures, "bulk ingest finished");
        });

        ReceiverStream::new(rx)
    }
}

async fn apply(
    repo: &RowRepository,
    owner: &OwnerId,
    store_id: &StoreId,
    item: BulkItem,
) -> Result<Row> {
    match item.row_id {
        Some(row_id) => repo.update_row(owner, store_id, &row_id, &item.data).await,
        None => repo.create_row(owner, store_id, None, &item.data).await,
    }
}
