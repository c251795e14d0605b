//! Query evaluation
//!
//! Two query forms behind one entry point:
//!
//! - `field:value` and `field:[lo TO hi]`: translated into backing-store
//!   secondary-index lookups when the field is indexed, evaluated as a
//!   predicate scan in creation order otherwise
//! - anything else is free text: string values in row data are tokenized
//!   and a row matches when it contains every query token
//!
//! Results stream through a bounded channel as a lazy sequence: rows are
//! fetched (and siblings resolved, identically to a point read) only as
//! the consumer keeps reading. Dropping the stream cancels the producer;
//! search holds no write state, so cancellation is always clean.
//!
//! Tokenization is a pluggable strategy; the default lowercases and
//! splits on non-alphanumeric boundaries. No relevance scoring: scan
//! matches arrive in creation order, index lookups in term order with
//! key ties broken deterministically.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use shelf_core::{Error, FieldType, OwnerId, Result, Row, RowId, StoreId, StoreRecord};
use shelf_storage::{Bucket, IndexHit, IndexQuery, IndexValue, KvBackend};

use crate::indexer;
use crate::repository::RowRepository;

/// Buffered rows between producer and consumer
const STREAM_CAPACITY: usize = 16;

/// Lazy, finite sequence of search results
pub type RowStream = ReceiverStream<Result<Row>>;

/// Splits text into matchable tokens
pub trait Tokenizer: Send + Sync {
    /// Tokens for one piece of text
    fn tokens(&self, text: &str) -> Vec<String>;
}

/// Default tokenizer: lowercase, split on non-alphanumeric boundaries
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleTokenizer;

impl Tokenizer for SimpleTokenizer {
    fn tokens(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect()
    }
}

/// Parsed form of a raw query string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
    /// `field:value` equality
    FieldEq {
        /// Field to compare
        field: String,
        /// Literal to match
        value: String,
    },
    /// `field:[lo TO hi]` inclusive range
    FieldRange {
        /// Field to compare
        field: String,
        /// Lower bound
        lo: String,
        /// Upper bound
        hi: String,
    },
    /// Free-text token match over string data values
    Text(String),
}

impl QueryExpr {
    /// Parse a raw query string
    ///
    /// Anything that does not look like a field query falls back to free
    /// text; parsing never fails.
    pub fn parse(raw: &str) -> QueryExpr {
        let raw = raw.trim();
        if let Some((field, rest)) = raw.split_once(':') {
            if is_field_name(field) {
                if let Some(range) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                    if let Some((lo, hi)) = range.split_once(" TO ") {
                        return QueryExpr::FieldRange {
                            field: field.to_string(),
                            lo: lo.trim().to_string(),
                            hi: hi.trim().to_string(),
                        };
                    }
                }
                if !rest.is_empty() && !rest.contains(char::is_whitespace) {
                    return QueryExpr::FieldEq {
                        field: field.to_string(),
                        value: rest.to_string(),
                    };
                }
            }
        }
        QueryExpr::Text(raw.to_string())
    }
}

fn is_field_name(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('@')
        && s.chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Search over one store's rows
#[derive(Clone)]
pub struct QueryEngine {
    backend: Arc<dyn KvBackend>,
    repo: RowRepository,
    tokenizer: Arc<dyn Tokenizer>,
}

impl QueryEngine {
    /// New engine with the default tokenizer
    pub fn new(backend: Arc<dyn KvBackend>, repo: RowRepository) -> Self {
        QueryEngine {
            backend,
            repo,
            tokenizer: Arc::new(SimpleTokenizer),
        }
    }

    /// Swap in a different tokenization strategy
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Evaluate `raw` against a store, streaming matching rows
    ///
    /// Store scoping errors surface here, before the stream exists.
    /// Mid-stream failures arrive as `Err` items; the consumer decides
    /// whether to keep reading.
    pub async fn search(
        &self,
        owner: &OwnerId,
        store_id: &StoreId,
        raw: &str,
    ) -> Result<RowStream> {
        let store = self.repo.catalog().get_store(owner, store_id).await?;
        let expr = QueryExpr::parse(raw);
        tracing::debug!(store_id = %store_id, query = ?expr, "search started");

        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.produce(store, expr, tx).await;
        });
        Ok(ReceiverStream::new(rx))
    }

    async fn produce(&self, store: StoreRecord, expr: QueryExpr, tx: mpsc::Sender<Result<Row>>) {
        let indexed = match &expr {
            QueryExpr::FieldEq { field, .. } | QueryExpr::FieldRange { field, .. } => store
                .schema
                .as_ref()
                .and_then(|s| s.field(field))
                .filter(|spec| spec.indexed)
                .map(|spec| spec.field_type),
            QueryExpr::Text(_) => None,
        };

        match (indexed, &expr) {
            (Some(field_type), QueryExpr::FieldEq { field, value }) => {
                let Some(term) = typed_term(field_type, value) else {
                    return; // unrepresentable literal matches nothing
                };
                let query = IndexQuery::Eq {
                    name: indexer::field_index(&store.store_id, field),
                    value: term,
                };
                self.stream_index_hits(&store, query, &tx).await;
            }
            (Some(field_type), QueryExpr::FieldRange { field, lo, hi }) => {
                let (Some(lo), Some(hi)) = (typed_term(field_type, lo), typed_term(field_type, hi))
                else {
                    return;
                };
                let query = IndexQuery::Range {
                    name: indexer::field_index(&store.store_id, field),
                    lo,
                    hi,
                };
                self.stream_index_hits(&store, query, &tx).await;
            }
            _ => self.stream_scan(&store, &expr, &tx).await,
        }
    }

    /// Index path: keys come straight from the secondary index
    async fn stream_index_hits(
        &self,
        store: &StoreRecord,
        query: IndexQuery,
        tx: &mpsc::Sender<Result<Row>>,
    ) {
        let mut hits = match self.backend.index_query(Bucket::Rows, &query).await {
            Ok(hits) => hits,
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        };
        hits.sort_by(|a, b| a.value.cmp(&b.value).then_with(|| a.key.cmp(&b.key)));
        self.emit_rows(store, hits, |_| true, tx).await;
    }

    /// Scan path: creation order, predicate applied per row
    async fn stream_scan(
        &self,
        store: &StoreRecord,
        expr: &QueryExpr,
        tx: &mpsc::Sender<Result<Row>>,
    ) {
        let hits = match self.repo.created_order_hits(&store.store_id).await {
            Ok(hits) => hits,
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        };
        let tokenizer = Arc::clone(&self.tokenizer);
        let expr = expr.clone();
        self.emit_rows(store, hits, move |row| matches(&tokenizer, &expr, row), tx)
            .await;
    }

    /// Fetch each hit, resolve siblings, filter, and push downstream
    ///
    /// Returns early as soon as the consumer hangs up.
    async fn emit_rows<F>(
        &self,
        store: &StoreRecord,
        hits: Vec<IndexHit>,
        keep: F,
        tx: &mpsc::Sender<Result<Row>>,
    ) where
        F: Fn(&Row) -> bool,
    {
        for hit in hits {
            let Some(row_id) = RowId::from_qualified(&store.store_id, &hit.key) else {
                continue;
            };
            match self.repo.get_row_in(store, &row_id).await {
                Ok(row) => {
                    if keep(&row) && tx.send(Ok(row)).await.is_err() {
                        return; // consumer canceled mid-stream
                    }
                }
                // Deleted between the index read and the fetch.
                Err(Error::RowNotFound(_)) => {}
                Err(err @ Error::UnresolvedConflict(_)) => {
                    // Policy failure on one row; the rest still stream.
                    if tx.send(Err(err)).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            }
        }
    }
}

/// Convert a query literal into an index term of the field's type
fn typed_term(field_type: FieldType, literal: &str) -> Option<IndexValue> {
    match field_type {
        FieldType::Number => literal.parse::<f64>().ok().map(IndexValue::Num),
        FieldType::String | FieldType::Timestamp => Some(IndexValue::Str(literal.to_string())),
        FieldType::Boolean => match literal {
            "true" | "false" => Some(IndexValue::Str(literal.to_string())),
            _ => None,
        },
    }
}

/// Predicate evaluation for the scan path
fn matches(tokenizer: &Arc<dyn Tokenizer>, expr: &QueryExpr, row: &Row) -> bool {
    match expr {
        QueryExpr::FieldEq { field, value } => row
            .data
            .get(field)
            .map(|v| value_matches(v, value))
            .unwrap_or(false),
        QueryExpr::FieldRange { field, lo, hi } => row
            .data
            .get(field)
            .map(|v| value_in_range(v, lo, hi))
            .unwrap_or(false),
        QueryExpr::Text(text) => {
            let wanted = tokenizer.tokens(text);
            if wanted.is_empty() {
                return true;
            }
            let mut have = Vec::new();
            collect_tokens(tokenizer, row.data.values(), &mut have);
            wanted.iter().all(|token| have.contains(token))
        }
    }
}

fn value_matches(value: &Value, literal: &str) -> bool {
    match value {
        Value::String(s) => s == literal,
        Value::Number(n) => literal
            .parse::<f64>()
            .map(|want| n.as_f64() == Some(want))
            .unwrap_or(false),
        Value::Bool(b) => literal == b.to_string(),
        Value::Array(items) => items.iter().any(|item| value_matches(item, literal)),
        _ => false,
    }
}

fn value_in_range(value: &Value, lo: &str, hi: &str) -> bool {
    match value {
        Value::Number(n) => match (lo.parse::<f64>(), hi.parse::<f64>(), n.as_f64()) {
            (Ok(lo), Ok(hi), Some(n)) => n >= lo && n <= hi,
            _ => false,
        },
        Value::String(s) => s.as_str() >= lo && s.as_str() <= hi,
        Value::Array(items) => items.iter().any(|item| value_in_range(item, lo, hi)),
        _ => false,
    }
}

fn collect_tokens<'a, I>(tokenizer: &Arc<dyn Tokenizer>, values: I, out: &mut Vec<String>)
where
    I: IntoIterator<Item = &'a Value>,
{
    for value in values {
        match value {
            Value::String(s) => out.extend(tokenizer.tokens(s)),
            Value::Array(items) => collect_tokens(tokenizer, items.iter(), out),
            Value::Object(map) => collect_tokens(tokenizer, map.values(), out),
            _ => {}
        }
    }
}
