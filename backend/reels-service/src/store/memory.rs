//! In-process document store
//!
//! Mirrors the hosted store's observable behavior closely enough for offline
//! runs and tests: membership filters are capped, server timestamps are
//! strictly increasing per write, documents missing the order field are left
//! out of ordered queries, and increments fail on missing documents.

use super::{
    auto_id, CollectionPath, Direction, Document, DocumentStore, Fields, Filter, NewDocument,
    Query, StoreError, MEMBERSHIP_FILTER_LIMIT,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Fields>>,
    last_timestamp: Option<DateTime<Utc>>,
    query_log: Vec<Query>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    membership_limit: usize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_membership_limit(MEMBERSHIP_FILTER_LIMIT)
    }

    pub fn with_membership_limit(membership_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            membership_limit,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `get`/`query` fail with a transport error
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, AtomicOrdering::SeqCst);
    }

    /// Make every subsequent insert/increment/delete fail with a transport error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, AtomicOrdering::SeqCst);
    }

    /// Queries issued so far, oldest first
    pub fn query_log(&self) -> Vec<Query> {
        self.inner.lock().query_log.clone()
    }

    pub fn clear_query_log(&self) {
        self.inner.lock().query_log.clear();
    }

    /// Number of documents currently stored in `collection`
    pub fn count(&self, collection: &CollectionPath) -> usize {
        self.inner
            .lock()
            .collections
            .get(collection.as_str())
            .map_or(0, BTreeMap::len)
    }

    /// Insert a document under a caller-chosen id, bypassing server timestamps
    pub fn seed(&self, collection: &CollectionPath, id: &str, fields: Fields) {
        self.inner
            .lock()
            .collections
            .entry(collection.as_str().to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Transport("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Transport("simulated write failure".to_string()));
        }
        Ok(())
    }

    fn validate(&self, query: &Query) -> Result<(), StoreError> {
        for filter in &query.filters {
            if let Filter::IdIn(ids) = filter {
                if ids.is_empty() {
                    return Err(StoreError::InvalidQuery(
                        "membership filter needs at least one id".to_string(),
                    ));
                }
                if ids.len() > self.membership_limit {
                    return Err(StoreError::InvalidQuery(format!(
                        "membership filter supports up to {} ids, got {}",
                        self.membership_limit,
                        ids.len()
                    )));
                }
            }
        }
        if query.has_membership_filter()
            && query.filters.iter().filter(|f| matches!(f, Filter::IdIn(_))).count() > 1
        {
            return Err(StoreError::InvalidQuery(
                "only one membership filter per query".to_string(),
            ));
        }
        Ok(())
    }
}

impl Inner {
    /// Strictly increasing server clock
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }
}

fn matches(id: &str, fields: &Fields, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { field, value } => fields.get(field) == Some(value),
        Filter::IdIn(ids) => ids.iter().any(|candidate| candidate == id),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            // Timestamps of different precision do not sort as text
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(
        &self,
        collection: &CollectionPath,
        doc: NewDocument,
    ) -> Result<String, StoreError> {
        self.check_writes()?;

        let mut inner = self.inner.lock();
        let mut fields = doc.fields;
        if !doc.server_timestamps.is_empty() {
            let stamp = inner
                .next_timestamp()
                .to_rfc3339_opts(SecondsFormat::Micros, true);
            for field in doc.server_timestamps {
                fields.insert(field, Value::String(stamp.clone()));
            }
        }

        let id = auto_id();
        inner
            .collections
            .entry(collection.as_str().to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn get(
        &self,
        collection: &CollectionPath,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.check_reads()?;

        let inner = self.inner.lock();
        Ok(inner
            .collections
            .get(collection.as_str())
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.check_reads()?;
        self.validate(query)?;

        let mut inner = self.inner.lock();
        inner.query_log.push(query.clone());

        let Some(docs) = inner.collections.get(query.collection.as_str()) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<Document> = docs
            .iter()
            .filter(|(id, fields)| query.filters.iter().all(|f| matches(id, fields, f)))
            .filter(|(_, fields)| {
                query
                    .order_by
                    .as_ref()
                    .map_or(true, |order| fields.contains_key(&order.field))
            })
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect();

        if let Some(order) = &query.order_by {
            results.sort_by(|a, b| {
                let ordering = compare_values(&a.fields[&order.field], &b.fields[&order.field]);
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        Ok(results)
    }

    async fn increment(
        &self,
        collection: &CollectionPath,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<(), StoreError> {
        self.check_writes()?;

        let mut inner = self.inner.lock();
        let fields = inner
            .collections
            .get_mut(collection.as_str())
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", collection, id)))?;

        let current = fields.get(field).and_then(Value::as_i64).unwrap_or(0);
        fields.insert(field.to_string(), Value::from(current + by));
        Ok(())
    }

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError> {
        self.check_writes()?;

        let mut inner = self.inner.lock();
        if let Some(docs) = inner.collections.get_mut(collection.as_str()) {
            docs.remove(id);
        }
        Ok(())
    }
}
