/// Document store access
///
/// The hosted document database is reached through the [`DocumentStore`]
/// trait. Two implementations exist:
/// - `firestore`: REST client for the hosted store
/// - `memory`: in-process store with the same query limits, used offline and in tests
///
/// Documents are untyped JSON maps; repositories decode them into domain models.
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// Largest id list the store accepts in a single membership filter
pub const MEMBERSHIP_FILTER_LIMIT: usize = 10;

/// Field map of a stored document
pub type Fields = serde_json::Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("failed to decode document: {0}")]
    Decode(String),

    #[error("request not authorized")]
    Unauthenticated,
}

/// Slash-separated collection path, e.g. `reels` or `reels/{id}/comments`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Subcollection scoped under one document of this collection
    pub fn sub(&self, doc_id: &str, name: &str) -> Self {
        Self(format!("{}/{}/{}", self.0, doc_id, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the parent document (`None` for root collections) and the
    /// last collection id.
    pub fn split_parent(&self) -> (Option<&str>, &str) {
        match self.0.rsplit_once('/') {
            Some((parent, id)) => (Some(parent), id),
            None => (None, &self.0),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Decode the field map into `T`; the document id is returned alongside
    pub fn decode<T: DeserializeOwned>(self) -> Result<(String, T), StoreError> {
        let value = serde_json::from_value(Value::Object(self.fields))
            .map_err(|e| StoreError::Decode(format!("{}: {}", self.id, e)))?;
        Ok((self.id, value))
    }
}

/// Document to insert, with the fields the store must stamp with its own clock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDocument {
    pub fields: Fields,
    pub server_timestamps: Vec<String>,
}

impl NewDocument {
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            server_timestamps: Vec::new(),
        }
    }

    pub fn with_server_timestamp(mut self, field: &str) -> Self {
        self.server_timestamps.push(field.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field == value`
    Eq { field: String, value: Value },
    /// Document id is one of the listed ids (capped at the membership limit)
    IdIn(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn where_id_in<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters
            .push(Filter::IdIn(ids.into_iter().map(Into::into).collect()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn has_membership_filter(&self) -> bool {
        self.filters.iter().any(|f| matches!(f, Filter::IdIn(_)))
    }
}

/// Remote document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document with a store-assigned id
    async fn insert(&self, collection: &CollectionPath, doc: NewDocument)
        -> Result<String, StoreError>;

    async fn get(&self, collection: &CollectionPath, id: &str)
        -> Result<Option<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Atomically add `by` to a numeric field of an existing document
    async fn increment(
        &self,
        collection: &CollectionPath,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<(), StoreError>;

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError>;
}

/// 20-character random document id, same alphabet as the hosted store
pub(crate) fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

/// Serialize a model into a field map
pub(crate) fn to_fields<T: serde::Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::Decode(format!(
            "expected an object, got {}",
            other
        ))),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}
