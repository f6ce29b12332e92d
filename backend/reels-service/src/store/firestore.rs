//! Hosted document store client
//!
//! Talks to the Firestore REST API. Inserts and increments go through
//! `documents:commit` so the server clock and atomic transforms are applied
//! on the server side; reads use `get` and `runQuery`.

use super::{
    auto_id, CollectionPath, Direction, Document, DocumentStore, Fields, Filter, NewDocument,
    Query, StoreError,
};
use crate::config::{FirebaseConfig, HttpConfig};
use crate::domain::Identity;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

pub struct FirestoreStore {
    http: Client,
    base_url: String,
    /// `projects/{project}/databases/{database}/documents`
    documents_root: String,
    api_key: String,
    auth: watch::Receiver<Option<Identity>>,
}

impl FirestoreStore {
    pub fn new(
        firebase: &FirebaseConfig,
        http: &HttpConfig,
        auth: watch::Receiver<Option<Identity>>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(http.request_timeout_ms))
            .build()
            .map_err(|e| StoreError::Transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http: client,
            base_url: firebase.firestore_base_url.trim_end_matches('/').to_string(),
            documents_root: format!(
                "projects/{}/databases/{}/documents",
                firebase.project_id, firebase.database
            ),
            api_key: firebase.api_key.clone(),
            auth,
        })
    }

    fn document_name(&self, collection: &CollectionPath, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root, collection, id)
    }

    /// REST URL of one document; the id is percent-encoded as a path segment
    fn document_url(&self, collection: &CollectionPath, id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            self.documents_root,
            collection,
            urlencoding::encode(id)
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Attach the API key and the signed-in viewer's token
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = if self.api_key.is_empty() {
            request
        } else {
            request.query(&[("key", self.api_key.as_str())])
        };

        let token = self
            .auth
            .borrow()
            .as_ref()
            .and_then(|identity| identity.id_token().map(str::to_owned));
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::Unauthenticated);
        }

        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn commit(&self, writes: Vec<Value>) -> Result<(), StoreError> {
        let url = self.url(&format!("{}:commit", self.documents_root));
        self.send(self.http.post(url).json(&json!({ "writes": writes })))
            .await?;
        Ok(())
    }

    fn structured_query(&self, query: &Query) -> Value {
        let (_, collection_id) = query.collection.split_parent();
        let mut structured = Map::new();
        structured.insert("from".into(), json!([{ "collectionId": collection_id }]));

        let filters: Vec<Value> = query
            .filters
            .iter()
            .map(|filter| match filter {
                Filter::Eq { field, value } => json!({
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": encode_value(value),
                    }
                }),
                Filter::IdIn(ids) => {
                    let refs: Vec<Value> = ids
                        .iter()
                        .map(|id| {
                            json!({ "referenceValue": self.document_name(&query.collection, id) })
                        })
                        .collect();
                    json!({
                        "fieldFilter": {
                            "field": { "fieldPath": "__name__" },
                            "op": "IN",
                            "value": { "arrayValue": { "values": refs } },
                        }
                    })
                }
            })
            .collect();

        match filters.len() {
            0 => {}
            1 => {
                structured.insert("where".into(), filters.into_iter().next().unwrap_or_default());
            }
            _ => {
                structured.insert(
                    "where".into(),
                    json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
                );
            }
        }

        if let Some(order) = &query.order_by {
            let direction = match order.direction {
                Direction::Ascending => "ASCENDING",
                Direction::Descending => "DESCENDING",
            };
            structured.insert(
                "orderBy".into(),
                json!([{ "field": { "fieldPath": order.field }, "direction": direction }]),
            );
        }

        Value::Object(structured)
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn insert(
        &self,
        collection: &CollectionPath,
        doc: NewDocument,
    ) -> Result<String, StoreError> {
        let id = auto_id();
        let transforms: Vec<Value> = doc
            .server_timestamps
            .iter()
            .map(|field| json!({ "fieldPath": field, "setToServerValue": "REQUEST_TIME" }))
            .collect();

        let mut write = json!({
            "update": {
                "name": self.document_name(collection, &id),
                "fields": encode_fields(&doc.fields),
            },
            "currentDocument": { "exists": false },
        });
        if !transforms.is_empty() {
            write["updateTransforms"] = Value::Array(transforms);
        }

        self.commit(vec![write]).await?;
        debug!(collection = %collection, doc_id = %id, "document inserted");
        Ok(id)
    }

    async fn get(
        &self,
        collection: &CollectionPath,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let url = self.document_url(collection, id);
        match self.send(self.http.get(url)).await {
            Ok(response) => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                decode_document(&body).map(Some)
            }
            Err(StoreError::Rejected { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let parent = match query.collection.split_parent() {
            (Some(parent), _) => format!("{}/{}", self.documents_root, parent),
            (None, _) => self.documents_root.clone(),
        };
        let url = self.url(&format!("{}:runQuery", parent));
        let body = json!({ "structuredQuery": self.structured_query(query) });

        let response = self.send(self.http.post(url).json(&body)).await?;
        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        // Rows without a `document` only carry read metadata
        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(decode_document)
            .collect()
    }

    async fn increment(
        &self,
        collection: &CollectionPath,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<(), StoreError> {
        let write = json!({
            "transform": {
                "document": self.document_name(collection, id),
                "fieldTransforms": [{
                    "fieldPath": field,
                    "increment": { "integerValue": by.to_string() },
                }],
            },
            "currentDocument": { "exists": true },
        });
        self.commit(vec![write]).await
    }

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError> {
        let url = self.document_url(collection, id);
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
        .unwrap_or_else(|| body.to_string())
}

/// JSON value -> typed store value
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub(crate) fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Typed store value -> JSON value. Timestamps and references become strings.
pub(crate) fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let Some((kind, inner)) = value.as_object().and_then(|m| m.iter().next()) else {
        return Err(StoreError::Decode(format!("malformed value: {}", value)));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(inner.clone()),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| inner.as_i64())
            .map(Value::from)
            .ok_or_else(|| StoreError::Decode(format!("bad integer: {}", inner))),
        "doubleValue" => Ok(inner.clone()),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = match inner.get("values").and_then(Value::as_array) {
                Some(values) => values.iter().map(decode_value).collect::<Result<_, _>>()?,
                None => Vec::new(),
            };
            Ok(Value::Array(values))
        }
        "mapValue" => decode_fields(inner.get("fields")).map(Value::Object),
        other => Err(StoreError::Decode(format!("unsupported value type {}", other))),
    }
}

fn decode_fields(fields: Option<&Value>) -> Result<Fields, StoreError> {
    let mut out = Map::new();
    if let Some(fields) = fields.and_then(Value::as_object) {
        for (key, value) in fields {
            out.insert(key.clone(), decode_value(value)?);
        }
    }
    Ok(out)
}

pub(crate) fn decode_document(doc: &Value) -> Result<Document, StoreError> {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Decode("document without name".to_string()))?;
    let id = name.rsplit('/').next().unwrap_or(name);
    Ok(Document::new(id, decode_fields(doc.get("fields"))?))
}
