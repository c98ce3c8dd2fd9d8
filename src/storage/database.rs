//! Capability set of a document database
//!
//! Every operation the stream server can route to a database is a method on
//! the [`Database`] trait. Request and response shapes follow the JSON that
//! travels over the wire, so they derive serde in both directions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::document::{generate_id, DELETED_FIELD, ID_FIELD, REV_FIELD};
use crate::error::{DbError, DbResult};

/// Shared handle to a database instance
pub type DbHandle = Arc<dyn Database>;

/// Options accepted by `bulkDocs`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkDocsOptions {
    /// `false` stores the supplied revisions as-is (replication mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_edits: Option<bool>,
}

impl BulkDocsOptions {
    pub fn new_edits(&self) -> bool {
        self.new_edits.unwrap_or(true)
    }
}

/// Successful single-document write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    pub ok: bool,
    pub id: String,
    pub rev: String,
}

impl WriteResult {
    pub fn new(id: String, rev: String) -> Self {
        Self { ok: true, id, rev }
    }
}

/// Failed single-document write inside a bulk result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error: String,
    pub reason: String,
}

impl WriteFailure {
    pub fn new(id: Option<String>, error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            error: error.into(),
            reason: reason.into(),
        }
    }

    pub fn from_error(id: Option<String>, err: &DbError) -> Self {
        Self::new(id, err.name(), err.reason())
    }

    /// Map the failure back to the error a single-document write reports
    pub fn into_error(self) -> DbError {
        match self.error.as_str() {
            "conflict" => DbError::Conflict(self.reason),
            "not_found" => DbError::NotFound(self.reason),
            "bad_request" => DbError::BadRequest(self.reason),
            "doc_validation" => DbError::DocValidation(self.reason),
            _ => DbError::Internal(self.reason),
        }
    }
}

/// Per-document outcome of `bulkDocs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BulkDocResult {
    Ok(WriteResult),
    Error(WriteFailure),
}

impl BulkDocResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, BulkDocResult::Ok(_))
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            BulkDocResult::Ok(r) => Some(&r.id),
            BulkDocResult::Error(f) => f.id.as_deref(),
        }
    }
}

/// Options accepted by `get`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetOptions {
    /// Fetch a specific revision instead of the winner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
}

/// Options accepted by `allDocs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllDocsOptions {
    pub include_docs: bool,
    #[serde(alias = "start_key", skip_serializing_if = "Option::is_none")]
    pub startkey: Option<String>,
    #[serde(alias = "end_key", skip_serializing_if = "Option::is_none")]
    pub endkey: Option<String>,
    pub inclusive_end: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub skip: usize,
    pub descending: bool,
}

impl Default for AllDocsOptions {
    fn default() -> Self {
        Self {
            include_docs: false,
            startkey: None,
            endkey: None,
            inclusive_end: true,
            keys: None,
            limit: None,
            skip: 0,
            descending: false,
        }
    }
}

impl AllDocsOptions {
    /// Whether `id` falls inside the requested key range.
    ///
    /// In descending order `startkey` is the upper bound.
    pub fn in_range(&self, id: &str) -> bool {
        let id = id.to_string();
        if self.descending {
            if self.startkey.as_ref().is_some_and(|start| id > *start) {
                return false;
            }
            match &self.endkey {
                Some(end) if self.inclusive_end => id >= *end,
                Some(end) => id > *end,
                None => true,
            }
        } else {
            if self.startkey.as_ref().is_some_and(|start| id < *start) {
                return false;
            }
            match &self.endkey {
                Some(end) if self.inclusive_end => id <= *end,
                Some(end) => id < *end,
                None => true,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowValue {
    pub rev: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

/// One row of an `allDocs` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllDocsRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RowValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AllDocsRow {
    /// Row for a key that names no document
    pub fn missing(key: &str) -> Self {
        Self {
            id: None,
            key: key.to_string(),
            value: None,
            doc: None,
            error: Some("not_found".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllDocsResponse {
    pub total_rows: usize,
    pub offset: usize,
    pub rows: Vec<AllDocsRow>,
}

/// Options accepted by `changes`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangesOptions {
    pub since: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub include_docs: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRev {
    pub rev: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub seq: u64,
    pub changes: Vec<ChangeRev>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesResponse {
    pub results: Vec<Change>,
    pub last_seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub db_name: String,
    pub doc_count: usize,
    pub update_seq: u64,
}

/// Operations a database exposes to the stream server.
///
/// `put`, `post` and `remove` have default implementations on top of
/// `bulk_docs`.
#[async_trait]
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// Write several documents; per-document failures are reported inside
    /// the returned list, not as an error.
    async fn bulk_docs(
        &self,
        docs: Vec<Value>,
        options: BulkDocsOptions,
    ) -> DbResult<Vec<BulkDocResult>>;

    async fn get(&self, id: &str, options: GetOptions) -> DbResult<Value>;

    async fn all_docs(&self, options: AllDocsOptions) -> DbResult<AllDocsResponse>;

    async fn info(&self) -> DbResult<DatabaseInfo>;

    async fn changes(&self, options: ChangesOptions) -> DbResult<ChangesResponse>;

    /// Create or update a document that carries its own `_id`
    async fn put(&self, doc: Value) -> DbResult<WriteResult> {
        if doc.get(ID_FIELD).is_none() {
            return Err(DbError::BadRequest("_id is required for puts".to_string()));
        }
        single_write(self.bulk_docs(vec![doc], BulkDocsOptions::default()).await?)
    }

    /// Create a document under a generated id unless one is supplied
    async fn post(&self, mut doc: Value) -> DbResult<WriteResult> {
        let Some(obj) = doc.as_object_mut() else {
            return Err(DbError::BadRequest(
                "Document must be a JSON object".to_string(),
            ));
        };
        if !obj.contains_key(ID_FIELD) {
            obj.insert(ID_FIELD.to_string(), Value::String(generate_id()));
        }
        single_write(self.bulk_docs(vec![doc], BulkDocsOptions::default()).await?)
    }

    /// Write a tombstone over revision `rev` of document `id`
    async fn remove(&self, id: &str, rev: &str) -> DbResult<WriteResult> {
        let mut tombstone = serde_json::Map::new();
        tombstone.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        tombstone.insert(REV_FIELD.to_string(), Value::String(rev.to_string()));
        tombstone.insert(DELETED_FIELD.to_string(), Value::Bool(true));
        single_write(
            self.bulk_docs(vec![Value::Object(tombstone)], BulkDocsOptions::default())
                .await?,
        )
    }
}

fn single_write(mut results: Vec<BulkDocResult>) -> DbResult<WriteResult> {
    match results.pop() {
        Some(BulkDocResult::Ok(result)) => Ok(result),
        Some(BulkDocResult::Error(failure)) => Err(failure.into_error()),
        None => Err(DbError::Internal("bulk write returned no result".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bulk_result_serialization() {
        let ok = BulkDocResult::Ok(WriteResult::new("doc1".into(), "1-abc".into()));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"ok": true, "id": "doc1", "rev": "1-abc"})
        );

        let failure = BulkDocResult::Error(WriteFailure::new(
            Some("doc2".into()),
            "forbidden",
            "read-only db",
        ));
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"id": "doc2", "error": "forbidden", "reason": "read-only db"})
        );
    }

    #[test]
    fn test_bulk_result_deserialization() {
        let parsed: Vec<BulkDocResult> = serde_json::from_value(json!([
            {"ok": true, "id": "a", "rev": "1-x"},
            {"id": "b", "error": "conflict", "reason": "Document update conflict"}
        ]))
        .unwrap();

        assert!(parsed[0].is_ok());
        assert!(!parsed[1].is_ok());
        assert_eq!(parsed[1].id(), Some("b"));
    }

    #[test]
    fn test_write_failure_into_error() {
        let failure = WriteFailure::new(None, "conflict", "Document update conflict");
        assert_eq!(
            failure.into_error(),
            DbError::Conflict("Document update conflict".to_string())
        );
    }

    #[test]
    fn test_all_docs_options_defaults_and_aliases() {
        let opts: AllDocsOptions =
            serde_json::from_value(json!({"start_key": "a", "end_key": "c"})).unwrap();
        assert_eq!(opts.startkey.as_deref(), Some("a"));
        assert_eq!(opts.endkey.as_deref(), Some("c"));
        assert!(opts.inclusive_end);
        assert!(!opts.include_docs);
    }

    #[test]
    fn test_all_docs_range() {
        let opts = AllDocsOptions {
            startkey: Some("b".into()),
            endkey: Some("d".into()),
            ..Default::default()
        };
        assert!(!opts.in_range("a"));
        assert!(opts.in_range("b"));
        assert!(opts.in_range("d"));
        assert!(!opts.in_range("e"));

        let exclusive = AllDocsOptions {
            inclusive_end: false,
            ..opts.clone()
        };
        assert!(!exclusive.in_range("d"));

        let descending = AllDocsOptions {
            startkey: Some("d".into()),
            endkey: Some("b".into()),
            descending: true,
            ..Default::default()
        };
        assert!(descending.in_range("c"));
        assert!(descending.in_range("b"));
        assert!(!descending.in_range("e"));
        assert!(!descending.in_range("a"));
    }
}
