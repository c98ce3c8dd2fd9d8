//! In-memory document database
//!
//! Keeps the winning revision of every document in an ordered map so that
//! `allDocs` ranges come out sorted by id.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::database::{
    AllDocsOptions, AllDocsResponse, AllDocsRow, BulkDocResult, BulkDocsOptions, Change,
    ChangeRev, ChangesOptions, ChangesResponse, Database, DatabaseInfo, DbHandle, GetOptions,
    RowValue, WriteFailure, WriteResult,
};
use super::document::{generate_id, Document, DocumentWrite, Revision, ID_FIELD};
use crate::error::{DbError, DbResult};

const CONFLICT_REASON: &str = "Document update conflict";

#[derive(Debug, Default)]
struct MemoryState {
    docs: BTreeMap<String, Document>,
    update_seq: u64,
}

/// Document database held entirely in memory
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    state: RwLock<MemoryState>,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Create a database wrapped in a shareable handle
    pub fn handle(name: impl Into<String>) -> DbHandle {
        Arc::new(Self::new(name))
    }

    fn write_one(state: &mut MemoryState, value: Value, new_edits: bool) -> DbResult<WriteResult> {
        let write = DocumentWrite::from_value(value)?;

        let id = match write.id {
            Some(id) => id,
            None if new_edits => generate_id(),
            None => {
                return Err(DbError::BadRequest(
                    "_id is required when new_edits is false".to_string(),
                ))
            }
        };

        let existing = state.docs.get(&id).map(|doc| (doc.rev.clone(), doc.deleted));

        let rev = if new_edits {
            let parent = match (existing, write.rev.as_deref()) {
                (None, None) => None,
                (None, Some(_)) => return Err(DbError::Conflict(CONFLICT_REASON.to_string())),
                // Recreating a deleted document extends the tombstone
                (Some((rev, true)), None) => Some(rev),
                (Some(_), None) => return Err(DbError::Conflict(CONFLICT_REASON.to_string())),
                (Some((current, _)), Some(given)) => {
                    let given = Revision::parse(given)?;
                    if given != current {
                        return Err(DbError::Conflict(CONFLICT_REASON.to_string()));
                    }
                    Some(given)
                }
            };
            Revision::next(parent.as_ref(), write.deleted, &write.body)
        } else {
            let given = write.rev.as_deref().ok_or_else(|| {
                DbError::BadRequest("_rev is required when new_edits is false".to_string())
            })?;
            let given = Revision::parse(given)?;
            // Only a higher revision replaces the stored winner
            if let Some((current, _)) = existing {
                if current >= given {
                    return Ok(WriteResult::new(id, given.to_string()));
                }
            }
            given
        };

        state.update_seq += 1;
        let result = WriteResult::new(id.clone(), rev.to_string());
        state.docs.insert(
            id.clone(),
            Document {
                id,
                rev,
                deleted: write.deleted,
                seq: state.update_seq,
                body: write.body,
            },
        );
        Ok(result)
    }

    fn row_for(doc: &Document, include_docs: bool) -> AllDocsRow {
        AllDocsRow {
            id: Some(doc.id.clone()),
            key: doc.id.clone(),
            value: Some(RowValue {
                rev: doc.rev.to_string(),
                deleted: doc.deleted,
            }),
            doc: (include_docs && !doc.deleted).then(|| doc.to_value()),
            error: None,
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn bulk_docs(
        &self,
        docs: Vec<Value>,
        options: BulkDocsOptions,
    ) -> DbResult<Vec<BulkDocResult>> {
        let new_edits = options.new_edits();
        let mut state = self.state.write();

        let results = docs
            .into_iter()
            .map(|doc| {
                let id_hint = doc
                    .get(ID_FIELD)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match Self::write_one(&mut state, doc, new_edits) {
                    Ok(result) => BulkDocResult::Ok(result),
                    Err(e) => BulkDocResult::Error(WriteFailure::from_error(id_hint, &e)),
                }
            })
            .collect();

        Ok(results)
    }

    async fn get(&self, id: &str, options: GetOptions) -> DbResult<Value> {
        let state = self.state.read();
        let doc = state
            .docs
            .get(id)
            .ok_or_else(|| DbError::NotFound("missing".to_string()))?;

        match options.rev {
            Some(rev) if rev != doc.rev.to_string() => {
                Err(DbError::NotFound("missing".to_string()))
            }
            Some(_) => Ok(doc.to_value()),
            None if doc.deleted => Err(DbError::NotFound("deleted".to_string())),
            None => Ok(doc.to_value()),
        }
    }

    async fn all_docs(&self, options: AllDocsOptions) -> DbResult<AllDocsResponse> {
        let state = self.state.read();
        let total_rows = state.docs.values().filter(|d| !d.deleted).count();
        let limit = options.limit.unwrap_or(usize::MAX);

        let rows = if let Some(keys) = &options.keys {
            keys.iter()
                .map(|key| match state.docs.get(key) {
                    Some(doc) => Self::row_for(doc, options.include_docs),
                    None => AllDocsRow::missing(key),
                })
                .skip(options.skip)
                .take(limit)
                .collect()
        } else {
            let docs: Box<dyn Iterator<Item = &Document>> = if options.descending {
                Box::new(state.docs.values().rev())
            } else {
                Box::new(state.docs.values())
            };
            docs.filter(|doc| !doc.deleted && options.in_range(&doc.id))
                .skip(options.skip)
                .take(limit)
                .map(|doc| Self::row_for(doc, options.include_docs))
                .collect()
        };

        Ok(AllDocsResponse {
            total_rows,
            offset: options.skip,
            rows,
        })
    }

    async fn info(&self) -> DbResult<DatabaseInfo> {
        let state = self.state.read();
        Ok(DatabaseInfo {
            db_name: self.name.clone(),
            doc_count: state.docs.values().filter(|d| !d.deleted).count(),
            update_seq: state.update_seq,
        })
    }

    async fn changes(&self, options: ChangesOptions) -> DbResult<ChangesResponse> {
        let state = self.state.read();

        let mut changed: Vec<&Document> = state
            .docs
            .values()
            .filter(|doc| doc.seq > options.since)
            .collect();
        changed.sort_by_key(|doc| doc.seq);

        let results: Vec<Change> = changed
            .into_iter()
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|doc| Change {
                id: doc.id.clone(),
                seq: doc.seq,
                changes: vec![ChangeRev {
                    rev: doc.rev.to_string(),
                }],
                deleted: doc.deleted,
                doc: options.include_docs.then(|| doc.to_value()),
            })
            .collect();

        let last_seq = results.last().map_or(options.since, |c| c.seq);
        Ok(ChangesResponse { results, last_seq })
    }
}
