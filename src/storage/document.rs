use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

pub const ID_FIELD: &str = "_id";
pub const REV_FIELD: &str = "_rev";
pub const DELETED_FIELD: &str = "_deleted";

/// Prefixes allowed for ids that start with an underscore
const RESERVED_ID_PREFIXES: [&str; 2] = ["_design/", "_local/"];

/// Document revision in the `<generation>-<hash>` form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision {
    pub generation: u64,
    pub hash: String,
}

impl Revision {
    /// Parse a revision string such as `1-967a00dff5e02add41819138abb3284d`
    pub fn parse(rev: &str) -> DbResult<Self> {
        let (generation, hash) = rev
            .split_once('-')
            .ok_or_else(|| DbError::InvalidRev(rev.to_string()))?;
        let generation: u64 = generation
            .parse()
            .map_err(|_| DbError::InvalidRev(rev.to_string()))?;
        if generation == 0 || hash.is_empty() {
            return Err(DbError::InvalidRev(rev.to_string()));
        }
        Ok(Self {
            generation,
            hash: hash.to_string(),
        })
    }

    /// Compute the revision that follows `prev` for the given content.
    ///
    /// The hash covers the previous revision, the deletion flag and the body,
    /// so identical edits on the same parent produce identical revisions.
    pub fn next(prev: Option<&Revision>, deleted: bool, body: &Map<String, Value>) -> Self {
        let mut input = Vec::new();
        if let Some(prev) = prev {
            input.extend_from_slice(prev.to_string().as_bytes());
        }
        input.push(u8::from(deleted));
        input.extend_from_slice(&serde_json::to_vec(body).unwrap_or_default());

        Self {
            generation: prev.map_or(1, |p| p.generation + 1),
            hash: format!("{:x}", md5::compute(&input)),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.hash)
    }
}

/// A document submitted for writing, split into reserved members and body
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentWrite {
    pub id: Option<String>,
    pub rev: Option<String>,
    pub deleted: bool,
    pub body: Map<String, Value>,
}

impl DocumentWrite {
    /// Validate a raw JSON document and extract its reserved members
    pub fn from_value(value: Value) -> DbResult<Self> {
        let Value::Object(mut body) = value else {
            return Err(DbError::BadRequest(
                "Document must be a JSON object".to_string(),
            ));
        };

        let id = match body.remove(ID_FIELD) {
            None => None,
            Some(Value::String(id)) => {
                validate_id(&id)?;
                Some(id)
            }
            Some(_) => {
                return Err(DbError::BadRequest("_id field must contain a string".to_string()))
            }
        };

        let rev = match body.remove(REV_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(rev)) => Some(rev),
            Some(other) => return Err(DbError::InvalidRev(other.to_string())),
        };

        let deleted = match body.remove(DELETED_FIELD) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => flag,
            Some(_) => {
                return Err(DbError::DocValidation(
                    "_deleted must be a boolean".to_string(),
                ))
            }
        };

        if let Some(bad) = body.keys().find(|k| k.starts_with('_')) {
            return Err(DbError::DocValidation(format!(
                "Bad special document member: {}",
                bad
            )));
        }

        Ok(Self {
            id,
            rev,
            deleted,
            body,
        })
    }
}

/// Winning revision of a stored document
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub rev: Revision,
    pub deleted: bool,
    /// Update sequence of the write that produced this revision
    pub seq: u64,
    pub body: Map<String, Value>,
}

impl Document {
    /// Convert to JSON including `_id`, `_rev` and, for tombstones, `_deleted`
    pub fn to_value(&self) -> Value {
        let mut obj = Map::with_capacity(self.body.len() + 3);
        obj.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        obj.insert(REV_FIELD.to_string(), Value::String(self.rev.to_string()));
        if self.deleted {
            obj.insert(DELETED_FIELD.to_string(), Value::Bool(true));
        }
        for (k, v) in &self.body {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }
}

/// Reject empty ids and underscore ids outside the reserved namespaces
pub fn validate_id(id: &str) -> DbResult<()> {
    if id.is_empty() {
        return Err(DbError::BadRequest("_id must not be empty".to_string()));
    }
    if id.starts_with('_') && !RESERVED_ID_PREFIXES.iter().any(|p| id.starts_with(p)) {
        return Err(DbError::BadRequest(
            "Only reserved document ids may start with underscore.".to_string(),
        ));
    }
    Ok(())
}

/// Generate a fresh document id
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_revision_parse() {
        let rev = Revision::parse("3-abcdef").unwrap();
        assert_eq!(rev.generation, 3);
        assert_eq!(rev.hash, "abcdef");
        assert_eq!(rev.to_string(), "3-abcdef");

        assert!(Revision::parse("abc").is_err());
        assert!(Revision::parse("0-abc").is_err());
        assert!(Revision::parse("x-abc").is_err());
        assert!(Revision::parse("2-").is_err());
    }

    #[test]
    fn test_revision_next_is_deterministic() {
        let body = json!({"name": "Alice"}).as_object().cloned().unwrap();
        let first = Revision::next(None, false, &body);
        assert_eq!(first.generation, 1);
        assert_eq!(first.hash.len(), 32);
        assert_eq!(first, Revision::next(None, false, &body));

        let second = Revision::next(Some(&first), false, &body);
        assert_eq!(second.generation, 2);
        assert_ne!(second.hash, first.hash);

        let tombstone = Revision::next(Some(&first), true, &body);
        assert_ne!(tombstone.hash, second.hash);
    }

    #[test]
    fn test_revision_ordering() {
        let a = Revision::parse("1-ffff").unwrap();
        let b = Revision::parse("2-0000").unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_document_write_extracts_reserved_members() {
        let write = DocumentWrite::from_value(json!({
            "_id": "doc1",
            "_rev": "1-abc",
            "_deleted": true,
            "title": "hello"
        }))
        .unwrap();

        assert_eq!(write.id.as_deref(), Some("doc1"));
        assert_eq!(write.rev.as_deref(), Some("1-abc"));
        assert!(write.deleted);
        assert_eq!(write.body.len(), 1);
        assert_eq!(write.body["title"], "hello");
    }

    #[test]
    fn test_document_write_rejects_bad_input() {
        assert!(matches!(
            DocumentWrite::from_value(json!([1, 2])),
            Err(DbError::BadRequest(_))
        ));
        assert!(matches!(
            DocumentWrite::from_value(json!({"_id": 5})),
            Err(DbError::BadRequest(_))
        ));
        assert!(matches!(
            DocumentWrite::from_value(json!({"_foo": 1})),
            Err(DbError::DocValidation(_))
        ));
        assert!(matches!(
            DocumentWrite::from_value(json!({"_id": "_secret"})),
            Err(DbError::BadRequest(_))
        ));
    }

    #[test]
    fn test_reserved_ids_allowed() {
        assert!(validate_id("_design/app").is_ok());
        assert!(validate_id("_local/checkpoint").is_ok());
        assert!(validate_id("").is_err());
    }

    #[test]
    fn test_document_to_value() {
        let doc = Document {
            id: "doc1".to_string(),
            rev: Revision::parse("1-abc").unwrap(),
            deleted: false,
            seq: 1,
            body: json!({"n": 1}).as_object().cloned().unwrap(),
        };
        assert_eq!(doc.to_value(), json!({"_id": "doc1", "_rev": "1-abc", "n": 1}));
    }

    #[test]
    fn test_generate_id_is_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
