//! Built-in handlers: decode the argument list, call the database, encode
//! the result.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::driver::protocol::{Method, RpcError};
use crate::driver::wrapper::{handler_fn, CallContext, Handler};
use crate::storage::{AllDocsOptions, BulkDocsOptions, ChangesOptions, GetOptions};

/// Handler calling the database method of the same name
pub fn default_handler(method: Method) -> Handler {
    match method {
        Method::BulkDocs => handler_fn(handle_bulk_docs),
        Method::Get => handler_fn(handle_get),
        Method::AllDocs => handler_fn(handle_all_docs),
        Method::Put => handler_fn(handle_put),
        Method::Post => handler_fn(handle_post),
        Method::Remove => handler_fn(handle_remove),
        Method::Info => handler_fn(handle_info),
        Method::Changes => handler_fn(handle_changes),
    }
}

/// Options argument at `index`; missing or `null` means defaults
fn options_arg<T: DeserializeOwned + Default>(args: &[Value], index: usize) -> Result<T, RpcError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| RpcError::bad_request(format!("Invalid options: {}", e))),
    }
}

fn string_arg(args: &[Value], index: usize, what: &str) -> Result<String, RpcError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(RpcError::bad_request(format!("{} must be a string", what))),
    }
}

fn document_arg(args: &[Value], index: usize) -> Result<Value, RpcError> {
    match args.get(index) {
        Some(doc @ Value::Object(_)) => Ok(doc.clone()),
        _ => Err(RpcError::bad_request("Document must be a JSON object")),
    }
}

/// Split `bulkDocs` arguments into documents and options.
///
/// The first argument is either `{docs: [...], new_edits?}` or a bare array of
/// documents. An explicit options argument takes precedence over
/// `new_edits` in the first one.
pub fn parse_bulk_docs_args(args: &[Value]) -> Result<(Vec<Value>, BulkDocsOptions), RpcError> {
    let mut options: BulkDocsOptions = options_arg(args, 1)?;

    let docs = match args.first() {
        Some(Value::Array(docs)) => docs.clone(),
        Some(Value::Object(request)) => {
            let Some(Value::Array(docs)) = request.get("docs") else {
                return Err(RpcError::bad_request("Missing JSON list of 'docs'"));
            };
            if options.new_edits.is_none() {
                options.new_edits = request.get("new_edits").and_then(Value::as_bool);
            }
            docs.clone()
        }
        _ => return Err(RpcError::bad_request("Missing JSON list of 'docs'")),
    };

    Ok((docs, options))
}

async fn handle_bulk_docs(ctx: CallContext, args: Vec<Value>) -> Result<Value, RpcError> {
    let (docs, options) = parse_bulk_docs_args(&args)?;
    let results = ctx.db.bulk_docs(docs, options).await?;
    Ok(serde_json::to_value(results)?)
}

async fn handle_get(ctx: CallContext, args: Vec<Value>) -> Result<Value, RpcError> {
    let id = string_arg(&args, 0, "Document id")?;
    let options: GetOptions = options_arg(&args, 1)?;
    Ok(ctx.db.get(&id, options).await?)
}

async fn handle_all_docs(ctx: CallContext, args: Vec<Value>) -> Result<Value, RpcError> {
    let options: AllDocsOptions = options_arg(&args, 0)?;
    let response = ctx.db.all_docs(options).await?;
    Ok(serde_json::to_value(response)?)
}

async fn handle_put(ctx: CallContext, args: Vec<Value>) -> Result<Value, RpcError> {
    let doc = document_arg(&args, 0)?;
    let result = ctx.db.put(doc).await?;
    Ok(serde_json::to_value(result)?)
}

async fn handle_post(ctx: CallContext, args: Vec<Value>) -> Result<Value, RpcError> {
    let doc = document_arg(&args, 0)?;
    let result = ctx.db.post(doc).await?;
    Ok(serde_json::to_value(result)?)
}

/// `remove(doc)` or `remove(docId, rev)`
async fn handle_remove(ctx: CallContext, args: Vec<Value>) -> Result<Value, RpcError> {
    let (id, rev) = match args.first() {
        Some(Value::Object(doc)) => {
            let id = doc.get("_id").and_then(Value::as_str);
            let rev = doc.get("_rev").and_then(Value::as_str);
            match (id, rev) {
                (Some(id), Some(rev)) => (id.to_string(), rev.to_string()),
                _ => return Err(RpcError::bad_request("Document must have _id and _rev")),
            }
        }
        Some(Value::String(id)) => (id.clone(), string_arg(&args, 1, "Revision")?),
        _ => return Err(RpcError::bad_request("Document or id required")),
    };

    let result = ctx.db.remove(&id, &rev).await?;
    Ok(serde_json::to_value(result)?)
}

async fn handle_info(ctx: CallContext, _args: Vec<Value>) -> Result<Value, RpcError> {
    let info = ctx.db.info().await?;
    Ok(serde_json::to_value(info)?)
}

async fn handle_changes(ctx: CallContext, args: Vec<Value>) -> Result<Value, RpcError> {
    let options: ChangesOptions = options_arg(&args, 0)?;
    let changes = ctx.db.changes(options).await?;
    Ok(serde_json::to_value(changes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::multiplex::StreamInfo;
    use crate::storage::MemoryDatabase;
    use serde_json::json;
    use std::sync::Arc;

    fn context(method: Method) -> CallContext {
        CallContext {
            db: MemoryDatabase::handle("testdb"),
            database: "testdb".to_string(),
            method: method.as_str().to_string(),
            seq: 0,
            stream: Arc::new(StreamInfo::new(1, "testdb")),
        }
    }

    async fn call(ctx: &CallContext, method: Method, args: Value) -> Result<Value, RpcError> {
        let args = match args {
            Value::Array(args) => args,
            other => panic!("args must be an array, got {}", other),
        };
        default_handler(method)(ctx.clone(), args).await
    }

    #[test]
    fn test_parse_bulk_docs_args_shapes() {
        let (docs, opts) =
            parse_bulk_docs_args(&[json!({"docs": [{"_id": "a"}]}), json!({})]).unwrap();
        assert_eq!(docs, vec![json!({"_id": "a"})]);
        assert!(opts.new_edits());

        let (docs, _) = parse_bulk_docs_args(&[json!([{"_id": "a"}, {"_id": "b"}])]).unwrap();
        assert_eq!(docs.len(), 2);

        let (_, opts) =
            parse_bulk_docs_args(&[json!({"docs": [], "new_edits": false})]).unwrap();
        assert!(!opts.new_edits());

        let (_, opts) = parse_bulk_docs_args(&[
            json!({"docs": [], "new_edits": false}),
            json!({"new_edits": true}),
        ])
        .unwrap();
        assert!(opts.new_edits());

        assert!(parse_bulk_docs_args(&[]).is_err());
        assert!(parse_bulk_docs_args(&[json!({"documents": []})]).is_err());
        assert!(parse_bulk_docs_args(&[json!({"docs": []}), json!("fast")]).is_err());
    }

    #[tokio::test]
    async fn test_bulk_docs_then_get() {
        let ctx = context(Method::BulkDocs);
        let results = call(
            &ctx,
            Method::BulkDocs,
            json!([{"docs": [{"_id": "doc1", "n": 1}]}, {}]),
        )
        .await
        .unwrap();
        assert_eq!(results[0]["ok"], true);
        assert_eq!(results[0]["id"], "doc1");

        let doc = call(&ctx, Method::Get, json!(["doc1"])).await.unwrap();
        assert_eq!(doc["n"], 1);

        let err = call(&ctx, Method::Get, json!(["nope"])).await.unwrap_err();
        assert_eq!(err, RpcError::new(404, "not_found", "missing"));

        let err = call(&ctx, Method::Get, json!([42])).await.unwrap_err();
        assert_eq!(err.error, "bad_request");
    }

    #[tokio::test]
    async fn test_put_post_remove() {
        let ctx = context(Method::Put);
        let put = call(&ctx, Method::Put, json!([{"_id": "a", "v": 1}, {}]))
            .await
            .unwrap();
        let rev = put["rev"].as_str().unwrap().to_string();

        let conflict = call(&ctx, Method::Put, json!([{"_id": "a"}])).await.unwrap_err();
        assert_eq!(conflict.status, 409);

        let posted = call(&ctx, Method::Post, json!([{"v": 2}])).await.unwrap();
        assert_eq!(posted["ok"], true);

        let removed = call(&ctx, Method::Remove, json!(["a", rev])).await.unwrap();
        assert_eq!(removed["ok"], true);

        let posted_id = posted["id"].clone();
        let posted_rev = posted["rev"].clone();
        let removed = call(
            &ctx,
            Method::Remove,
            json!([{"_id": posted_id, "_rev": posted_rev}]),
        )
        .await
        .unwrap();
        assert!(removed["rev"].as_str().unwrap().starts_with("2-"));

        let err = call(&ctx, Method::Remove, json!([{"_id": "a"}])).await.unwrap_err();
        assert_eq!(err.error, "bad_request");
    }

    #[tokio::test]
    async fn test_all_docs_info_changes() {
        let ctx = context(Method::AllDocs);
        call(
            &ctx,
            Method::BulkDocs,
            json!([[{"_id": "a"}, {"_id": "b"}, {"_id": "c"}]]),
        )
        .await
        .unwrap();

        let all = call(&ctx, Method::AllDocs, json!([{"startkey": "b", "include_docs": true}]))
            .await
            .unwrap();
        assert_eq!(all["total_rows"], 3);
        assert_eq!(all["rows"].as_array().unwrap().len(), 2);
        assert_eq!(all["rows"][0]["doc"]["_id"], "b");

        let info = call(&ctx, Method::Info, json!([])).await.unwrap();
        assert_eq!(info["db_name"], "testdb");
        assert_eq!(info["doc_count"], 3);

        let changes = call(&ctx, Method::Changes, json!([{"since": 1}])).await.unwrap();
        assert_eq!(changes["results"].as_array().unwrap().len(), 2);
        assert_eq!(changes["last_seq"], 3);

        let err = call(&ctx, Method::AllDocs, json!([{"limit": "ten"}]))
            .await
            .unwrap_err();
        assert_eq!(err.error, "bad_request");
    }
}
