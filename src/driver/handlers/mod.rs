//! Request dispatch
//!
//! Resolves the database and method named by a request and runs the
//! effective handler for it. Resolution failures become error outcomes; they
//! never reach the stream as panics.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::multiplex::StreamInfo;
use super::protocol::{RequestFrame, ResponseFrame, RpcError};
use super::wrapper::{CallContext, MethodTable};
use crate::server::registry::DatabaseRegistry;

pub mod document;

/// Routes requests of every stream of one server
pub struct Dispatcher {
    registry: DatabaseRegistry,
    methods: MethodTable,
    request_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        registry: DatabaseRegistry,
        methods: MethodTable,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            methods,
            request_timeout,
        }
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// Run one request and return its outcome.
    ///
    /// The handler's future is awaited exactly once. Without a configured
    /// timeout a handler that never resolves keeps this future pending.
    pub async fn dispatch(
        &self,
        stream: Arc<StreamInfo>,
        seq: i64,
        database: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let db = self
            .registry
            .get(database)
            .ok_or_else(|| RpcError::database_not_found(database))?;
        let handler = self
            .methods
            .resolve(method)
            .ok_or_else(|| RpcError::unknown_method(method))?
            .clone();

        tracing::debug!(
            "Stream {}: seq {} -> {}.{}",
            stream.id,
            seq,
            database,
            method
        );

        let ctx = CallContext {
            db,
            database: database.to_string(),
            method: method.to_string(),
            seq,
            stream,
        };
        let call = handler(ctx, args);

        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(RpcError::timeout(limit.as_millis()))),
            None => call.await,
        }
    }

    /// Dispatch a decoded frame and tag the outcome with its sequence id.
    ///
    /// An empty database name addresses the database the stream was opened
    /// for.
    pub async fn dispatch_frame(
        &self,
        stream: Arc<StreamInfo>,
        frame: RequestFrame,
    ) -> ResponseFrame {
        let RequestFrame {
            seq,
            database,
            method,
            args,
        } = frame;
        let database = if database.is_empty() {
            stream.name.clone()
        } else {
            database
        };

        let result = self.dispatch(stream, seq, &database, &method, args).await;
        if let Err(e) = &result {
            tracing::debug!("seq {} failed: {}", seq, e);
        }
        ResponseFrame::new(seq, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::wrapper::{handler_fn, WrapperFunctions};
    use crate::storage::{Database, MemoryDatabase};
    use serde_json::json;

    fn dispatcher(wrappers: WrapperFunctions, timeout: Option<Duration>) -> Dispatcher {
        let registry = DatabaseRegistry::new();
        registry.add("db1", MemoryDatabase::handle("db1"));
        let methods = MethodTable::build(wrappers, &registry).unwrap();
        Dispatcher::new(registry, methods, timeout)
    }

    fn stream() -> Arc<StreamInfo> {
        Arc::new(StreamInfo::new(1, "db1"))
    }

    #[tokio::test]
    async fn test_unknown_database() {
        let d = dispatcher(WrapperFunctions::new(), None);
        let err = d
            .dispatch(stream(), 0, "nope", "info", vec![])
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::database_not_found("nope"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let d = dispatcher(WrapperFunctions::new(), None);
        let err = d
            .dispatch(stream(), 0, "db1", "_compact", vec![])
            .await
            .unwrap_err();
        assert_eq!(err.error, "unknown_method");
    }

    #[tokio::test]
    async fn test_empty_database_name_uses_stream_name() {
        let d = dispatcher(WrapperFunctions::new(), None);
        let response = d
            .dispatch_frame(stream(), RequestFrame::new(5, "", "info", vec![]))
            .await;
        assert_eq!(response.seq, 5);
        assert_eq!(response.value().unwrap()["db_name"], "db1");
    }

    #[tokio::test]
    async fn test_context_carries_request_details() {
        let wrappers = WrapperFunctions::new().wrap("info", |_original, _ctx| {
            Ok(handler_fn(|ctx, args| async move {
                Ok(json!({
                    "database": ctx.database,
                    "method": ctx.method,
                    "seq": ctx.seq,
                    "stream": ctx.stream.id,
                    "db_name": ctx.db.name(),
                    "args": args
                }))
            }))
        });
        let d = dispatcher(wrappers, None);
        let value = d
            .dispatch(stream(), 12, "db1", "_info", vec![json!(1)])
            .await
            .unwrap();
        assert_eq!(
            value,
            json!({
                "database": "db1",
                "method": "_info",
                "seq": 12,
                "stream": 1,
                "db_name": "db1",
                "args": [1]
            })
        );
    }

    #[tokio::test]
    async fn test_timeout_resolves_hung_handler() {
        let wrappers = WrapperFunctions::new().wrap("get", |_original, _ctx| {
            Ok(handler_fn(|_ctx, _args| {
                std::future::pending::<Result<Value, RpcError>>()
            }))
        });
        let d = dispatcher(wrappers, Some(Duration::from_millis(20)));
        let err = d
            .dispatch(stream(), 0, "db1", "get", vec![json!("doc1")])
            .await
            .unwrap_err();
        assert_eq!(err.status, 408);
        assert_eq!(err.error, "timeout");
    }
}
