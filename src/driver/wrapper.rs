//! Method wrapper chain
//!
//! Every method name maps to exactly one [`Handler`]. The table starts with
//! the built-in handlers for [`Method::ALL`]; each configured wrapper factory
//! is then called once with the handler it replaces, and its result becomes
//! the permanent handler for that name on the server.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::handlers::document::{default_handler, parse_bulk_docs_args};
use super::multiplex::StreamInfo;
use super::protocol::{canonical_method_name, Method, RpcError};
use crate::error::ServerError;
use crate::server::registry::DatabaseRegistry;
use crate::storage::{BulkDocResult, DbHandle, WriteFailure};

pub type HandlerFuture = BoxFuture<'static, Result<Value, RpcError>>;

/// Effective implementation of one method: arguments in, one outcome out
pub type Handler = Arc<dyn Fn(CallContext, Vec<Value>) -> HandlerFuture + Send + Sync>;

/// Per-request context handed to a handler
#[derive(Clone)]
pub struct CallContext {
    /// Database the request resolved to
    pub db: DbHandle,
    /// Name the database was resolved under
    pub database: String,
    /// Method name as sent by the client
    pub method: String,
    pub seq: i64,
    pub stream: Arc<StreamInfo>,
}

/// Server-level context passed to wrapper factories
#[derive(Debug, Clone)]
pub struct WrapperContext {
    /// Canonical name of the wrapped method
    pub method: String,
    pub registry: DatabaseRegistry,
}

pub type WrapperFactory =
    Box<dyn FnOnce(Handler, &WrapperContext) -> anyhow::Result<Handler> + Send>;

/// Build a [`Handler`] from an async closure
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(CallContext, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    Arc::new(move |ctx: CallContext, args: Vec<Value>| -> HandlerFuture {
        Box::pin(f(ctx, args))
    })
}

/// Method name → wrapper factory mapping given at server construction
#[derive(Default)]
pub struct WrapperFunctions {
    factories: Vec<(String, WrapperFactory)>,
}

impl WrapperFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap `method` (`bulkDocs` and `_bulkDocs` are the same key). A later
    /// wrapper for the same method replaces an earlier one.
    pub fn wrap<F>(mut self, method: &str, factory: F) -> Self
    where
        F: FnOnce(Handler, &WrapperContext) -> anyhow::Result<Handler> + Send + 'static,
    {
        let method = canonical_method_name(method).to_string();
        self.factories.retain(|(name, _)| *name != method);
        self.factories.push((method, Box::new(factory)));
        self
    }

    /// Merge another set of wrappers; entries of `other` win on collision
    pub fn extend(mut self, other: WrapperFunctions) -> Self {
        for (method, factory) in other.factories {
            self.factories.retain(|(name, _)| *name != method);
            self.factories.push((method, factory));
        }
        self
    }

    pub fn methods(&self) -> Vec<&str> {
        self.factories.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for WrapperFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperFunctions")
            .field("methods", &self.methods())
            .finish()
    }
}

/// Resolved handler per method name, fixed for the server's lifetime
#[derive(Clone)]
pub struct MethodTable {
    handlers: HashMap<String, Handler>,
}

impl MethodTable {
    /// Install the built-in handlers, then apply every wrapper once.
    ///
    /// A failing factory aborts construction.
    pub fn build(
        wrappers: WrapperFunctions,
        registry: &DatabaseRegistry,
    ) -> Result<Self, ServerError> {
        let mut handlers: HashMap<String, Handler> = Method::ALL
            .into_iter()
            .map(|method| (method.as_str().to_string(), default_handler(method)))
            .collect();

        for (method, factory) in wrappers.factories {
            let original = handlers
                .remove(&method)
                .unwrap_or_else(|| unknown_method_handler(method.clone()));
            let ctx = WrapperContext {
                method: method.clone(),
                registry: registry.clone(),
            };
            let wrapped = factory(original, &ctx).map_err(|e| ServerError::Wrapper {
                method: method.clone(),
                reason: format!("{:#}", e),
            })?;
            tracing::debug!("Installed wrapper for '{}'", method);
            handlers.insert(method, wrapped);
        }

        Ok(Self { handlers })
    }

    pub fn resolve(&self, method: &str) -> Option<&Handler> {
        self.handlers.get(canonical_method_name(method))
    }

    /// Method names with a handler, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The "original" of a wrapper that introduces a method the database lacks
fn unknown_method_handler(method: String) -> Handler {
    handler_fn(move |_ctx, _args| {
        let err = RpcError::unknown_method(&method);
        async move { Err(err) }
    })
}

/// Reason reported for writes refused by [`read_only_wrappers`]
pub const READ_ONLY_REASON: &str = "read-only db";

/// Wrappers refusing every write method.
///
/// `bulkDocs` answers with a per-document `forbidden` entry inside a
/// successful result; single-document writes fail with a `forbidden` error.
pub fn read_only_wrappers() -> WrapperFunctions {
    Method::ALL
        .into_iter()
        .filter(Method::is_write)
        .fold(WrapperFunctions::new(), |wrappers, method| {
            wrappers.wrap(method.as_str(), move |_original, _ctx| {
                Ok(match method {
                    Method::BulkDocs => handler_fn(refuse_bulk_docs),
                    _ => handler_fn(refuse_write),
                })
            })
        })
}

async fn refuse_bulk_docs(_ctx: CallContext, args: Vec<Value>) -> Result<Value, RpcError> {
    let (docs, _) = parse_bulk_docs_args(&args)?;
    let refused: Vec<BulkDocResult> = docs
        .iter()
        .map(|doc| {
            let id = doc.get("_id").and_then(Value::as_str).map(str::to_string);
            BulkDocResult::Error(WriteFailure::new(id, "forbidden", READ_ONLY_REASON))
        })
        .collect();
    Ok(serde_json::to_value(refused)?)
}

async fn refuse_write(_ctx: CallContext, _args: Vec<Value>) -> Result<Value, RpcError> {
    Err(RpcError::forbidden(READ_ONLY_REASON))
}
