//! Stream server
//!
//! [`StreamServer`] owns the database registry and the method table. Each
//! call to [`StreamServer::stream`] opens an independent multiplexed stream;
//! [`StreamServer::serve`] does the same for every accepted TCP connection.

pub mod config;
pub mod registry;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::driver::handlers::Dispatcher;
use crate::driver::multiplex::{pipe_io, DocStream, StreamInfo};
use crate::driver::protocol::{read_magic, WireFormat};
use crate::driver::wrapper::{MethodTable, WrapperFunctions};
use crate::error::ServerError;

pub use config::ServerConfig;
pub use registry::DatabaseRegistry;

/// Construction options for [`StreamServer`]
pub struct ServerOptions {
    /// Method name → wrapper factory; each factory runs once in `new`
    pub wrapper_functions: WrapperFunctions,
    /// Answer `timeout` when a handler has not completed in time
    pub request_timeout: Option<Duration>,
    pub stream_buffer: usize,
    /// Payload encoding on byte transports
    pub format: WireFormat,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            wrapper_functions: WrapperFunctions::new(),
            request_timeout: None,
            stream_buffer: config::DEFAULT_STREAM_BUFFER,
            format: WireFormat::default(),
        }
    }
}

pub struct StreamServer {
    dbs: DatabaseRegistry,
    dispatcher: Arc<Dispatcher>,
    stream_buffer: usize,
    format: WireFormat,
    next_stream_id: AtomicU64,
}

impl StreamServer {
    /// Build the method table, invoking every wrapper factory once.
    ///
    /// Fails if any factory fails; no stream can exist at that point.
    pub fn new(options: ServerOptions) -> Result<Self, ServerError> {
        let dbs = DatabaseRegistry::new();
        let methods = MethodTable::build(options.wrapper_functions, &dbs)?;
        tracing::debug!("Methods: {}", methods.names().join(", "));

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(
                dbs.clone(),
                methods,
                options.request_timeout,
            )),
            dbs,
            stream_buffer: options.stream_buffer,
            format: options.format,
            next_stream_id: AtomicU64::new(1),
        })
    }

    /// Registry of databases reachable by name from every stream
    pub fn dbs(&self) -> &DatabaseRegistry {
        &self.dbs
    }

    pub fn methods(&self) -> &MethodTable {
        self.dispatcher.methods()
    }

    /// Open a new stream. Requests with an empty database name go to `name`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn stream(&self, name: &str) -> DocStream {
        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        DocStream::open(
            self.dispatcher.clone(),
            StreamInfo::new(id, name),
            self.stream_buffer,
        )
    }

    /// Accept connections forever, one stream per connection
    pub async fn serve(self: Arc<Self>, listener: TcpListener, database: &str) -> Result<(), ServerError> {
        self.serve_with_shutdown(listener, database, std::future::pending())
            .await
    }

    /// Accept connections until `shutdown` resolves. Connections already
    /// accepted keep running on their own tasks.
    pub async fn serve_with_shutdown<S>(
        self: Arc<Self>,
        listener: TcpListener,
        database: &str,
        shutdown: S,
    ) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Stream server listening on {} ({})", addr, self.format);
        }
        tokio::pin!(shutdown);
        let listener = &listener;

        loop {
            let (mut socket, addr) = tokio::select! {
                accepted = accept_retrying(move || listener.accept()) => accepted,
                _ = &mut shutdown => {
                    tracing::info!("Stream server stopped accepting connections");
                    return Ok(());
                }
            };

            let _ = socket.set_nodelay(true);
            let server = self.clone();
            let database = database.to_string();
            tokio::spawn(async move {
                tracing::info!("Connection from {}", addr);
                if let Err(e) = read_magic(&mut socket).await {
                    tracing::warn!("Rejecting {}: {}", addr, e);
                    return;
                }

                let stream = server.stream(&database);
                match pipe_io(stream, socket, server.format).await {
                    Ok(()) => tracing::debug!("Connection closed: {}", addr),
                    Err(e) => tracing::warn!("Connection error from {}: {}", addr, e),
                }
            });
        }
    }
}

/// Pause after a failed accept so that fd exhaustion does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accept errors (aborted handshakes, EMFILE) affect one connection, not the
/// listener: log them and keep accepting.
async fn accept_retrying<T, F, Fut>(mut accept: F) -> (T, SocketAddr)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<(T, SocketAddr)>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                tracing::warn!("Accept error: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}
