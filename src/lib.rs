pub mod driver;
pub mod error;
pub mod server;
pub mod storage;

pub use driver::{
    handler_fn, pipe_io, read_only_wrappers, CallContext, DocStream, Handler, Method,
    RequestFrame, ResponseFrame, RpcError, WireFormat, WrapperContext, WrapperFunctions,
};
pub use error::{DbError, DbResult, ServerError};
pub use server::{DatabaseRegistry, ServerConfig, ServerOptions, StreamServer};
pub use storage::{Database, DbHandle, MemoryDatabase};
