//! Multiplexed document-database protocol
//!
//! Clients talk to a server through a duplex stream of frames:
//!
//! - **Request**: `[seq, database, method, [args...]]`
//! - **Response**: `[seq, [error | null, result | null]]`
//!
//! Many requests may be in flight on one stream; responses are matched to
//! requests by `seq` alone. Each method is served by a [`Handler`] that can be
//! replaced at server construction through [`WrapperFunctions`].
//!
//! On byte transports every frame is sent as `[length: 4 bytes BE][payload]`
//! with a MessagePack or JSON payload, after a one-time magic header
//! `docstream-v1\0` (13 bytes).

pub mod handlers;
pub mod multiplex;
pub mod protocol;
pub mod wrapper;

pub use handlers::Dispatcher;
pub use multiplex::{pipe_io, DocStream, StreamClosed, StreamInfo, StreamReader, StreamWriter};
pub use protocol::{
    CodecError, Method, RequestFrame, ResponseFrame, RpcError, WireFormat, STREAM_MAGIC,
};
pub use wrapper::{
    handler_fn, read_only_wrappers, CallContext, Handler, MethodTable, WrapperContext,
    WrapperFunctions, READ_ONLY_REASON,
};
