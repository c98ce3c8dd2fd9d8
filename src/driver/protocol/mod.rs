//! Wire protocol definitions for the stream server
//!
//! Logical frames are JSON-shaped arrays. On byte transports they travel
//! length-prefixed, encoded as MessagePack or JSON.

pub mod codec;
pub mod error;
pub mod method;
pub mod request;
pub mod response;

pub use codec::{
    decode_payload, decode_value, encode_frame, read_frame, read_magic, write_frame, write_magic,
    WireFormat, MAX_MESSAGE_SIZE, STREAM_MAGIC,
};
pub use error::{CodecError, RpcError};
pub use method::{canonical_method_name, Method};
pub use request::{FrameError, RequestFrame};
pub use response::ResponseFrame;
