use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::CodecError;

/// Header a byte-stream client sends once before its first frame
pub const STREAM_MAGIC: &[u8] = b"docstream-v1\0";

/// Maximum frame payload (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Payload encoding of a length-prefixed frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    #[default]
    #[serde(alias = "messagepack")]
    Msgpack,
    Json,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Msgpack => f.write_str("msgpack"),
            WireFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "msgpack" | "messagepack" => Ok(WireFormat::Msgpack),
            "json" => Ok(WireFormat::Json),
            other => Err(format!("unknown wire format: {}", other)),
        }
    }
}

/// Encode a message with its 4-byte big-endian length prefix
pub fn encode_frame<T: Serialize>(msg: &T, format: WireFormat) -> Result<Vec<u8>, CodecError> {
    let payload = match format {
        WireFormat::Msgpack => {
            rmp_serde::to_vec_named(msg).map_err(|e| CodecError::Encode(e.to_string()))?
        }
        WireFormat::Json => serde_json::to_vec(msg).map_err(|e| CodecError::Encode(e.to_string()))?,
    };

    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a frame payload (without the length prefix)
pub fn decode_payload<T: for<'de> Deserialize<'de>>(
    data: &[u8],
    format: WireFormat,
) -> Result<T, CodecError> {
    match format {
        WireFormat::Msgpack => {
            rmp_serde::from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
        }
        WireFormat::Json => {
            serde_json::from_slice(data).map_err(|e| CodecError::Decode(e.to_string()))
        }
    }
}

/// Decode a frame payload into a loosely-typed value
pub fn decode_value(data: &[u8], format: WireFormat) -> Result<Value, CodecError> {
    decode_payload(data, format)
}

/// Read one length-prefixed payload.
///
/// Returns `Ok(None)` when the peer closed the connection between frames.
/// A close part way through the length prefix is an `UnexpectedEof` error.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, CodecError> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(CodecError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {} of 4 length bytes", filled),
                )))
            }
            n => filled += n,
        }
    }

    let msg_len = u32::from_be_bytes(len_buf) as usize;
    if msg_len > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(msg_len));
    }

    let mut payload = vec![0u8; msg_len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write an already encoded frame and flush it
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<(), CodecError> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Consume and check the handshake header
pub async fn read_magic<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(), CodecError> {
    let mut magic = [0u8; STREAM_MAGIC.len()];
    reader.read_exact(&mut magic).await?;
    if magic != STREAM_MAGIC {
        return Err(CodecError::BadMagic);
    }
    Ok(())
}

pub async fn write_magic<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), CodecError> {
    write_frame(writer, STREAM_MAGIC).await
}
