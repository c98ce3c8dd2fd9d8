//! Stream multiplexer
//!
//! A [`DocStream`] is an object-mode duplex channel: request frames go in,
//! response frames come out. Behind it one task reads requests and spawns a
//! dispatch per frame, so a slow or hung handler never holds up the others.
//! Responses are emitted as they complete and carry the request's sequence
//! id; their order is unrelated to request order.

use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use super::handlers::Dispatcher;
use super::protocol::{
    decode_value, encode_frame, read_frame, write_frame, CodecError, FrameError, RequestFrame,
    ResponseFrame, RpcError, WireFormat,
};

/// Identity of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub id: u64,
    /// Database the stream was opened for
    pub name: String,
}

impl StreamInfo {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Stream closed")]
pub struct StreamClosed;

/// Request side of a stream
#[derive(Clone)]
pub struct StreamWriter {
    tx: mpsc::Sender<Value>,
}

impl StreamWriter {
    /// Queue a raw frame. Malformed frames are answered (or dropped) by the
    /// multiplexer, not rejected here.
    pub async fn write(&self, frame: Value) -> Result<(), StreamClosed> {
        self.tx.send(frame).await.map_err(|_| StreamClosed)
    }

    pub async fn send(&self, request: RequestFrame) -> Result<(), StreamClosed> {
        self.write(request.to_value()).await
    }
}

/// Response side of a stream
pub struct StreamReader {
    rx: mpsc::Receiver<ResponseFrame>,
}

impl StreamReader {
    /// Next response; `None` once the request side is gone and every
    /// in-flight request has been answered.
    pub async fn recv(&mut self) -> Option<ResponseFrame> {
        self.rx.recv().await
    }
}

/// Duplex frame channel returned by `StreamServer::stream`
pub struct DocStream {
    info: Arc<StreamInfo>,
    writer: StreamWriter,
    reader: StreamReader,
}

impl DocStream {
    /// Create the channel pair and start its multiplexer task.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn open(dispatcher: Arc<Dispatcher>, info: StreamInfo, buffer: usize) -> Self {
        let buffer = buffer.max(1);
        let (req_tx, req_rx) = mpsc::channel(buffer);
        let (resp_tx, resp_rx) = mpsc::channel(buffer);
        let info = Arc::new(info);

        tokio::spawn(run_multiplexer(dispatcher, info.clone(), req_rx, resp_tx));

        Self {
            info,
            writer: StreamWriter { tx: req_tx },
            reader: StreamReader { rx: resp_rx },
        }
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub async fn write(&self, frame: Value) -> Result<(), StreamClosed> {
        self.writer.write(frame).await
    }

    pub async fn send(&self, request: RequestFrame) -> Result<(), StreamClosed> {
        self.writer.send(request).await
    }

    pub async fn recv(&mut self) -> Option<ResponseFrame> {
        self.reader.recv().await
    }

    /// Separate the halves so requests and responses can be driven from
    /// different tasks
    pub fn split(self) -> (StreamWriter, StreamReader) {
        (self.writer, self.reader)
    }
}

async fn run_multiplexer(
    dispatcher: Arc<Dispatcher>,
    info: Arc<StreamInfo>,
    mut requests: mpsc::Receiver<Value>,
    responses: mpsc::Sender<ResponseFrame>,
) {
    tracing::info!("Stream {} opened for '{}'", info.id, info.name);

    while let Some(raw) = requests.recv().await {
        let request = match RequestFrame::from_value(raw) {
            Ok(request) => request,
            Err(FrameError {
                seq: Some(seq),
                reason,
            }) => {
                tracing::warn!("Stream {}: malformed frame {}: {}", info.id, seq, reason);
                respond(
                    info.id,
                    responses.clone(),
                    ResponseFrame::error(seq, RpcError::bad_request(reason)),
                );
                continue;
            }
            Err(e) => {
                tracing::warn!("Stream {}: dropping frame: {}", info.id, e);
                continue;
            }
        };

        let dispatcher = dispatcher.clone();
        let info = info.clone();
        let responses = responses.clone();
        tokio::spawn(async move {
            let seq = request.seq;
            let outcome = AssertUnwindSafe(dispatcher.dispatch_frame(info.clone(), request))
                .catch_unwind()
                .await;
            let response = outcome.unwrap_or_else(|_| {
                tracing::error!("Stream {}: handler for seq {} panicked", info.id, seq);
                ResponseFrame::error(seq, RpcError::internal("handler panicked"))
            });
            if responses.send(response).await.is_err() {
                tracing::debug!("Stream {}: response {} dropped, reader gone", info.id, seq);
            }
        });
    }

    tracing::info!("Stream {} closed", info.id);
}

fn respond(stream_id: u64, responses: mpsc::Sender<ResponseFrame>, response: ResponseFrame) {
    tokio::spawn(async move {
        let seq = response.seq;
        if responses.send(response).await.is_err() {
            tracing::debug!("Stream {}: response {} dropped, reader gone", stream_id, seq);
        }
    });
}

/// Bridge a stream to a byte transport using length-prefixed frames.
///
/// Returns once the peer has closed its side and every response still owed
/// has been written, or on the first transport error.
pub async fn pipe_io<T>(stream: DocStream, io: T, format: WireFormat) -> Result<(), CodecError>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let stream_id = stream.info().id;
    let (mut read_half, mut write_half) = tokio::io::split(io);
    let (writer, mut reader) = stream.split();

    let outbound = tokio::spawn(async move {
        while let Some(response) = reader.recv().await {
            let frame = encode_frame(&response, format)?;
            write_frame(&mut write_half, &frame).await?;
        }
        Ok::<(), CodecError>(())
    });

    let inbound: Result<(), CodecError> = async {
        while let Some(payload) = read_frame(&mut read_half).await? {
            match decode_value(&payload, format) {
                Ok(value) => {
                    if writer.write(value).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Stream {}: undecodable frame: {}", stream_id, e),
            }
        }
        Ok(())
    }
    .await;
    drop(writer);

    if inbound.is_err() {
        outbound.abort();
        return inbound;
    }

    match outbound.await {
        Ok(result) => result,
        Err(e) => Err(CodecError::Io(std::io::Error::other(e.to_string()))),
    }
}
