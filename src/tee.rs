//! Pipe-tee fan-out for forward-only sources.
//!
//! One copier task reads chunks from the source and delivers each chunk to
//! every consumer's conduit concurrently. Conduits are bounded, so a slow
//! consumer can hold the copier back by at most [`CONDUIT_DEPTH`] chunks; a
//! consumer that hangs up is dropped from the delivery set and never blocks
//! the others again. The copier owns the source and drops it exactly once
//! when the loop exits.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::future::join_all;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;

use crate::error::HandleError;

/// Bytes requested from the source per copier iteration.
const CHUNK_SIZE: usize = 8 * 1024;

/// Chunks buffered per conduit before the copier blocks on that sink.
const CONDUIT_DEPTH: usize = 4;

type Sink = mpsc::Sender<io::Result<Bytes>>;
type Conduit = StreamReader<ReceiverStream<io::Result<Bytes>>, Bytes>;

/// Read side of one conduit fed by the copier task.
///
/// Closing drops the receiver, which makes the copier's next write to this
/// sink fail fast and be discarded; the remaining consumers are unaffected.
pub(crate) struct TeeReader {
    conduit: Option<Conduit>,
}

impl TeeReader {
    /// Idempotent; never blocks.
    pub(crate) fn close(&mut self) {
        self.conduit = None;
    }
}

impl AsyncRead for TeeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.conduit.as_mut() {
            Some(conduit) => Pin::new(conduit).poll_read(cx, buf),
            None => Poll::Ready(Err(HandleError::Closed.into())),
        }
    }
}

/// Spawns the copier task over `source` and returns one reader per consumer
/// slot. The readers are handed to consumers in arbitrary order.
pub(crate) fn spawn_tee<R>(source: R, consumers: usize) -> Vec<TeeReader>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut sinks = Vec::with_capacity(consumers);
    let mut readers = Vec::with_capacity(consumers);
    for _ in 0..consumers {
        let (tx, rx) = mpsc::channel(CONDUIT_DEPTH);
        sinks.push(Some(tx));
        readers.push(TeeReader {
            conduit: Some(StreamReader::new(ReceiverStream::new(rx))),
        });
    }
    tokio::spawn(copy_to_sinks(source, sinks));
    readers
}

async fn copy_to_sinks<R>(mut source: R, mut sinks: Vec<Option<Sink>>)
where
    R: AsyncRead + Send + Unpin,
{
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
    loop {
        if sinks.iter().all(Option::is_none) {
            break;
        }

        buf.reserve(CHUNK_SIZE);
        match source.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = buf.split().freeze();
                let writes = sinks.iter().enumerate().filter_map(|(slot, sink)| {
                    sink.as_ref().map(|sink| {
                        let chunk = chunk.clone();
                        async move { (slot, sink.send(Ok(chunk)).await) }
                    })
                });
                let deliveries = join_all(writes).await;
                for (slot, delivered) in deliveries {
                    if delivered.is_err() {
                        // Consumer hung up; discard its share from now on.
                        sinks[slot] = None;
                    }
                }
            }
            Err(err) => {
                let writes = sinks.iter().filter_map(Option::as_ref).map(|sink| {
                    let mirrored = io::Error::new(err.kind(), err.to_string());
                    async move {
                        let _ = sink.send(Err(mirrored)).await;
                    }
                });
                join_all(writes).await;
                break;
            }
        }
    }

    // The source must be released before the conduits report EOF, so that a
    // consumer observing end-of-stream can rely on the source being closed.
    drop(source);
    drop(sinks);
}
