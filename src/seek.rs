//! Shared-seek fan-out for random-access sources.
//!
//! The source is serialized behind one async mutex; each consumer view keeps
//! its own logical position and re-seeks the shared source to that position
//! immediately before every read, so views never observe one another's
//! cursor movement. A count of open views guards the source: the last view
//! to close takes the source out of the mutex and drops it, closing it
//! exactly once.
//!
//! Views remember the position at which they observed end-of-stream and
//! answer later reads at that position without consulting the source. Range
//! style backends commonly answer a read past the end with an error rather
//! than a clean EOF; the recorded position keeps such sources from turning
//! an ordinary drain-then-poll pattern into a failure.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, ReadBuf};
use tokio::sync::Mutex;

use crate::error::HandleError;
use crate::source::BoxedSeekableStream;

/// The mutex-serialized source shared by all views of one call.
pub(crate) struct SharedSeekSource {
    source: Mutex<Option<BoxedSeekableStream>>,
    open_views: AtomicUsize,
}

impl SharedSeekSource {
    /// Wraps `source` for exactly `consumers` views. Every view must be
    /// minted through [`SeekReader::new`]; minting more than `consumers`
    /// would break the close accounting.
    pub(crate) fn new(source: BoxedSeekableStream, consumers: usize) -> Arc<Self> {
        Arc::new(Self {
            source: Mutex::new(Some(source)),
            open_views: AtomicUsize::new(consumers),
        })
    }

    fn release(&self) {
        if self.open_views.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Every view is closed and each dropped its in-flight operation
            // before releasing, so nothing can hold the lock here.
            let mut slot = self
                .source
                .try_lock()
                .expect("seek source still locked after the last view closed");
            slot.take();
        }
    }
}

async fn read_at(parent: Arc<SharedSeekSource>, pos: u64, limit: usize) -> io::Result<Bytes> {
    let mut guard = parent.source.lock().await;
    let source = guard.as_mut().ok_or(HandleError::Closed)?;
    source.seek(SeekFrom::Start(pos)).await?;
    let mut chunk = vec![0u8; limit];
    let n = source.read(&mut chunk).await?;
    chunk.truncate(n);
    Ok(Bytes::from(chunk))
}

async fn seek_shared(parent: Arc<SharedSeekSource>, position: SeekFrom) -> io::Result<u64> {
    let mut guard = parent.source.lock().await;
    let source = guard.as_mut().ok_or(HandleError::Closed)?;
    source.seek(position).await
}

/// One consumer's independent view into the shared source.
///
/// In-flight operations are owned by the view and re-polled across calls,
/// so `pos`, `eof` and `eof_pos` are only ever touched through `&mut self`
/// once the operation that held the source mutex has resolved.
pub(crate) struct SeekReader {
    parent: Arc<SharedSeekSource>,
    pos: u64,
    eof: bool,
    eof_pos: u64,
    closed: bool,
    pending_read: Option<BoxFuture<'static, io::Result<Bytes>>>,
    pending_seek: Option<BoxFuture<'static, io::Result<u64>>>,
}

impl SeekReader {
    pub(crate) fn new(parent: Arc<SharedSeekSource>) -> Self {
        Self {
            parent,
            pos: 0,
            eof: false,
            eof_pos: 0,
            closed: false,
            pending_read: None,
            pending_seek: None,
        }
    }

    /// Idempotent; never blocks. The in-flight operation (and with it any
    /// hold on the source mutex) is dropped before the slot is released.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending_read = None;
        self.pending_seek = None;
        self.parent.release();
    }
}

impl Drop for SeekReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl AsyncRead for SeekReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(Err(HandleError::Closed.into()));
        }

        // Finish off a seek the caller abandoned between start_seek and
        // poll_complete, so the logical position stays consistent.
        if let Some(seek) = this.pending_seek.as_mut() {
            if let Ok(offset) = ready!(seek.as_mut().poll(cx)) {
                this.pos = offset;
            }
            this.pending_seek = None;
        }

        loop {
            if let Some(read) = this.pending_read.as_mut() {
                let chunk = ready!(read.as_mut().poll(cx));
                this.pending_read = None;
                return Poll::Ready(match chunk {
                    Ok(chunk) if chunk.is_empty() => {
                        this.eof = true;
                        this.eof_pos = this.pos;
                        Ok(())
                    }
                    Ok(chunk) => {
                        let take = chunk.len().min(buf.remaining());
                        buf.put_slice(&chunk[..take]);
                        this.pos += take as u64;
                        Ok(())
                    }
                    Err(err) => Err(err),
                });
            }

            if this.eof && this.pos == this.eof_pos {
                return Poll::Ready(Ok(()));
            }
            if buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }
            this.pending_read = Some(Box::pin(read_at(
                Arc::clone(&this.parent),
                this.pos,
                buf.remaining(),
            )));
        }
    }
}

impl AsyncSeek for SeekReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let this = self.get_mut();
        if this.closed {
            return Err(HandleError::Closed.into());
        }
        if this.pending_seek.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "a seek is already in progress",
            ));
        }
        // A read that was abandoned mid-poll holds no position state; it
        // simply restarts from the new position afterwards.
        this.pending_read = None;
        this.pending_seek = Some(Box::pin(seek_shared(Arc::clone(&this.parent), position)));
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        let this = self.get_mut();
        let Some(seek) = this.pending_seek.as_mut() else {
            return Poll::Ready(Ok(this.pos));
        };
        let result = ready!(seek.as_mut().poll(cx));
        this.pending_seek = None;
        match result {
            Ok(offset) => {
                this.pos = offset;
                Poll::Ready(Ok(offset))
            }
            // Position is left where it was, matching the read-side contract.
            Err(err) => Poll::Ready(Err(err)),
        }
    }
}
