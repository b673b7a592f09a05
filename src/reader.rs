//! The per-consumer handle returned from a call.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

use crate::error::HandleError;
use crate::seek::SeekReader;
use crate::tee::TeeReader;

/// An independent view into one call's fan-out.
///
/// Every waiter of a call receives its own `SharedReader`; reading from one
/// never disturbs another. The handle always implements [`AsyncRead`]. It
/// also implements [`AsyncSeek`], but seeking succeeds only when the call
/// was served by the shared-seek fan-out; probe with
/// [`is_seekable`](SharedReader::is_seekable) before relying on it. A handle
/// served by the pipe tee fails seeks with
/// [`HandleError::Unseekable`](crate::HandleError::Unseekable).
///
/// Dropping an unclosed handle closes it, so abandoning a handle can never
/// keep the underlying source open.
pub struct SharedReader {
    inner: Inner,
}

enum Inner {
    Piped(TeeReader),
    Seekable(SeekReader),
}

impl SharedReader {
    pub(crate) fn piped(reader: TeeReader) -> Self {
        Self {
            inner: Inner::Piped(reader),
        }
    }

    pub(crate) fn seekable(reader: SeekReader) -> Self {
        Self {
            inner: Inner::Seekable(reader),
        }
    }

    /// Whether this handle supports repositioning.
    ///
    /// `false` whenever the call was served by the pipe tee, including the
    /// fallback taken when a seek-enabled group received a forward-only
    /// source.
    pub fn is_seekable(&self) -> bool {
        matches!(self.inner, Inner::Seekable(_))
    }

    /// Releases this consumer's slot in the fan-out.
    ///
    /// Idempotent and non-blocking. Subsequent reads and seeks fail with
    /// [`HandleError::Closed`](crate::HandleError::Closed). The shared
    /// source is closed once every handle of the call has been released.
    pub fn close(&mut self) {
        match &mut self.inner {
            Inner::Piped(reader) => reader.close(),
            Inner::Seekable(reader) => reader.close(),
        }
    }
}

impl AsyncRead for SharedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Inner::Piped(reader) => Pin::new(reader).poll_read(cx, buf),
            Inner::Seekable(reader) => Pin::new(reader).poll_read(cx, buf),
        }
    }
}

impl AsyncSeek for SharedReader {
    fn start_seek(self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        match &mut self.get_mut().inner {
            Inner::Piped(_) => Err(HandleError::Unseekable.into()),
            Inner::Seekable(reader) => Pin::new(reader).start_seek(position),
        }
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        match &mut self.get_mut().inner {
            Inner::Piped(_) => Poll::Ready(Err(HandleError::Unseekable.into())),
            Inner::Seekable(reader) => Pin::new(reader).poll_complete(cx),
        }
    }
}

impl std::fmt::Debug for SharedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedReader")
            .field("seekable", &self.is_seekable())
            .finish()
    }
}
