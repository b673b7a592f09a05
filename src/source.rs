//! Byte sources handed over by work closures.
//!
//! Seek capability is a property of the source's type: a work closure that
//! produced a random-access stream wraps it with [`Source::seekable`], a
//! forward-only one with [`Source::stream`]. The coordinator consults the
//! variant (together with the group's configuration) to pick a fan-out
//! strategy.

use tokio::io::{AsyncRead, AsyncSeek};

/// A byte stream that can also reposition its cursor.
///
/// Blanket-implemented for every `AsyncRead + AsyncSeek` type, so ordinary
/// sources such as [`std::io::Cursor`] or [`tokio::fs::File`] qualify
/// without ceremony.
pub trait SeekableStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> SeekableStream for T {}

/// Boxed forward-only byte source.
pub type BoxedStream = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed random-access byte source.
pub type BoxedSeekableStream = Box<dyn SeekableStream>;

/// A byte source produced by a work closure.
///
/// Ownership transfers to the fan-out the moment the work closure returns;
/// the closure must not retain or close the stream itself. The source is
/// dropped (closed) exactly once, by the fan-out, after the last consumer
/// handle has released it.
pub enum Source {
    /// Forward-only stream; always served through the pipe-tee fan-out.
    Stream(BoxedStream),
    /// Random-access stream; served through the shared-seek fan-out when the
    /// group was built with [`Group::with_seekers`](crate::Group::with_seekers),
    /// and through the pipe tee otherwise.
    Seekable(BoxedSeekableStream),
}

impl Source {
    /// Wraps a forward-only byte stream.
    pub fn stream(inner: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Source::Stream(Box::new(inner))
    }

    /// Wraps a random-access byte stream.
    pub fn seekable(inner: impl AsyncRead + AsyncSeek + Send + Unpin + 'static) -> Self {
        Source::Seekable(Box::new(inner))
    }

    /// Whether this source advertises seek capability.
    pub fn is_seekable(&self) -> bool {
        matches!(self, Source::Seekable(_))
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Stream(_) => f.write_str("Source::Stream"),
            Source::Seekable(_) => f.write_str("Source::Seekable"),
        }
    }
}
