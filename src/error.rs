//! Sentinel errors reported by consumer handles.
//!
//! Work closures return their own opaque errors (see [`WorkError`]); the
//! errors here are the ones the handles themselves produce. Both variants
//! round-trip through [`std::io::Error`] so they can be recovered with
//! [`std::error::Error`] downcasting when a caller needs to distinguish them
//! from ordinary I/O failures.
//!
//! [`WorkError`]: crate::WorkError

use std::io;
use thiserror::Error;

/// Errors produced by a [`SharedReader`](crate::SharedReader) itself.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// The handle was closed by its consumer; reads and seeks are refused.
    #[error("stream handle is closed")]
    Closed,

    /// Seek was attempted on a handle served by the pipe-tee fan-out.
    #[error("stream handle is not seekable")]
    Unseekable,
}

impl From<HandleError> for io::Error {
    fn from(err: HandleError) -> Self {
        let kind = match err {
            HandleError::Closed => io::ErrorKind::BrokenPipe,
            HandleError::Unseekable => io::ErrorKind::Unsupported,
        };
        io::Error::new(kind, err)
    }
}

impl HandleError {
    /// Recovers a `HandleError` carried inside an [`io::Error`], if any.
    pub fn from_io(err: &io::Error) -> Option<HandleError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<HandleError>())
            .copied()
    }
}
