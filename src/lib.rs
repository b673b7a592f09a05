//! A library for deduplicating concurrent requests for the same byte stream.
//!
//! [`Group`] coalesces callers asking for the same key: the work closure
//! producing the stream runs at most once per in-flight key, and its single
//! result is fanned out so that every waiting caller receives an
//! independent, fully readable copy of the bytes. Callers that arrive while
//! the work is still running join the in-flight call; callers that arrive
//! after it finished start a fresh one.
//!
//! # Examples
//!
//! ```
//! use std::io::Cursor;
//! use stream_singleflight::{Group, Source};
//! use tokio::io::AsyncReadExt;
//!
//! # tokio_test::block_on(async {
//! let group = Group::new();
//! let outcome = group
//!     .execute("weekly-report", || async {
//!         // Imagine an expensive fetch here.
//!         (Some(Source::stream(Cursor::new(b"hello world".to_vec()))), None)
//!     })
//!     .await;
//!
//! assert!(!outcome.shared);
//! let mut reader = outcome.reader.unwrap();
//! let mut data = Vec::new();
//! reader.read_to_end(&mut data).await.unwrap();
//! assert_eq!(data, b"hello world");
//! # });
//! ```
//!
//! Several consumers attaching to one call, each receiving the full byte
//! sequence:
//!
//! ```
//! use std::io::Cursor;
//! use std::time::Duration;
//! use stream_singleflight::{Group, Source};
//! use tokio::io::AsyncReadExt;
//!
//! # tokio_test::block_on(async {
//! let group = Group::new();
//!
//! // All three receivers are registered before the work closure finishes,
//! // so the closure runs once and each receiver gets its own copy.
//! let receivers: Vec<_> = (0..3)
//!     .map(|_| {
//!         group.dispatch("big-download", || async {
//!             tokio::time::sleep(Duration::from_millis(10)).await;
//!             (Some(Source::stream(Cursor::new(vec![42u8; 1024]))), None)
//!         })
//!     })
//!     .collect();
//!
//! for rx in receivers {
//!     let outcome = rx.await.unwrap();
//!     assert!(outcome.shared);
//!     let mut reader = outcome.reader.unwrap();
//!     let mut data = Vec::new();
//!     reader.read_to_end(&mut data).await.unwrap();
//!     assert_eq!(data, vec![42u8; 1024]);
//! }
//! # });
//! ```
//!
//! # Fan-out strategies
//!
//! Two strategies turn the one source into per-consumer readers:
//!
//! - **Pipe tee** (always available): a copier task reads the source once
//!   and delivers every chunk into one bounded conduit per consumer. All
//!   consumers observe the same byte sequence; a consumer that closes early
//!   stops receiving without disturbing the rest; a slow consumer can hold
//!   the copier back by at most its conduit's depth.
//! - **Shared seek** (groups built with [`Group::with_seekers`], sources
//!   wrapped with [`Source::seekable`]): every consumer gets an independent
//!   seekable view over the one source, serialized by a mutex, each view
//!   keeping its own position. No bytes are duplicated; consumers can read
//!   disjoint ranges.
//!
//! ```
//! use std::io::{Cursor, SeekFrom};
//! use stream_singleflight::{Group, Source};
//! use tokio::io::{AsyncReadExt, AsyncSeekExt};
//!
//! # tokio_test::block_on(async {
//! let group = Group::with_seekers();
//! let outcome = group
//!     .execute("ranged-object", || async {
//!         let body = (0..=255u8).collect::<Vec<u8>>();
//!         (Some(Source::seekable(Cursor::new(body))), None)
//!     })
//!     .await;
//!
//! let mut reader = outcome.reader.unwrap();
//! assert!(reader.is_seekable());
//! reader.seek(SeekFrom::Start(200)).await.unwrap();
//! let mut tail = Vec::new();
//! reader.read_to_end(&mut tail).await.unwrap();
//! assert_eq!(tail.len(), 56);
//! # });
//! ```
//!
//! # Behavior
//!
//! - The work closure runs at most once per call, on a background task, and
//!   may resolve to a source, an error, both, or neither; whatever it
//!   resolves to is delivered to every waiter of the call ([`WorkResult`]).
//! - [`Outcome::shared`] reports whether the call served more than one
//!   waiter; every waiter of a call sees the same value.
//! - The source is owned by the fan-out from the moment the closure returns
//!   and is closed (dropped) exactly once, after the copier finishes or the
//!   last consumer releases its handle. Work closures must not retain it.
//! - Nothing is cached: as soon as a call completes and its waiters have
//!   been handed their readers, the key is forgotten.
//!
//! # Thread safety
//!
//! [`Group`] is `Send + Sync`; share it behind an [`Arc`](std::sync::Arc)
//! and call it from any task. Readers are `Send` and independently owned.
//!
//! # Performance considerations
//!
//! - Pipe-tee chunks are reference-counted ([`bytes::Bytes`]); fanning out
//!   to N consumers costs N refcount bumps per chunk, not N copies.
//! - The shared-seek fan-out re-seeks the source before every read, so it
//!   shines when consumers read large contiguous ranges and the source's
//!   seeks are cheap.
//! - Every consumer of a seekable call contends on one mutex; prefer the
//!   pipe tee when all consumers read the whole stream anyway.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
mod group;
mod reader;
mod seek;
mod source;
#[cfg(feature = "stats")]
mod stats;
mod tee;
#[cfg(test)]
mod test_util;

pub use error::HandleError;
pub use group::{Group, Outcome, WorkError, WorkResult};
pub use reader::SharedReader;
pub use source::{BoxedSeekableStream, BoxedStream, SeekableStream, Source};
#[cfg(feature = "stats")]
#[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
pub use stats::Stats;
