//! The deduplication coordinator.
//!
//! A [`Group`] keeps one entry per in-flight key. The first caller for a key
//! starts the work closure on a background task; callers arriving while it
//! runs attach to the same entry. The waiter set freezes the moment the
//! closure returns: the entry is removed from the map (so later arrivals
//! start fresh work), the fan-out is built pre-sized to the frozen count,
//! and every waiter is handed its own reader over a oneshot channel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::reader::SharedReader;
use crate::seek::{SeekReader, SharedSeekSource};
use crate::source::Source;
use crate::tee;

/// Error produced by a work closure.
///
/// Reference-counted so the one error a closure returned can be delivered
/// identically to every waiter of the call.
pub type WorkError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// What a work closure resolves to: an optional byte source and an optional
/// error.
///
/// All four combinations are legal. In particular `(Some, Some)` is
/// deliberate: some producers report a soft error while still returning
/// partial content, and the stream is delivered to every waiter alongside
/// the error.
pub type WorkResult = (Option<Source>, Option<WorkError>);

/// The value every waiter of a call receives.
pub struct Outcome {
    /// This waiter's independent reader, when the work closure produced a
    /// source.
    pub reader: Option<SharedReader>,
    /// The work closure's error, identical for every waiter of the call.
    pub err: Option<WorkError>,
    /// Whether the call served more than one waiter. The same value is
    /// reported to all of them.
    pub shared: bool,
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outcome")
            .field("reader", &self.reader)
            .field("err", &self.err.as_ref().map(|err| err.to_string()))
            .field("shared", &self.shared)
            .finish()
    }
}

type Waiters = Vec<oneshot::Sender<Outcome>>;

struct Call {
    waiters: Waiters,
}

#[derive(Default)]
struct GroupCore {
    calls: Mutex<HashMap<String, Call>>,
    #[cfg(feature = "stats")]
    stats: crate::stats::Stats,
}

/// A process-local single-flight coordinator for byte streams.
///
/// Whether seek-capable sources are served through the shared-seek fan-out
/// is fixed at construction: [`Group::new`] pipes every source,
/// [`Group::with_seekers`] gives each consumer of a seekable source an
/// independent seekable view. See the crate-level documentation for the
/// full semantics.
#[derive(Default)]
pub struct Group {
    use_seekers: bool,
    core: Arc<GroupCore>,
}

impl Group {
    /// Creates a group that serves every source through the pipe-tee
    /// fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a group that serves seek-capable sources through the
    /// shared-seek fan-out. Forward-only sources still go through the pipe
    /// tee, and their handles report not-seekable.
    pub fn with_seekers() -> Self {
        Self {
            use_seekers: true,
            core: Arc::default(),
        }
    }

    /// Returns a handle to this group's deduplication counters.
    #[cfg(feature = "stats")]
    #[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
    pub fn stats(&self) -> crate::stats::Stats {
        self.core.stats.clone()
    }

    /// Requests the stream for `key`, starting `work` only if no call for
    /// that key is in flight, and waits for the result.
    ///
    /// Must be called within a Tokio runtime; the work closure runs on a
    /// spawned task so the result materializes even if this caller is
    /// cancelled.
    ///
    /// # Panics
    ///
    /// Panics if the work closure panicked, after unblocking every other
    /// waiter of the call.
    pub async fn execute<F, Fut>(&self, key: impl Into<String>, work: F) -> Outcome
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        self.dispatch(key, work)
            .await
            .expect("work task terminated without delivering an outcome")
    }

    /// Non-awaiting variant of [`execute`](Group::execute): returns a
    /// receiver that yields exactly one [`Outcome`].
    ///
    /// Dropping the receiver abandons the request; the reader minted for it
    /// is closed by the coordinator so the call's fan-out still drains.
    pub fn dispatch<F, Fut>(&self, key: impl Into<String>, work: F) -> oneshot::Receiver<Outcome>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = WorkResult> + Send + 'static,
    {
        let key = key.into();
        let (tx, rx) = oneshot::channel();

        {
            let mut calls = self.core.calls.lock().expect("call map poisoned");
            if let Some(call) = calls.get_mut(&key) {
                call.waiters.push(tx);
                trace!(key = %key, waiters = call.waiters.len(), "joined in-flight call");
                #[cfg(feature = "stats")]
                self.core.stats.record_join();
                return rx;
            }
            calls.insert(key.clone(), Call { waiters: vec![tx] });
        }
        trace!(key = %key, "starting call");
        #[cfg(feature = "stats")]
        self.core.stats.record_start();

        let core = Arc::clone(&self.core);
        let use_seekers = self.use_seekers;
        tokio::spawn(async move {
            let mut entry = CallEntry::new(core, key);
            let (source, err) = work().await;
            let waiters = entry.finish();
            deliver(source, err, waiters, use_seekers);
        });
        rx
    }
}

/// In-flight map entry, removed on drop.
///
/// The drop path runs when the work closure panics: the entry disappears so
/// the key is not wedged for later callers, and the dropped waiter senders
/// surface the failure to everyone attached.
struct CallEntry {
    core: Arc<GroupCore>,
    key: Option<String>,
}

impl CallEntry {
    fn new(core: Arc<GroupCore>, key: String) -> Self {
        Self {
            core,
            key: Some(key),
        }
    }

    /// Freezes the waiter set: removes the map entry and returns the
    /// senders registered so far. Arrivals from here on start a new call.
    fn finish(&mut self) -> Waiters {
        let key = self.key.take().expect("call finished twice");
        #[cfg(feature = "stats")]
        self.core.stats.record_complete();
        let mut calls = self.core.calls.lock().expect("call map poisoned");
        calls
            .remove(&key)
            .map(|call| call.waiters)
            .unwrap_or_default()
    }
}

impl Drop for CallEntry {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut calls) = self.core.calls.lock() {
                calls.remove(&key);
            }
        }
    }
}

fn deliver(source: Option<Source>, err: Option<WorkError>, waiters: Waiters, use_seekers: bool) {
    let shared = waiters.len() > 1;
    debug!(
        waiters = waiters.len(),
        has_source = source.is_some(),
        has_err = err.is_some(),
        "call completed"
    );

    let readers: Vec<Option<SharedReader>> = match source {
        None => (0..waiters.len()).map(|_| None).collect(),
        Some(Source::Seekable(source)) if use_seekers => {
            let parent = SharedSeekSource::new(source, waiters.len());
            (0..waiters.len())
                .map(|_| Some(SharedReader::seekable(SeekReader::new(Arc::clone(&parent)))))
                .collect()
        }
        Some(Source::Seekable(source)) => piped_readers(source, waiters.len()),
        Some(Source::Stream(source)) => piped_readers(source, waiters.len()),
    };

    for (waiter, reader) in waiters.into_iter().zip(readers) {
        // A receiver that went away gets its reader dropped right here,
        // which releases the fan-out slot that was reserved for it.
        let _ = waiter.send(Outcome {
            reader,
            err: err.clone(),
            shared,
        });
    }
}

fn piped_readers<R>(source: R, consumers: usize) -> Vec<Option<SharedReader>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tee::spawn_tee(source, consumers)
        .into_iter()
        .map(|reader| Some(SharedReader::piped(reader)))
        .collect()
}
