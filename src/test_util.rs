//! Helpers shared by the unit tests.

use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rand::RngCore;
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

/// Wraps a source and counts how many times it is dropped, to assert the
/// exactly-once closure guarantee.
pub(crate) struct DropTracked<S> {
    inner: S,
    drops: Arc<AtomicUsize>,
}

impl<S> DropTracked<S> {
    pub(crate) fn new(inner: S) -> (Self, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                drops: Arc::clone(&drops),
            },
            drops,
        )
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DropTracked<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncSeek + Unpin> AsyncSeek for DropTracked<S> {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

impl<S> Drop for DropTracked<S> {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Waits until the tracked source has been dropped exactly once.
pub(crate) async fn wait_for_drop(drops: &Arc<AtomicUsize>) {
    for _ in 0..200 {
        if drops.load(Ordering::SeqCst) == 1 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("source was not dropped");
}
