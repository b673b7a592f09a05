use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::future::join_all;
use stream_singleflight::{Group, Outcome, Source};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::oneshot;

// --- Data Types and Constants ---

pub const NUM_CONSUMERS: usize = 5;

pub fn payload(len: usize) -> Vec<u8> {
    vec![0xA5; len]
}

// --- Source Generators ---

// Source A: In-Memory (Minimal Read Latency)
pub fn in_memory_source(len: usize) -> Cursor<Vec<u8>> {
    Cursor::new(payload(len))
}

// Source B: Simulated I/O (Introducing Context Switches)
pub struct SimulatedIoSource {
    data: Vec<u8>,
    pos: usize,
}

impl SimulatedIoSource {
    pub fn new(len: usize) -> Self {
        Self {
            data: payload(len),
            pos: 0,
        }
    }
}

impl AsyncRead for SimulatedIoSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.pos >= self.data.len() {
            return Poll::Ready(Ok(()));
        }

        // Simulating I/O: waking up immediately but forcing a poll loop,
        // which introduces context switching and overhead similar to real I/O
        cx.waker().wake_by_ref();

        let take = buf.remaining().min(1024).min(self.data.len() - self.pos);
        let start = self.pos;
        self.pos += take;
        buf.put_slice(&self.data[start..start + take]);
        Poll::Ready(Ok(()))
    }
}

// --- Fan-Out Runner ---

/// Dispatches `consumers` requests for one key, releases the work closure
/// once all of them are registered, and drains every reader concurrently.
/// Returns the total number of bytes observed across consumers.
pub async fn run_fan_out(group: &Group, source: Source, consumers: usize) -> usize {
    let slot = Arc::new(Mutex::new(Some(source)));
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(ready_rx)));

    let receivers: Vec<_> = (0..consumers)
        .map(|_| {
            let slot = Arc::clone(&slot);
            let gate = Arc::clone(&gate);
            group.dispatch("bench", move || async move {
                // Only the leader's closure runs; it holds the call open
                // until every consumer has attached.
                let gate = gate.lock().unwrap().take().expect("work ran twice");
                let _ = gate.await;
                (slot.lock().unwrap().take(), None)
            })
        })
        .collect();
    ready_tx.send(()).expect("leader went away");

    let totals = join_all(receivers.into_iter().map(|rx| async move {
        let outcome: Outcome = rx.await.expect("call dropped");
        let mut reader = outcome.reader.expect("expected a reader");
        let mut sink = Vec::new();
        reader.read_to_end(&mut sink).await.expect("read failed");
        sink.len()
    }))
    .await;

    totals.into_iter().sum()
}
