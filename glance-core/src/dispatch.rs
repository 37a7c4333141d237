//! Bounded conduit between the capture loop and the broadcast server.
//!
//! The capture cadence must never stall waiting on network send
//! cadence: [`Dispatcher::offer`] is non-blocking and simply rejects
//! when the queue is full. The small capacity caps both memory and
//! staleness — at most `capacity` pending payloads exist at any moment.
//! Rejections are metered, not errored; the caller leaves its
//! transmitted state untouched so the same delta is retried next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::diff::UpdatePayload;

// ── DispatchStats ────────────────────────────────────────────────

/// Snapshot of dispatch activity since session start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Payloads offered to the conduit.
    pub offered: u64,
    /// Offers rejected because the conduit was full.
    pub rejected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    offered: AtomicU64,
    rejected: AtomicU64,
}

/// Cloneable handle for reading [`DispatchStats`] from outside the
/// capture loop.
#[derive(Debug, Clone)]
pub struct DispatchStatsHandle {
    counters: Arc<Counters>,
}

impl DispatchStatsHandle {
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            offered: self.counters.offered.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────

/// Producer half of the bounded conduit. Owned exclusively by the
/// capture loop; dropping it closes the conduit and ends the consumer.
#[derive(Debug)]
pub struct Dispatcher {
    tx: mpsc::Sender<UpdatePayload>,
    counters: Arc<Counters>,
}

/// Consumer half, drained by the broadcast server.
#[derive(Debug)]
pub struct DispatchReceiver {
    rx: mpsc::Receiver<UpdatePayload>,
}

impl Dispatcher {
    /// Create a conduit holding at most `capacity` pending payloads.
    pub fn new(capacity: usize) -> (Dispatcher, DispatchReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let dispatcher = Dispatcher {
            tx,
            counters: Arc::new(Counters::default()),
        };
        (dispatcher, DispatchReceiver { rx })
    }

    /// Hand off a payload without blocking.
    ///
    /// Returns `false` when the conduit is full (or the consumer is
    /// gone) — never an error, and never a stall.
    pub fn offer(&self, payload: UpdatePayload) -> bool {
        self.counters.offered.fetch_add(1, Ordering::Relaxed);
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(_) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// A cloneable handle to the offer/reject counters.
    pub fn stats_handle(&self) -> DispatchStatsHandle {
        DispatchStatsHandle {
            counters: Arc::clone(&self.counters),
        }
    }
}

impl DispatchReceiver {
    /// Receive the next payload in hand-off order, or `None` once the
    /// producer is dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<UpdatePayload> {
        self.rx.recv().await
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{EncodedFrame, ImageFormat};

    fn payload(byte: u8) -> UpdatePayload {
        UpdatePayload {
            image: Some(EncodedFrame {
                format: ImageFormat::Jpeg,
                data: vec![byte; 8],
            }),
            cursor: None,
        }
    }

    #[tokio::test]
    async fn rejects_when_full_without_blocking() {
        let (dispatcher, _rx) = Dispatcher::new(2);
        assert!(dispatcher.offer(payload(1)));
        assert!(dispatcher.offer(payload(2)));
        assert!(!dispatcher.offer(payload(3)));

        let stats = dispatcher.stats_handle().snapshot();
        assert_eq!(stats.offered, 3);
        assert_eq!(stats.rejected, 1);
    }

    #[tokio::test]
    async fn draining_frees_capacity() {
        let (dispatcher, mut rx) = Dispatcher::new(2);
        assert!(dispatcher.offer(payload(1)));
        assert!(dispatcher.offer(payload(2)));
        assert!(!dispatcher.offer(payload(3)));

        assert_eq!(rx.recv().await, Some(payload(1)));
        assert!(dispatcher.offer(payload(3)));
    }

    #[tokio::test]
    async fn preserves_hand_off_order() {
        let (dispatcher, mut rx) = Dispatcher::new(4);
        for b in 1..=4 {
            assert!(dispatcher.offer(payload(b)));
        }
        for b in 1..=4 {
            assert_eq!(rx.recv().await, Some(payload(b)));
        }
    }

    #[tokio::test]
    async fn recv_ends_when_producer_dropped() {
        let (dispatcher, mut rx) = Dispatcher::new(2);
        dispatcher.offer(payload(1));
        drop(dispatcher);
        assert_eq!(rx.recv().await, Some(payload(1)));
        assert_eq!(rx.recv().await, None);
    }
}
