//! Outbound event queue
//!
//! Enqueue is synchronous and never blocks the caller. Ids come from a
//! monotonic ULID generator and are assigned under the same lock as the
//! send, so queue order and id order agree.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use parley_types::{DomainEvent, OutboundEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use ulid::{Generator, Ulid};

/// Sending half shared by the engine and the settlement coordinator
#[derive(Clone)]
pub struct EventOutbox {
    tx: mpsc::UnboundedSender<OutboundEvent>,
    generator: Arc<Mutex<Generator>>,
    enqueued: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

/// Receiving half, owned by the dispatcher
pub struct OutboxReceiver {
    rx: mpsc::UnboundedReceiver<OutboundEvent>,
}

/// Counters for the outbox
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxStats {
    pub enqueued: u64,
    pub dropped: u64,
}

impl EventOutbox {
    pub fn channel() -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbox = Self {
            tx,
            generator: Arc::new(Mutex::new(Generator::new())),
            enqueued: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (outbox, OutboxReceiver { rx })
    }

    /// Wrap `event` in an envelope and queue it
    pub fn enqueue(&self, event: DomainEvent) -> Ulid {
        let mut generator = self.generator.lock();
        // Overflow only happens after 2^80 ids in one millisecond
        let event_id = generator.generate().unwrap_or_else(|_| Ulid::new());
        let name = event.name();
        let session_id = event.session_id();

        match self.tx.send(OutboundEvent::new(event_id, event)) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                debug!(%event_id, %session_id, event = name, "Event enqueued");
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(%event_id, %session_id, event = name, "Outbox receiver closed, event dropped");
            }
        }
        event_id
    }

    pub fn stats(&self) -> OutboxStats {
        OutboxStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl OutboxReceiver {
    /// Wait for the next event; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<OutboundEvent> {
        self.rx.recv().await
    }

    /// Everything currently queued, without waiting
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
