//! Per-request channel: event FIFO plus response slot table.
//!
//! # Structure
//!
//! ```text
//!  send()                                   consume()
//!    │ register(call_id) ──► SlotTable ◄── claim(call_id)
//!    │                       (Mutex)            ▲
//!    │ enqueue(envelope) ──► FIFO (mpsc) ──► next_envelope()
//!    ▼                                          │
//!  oneshot::Receiver ◄──────── oneshot::Sender ─┘
//! ```
//!
//! The slot table and the FIFO are synchronized independently: producers
//! registering slots never wait behind a consumer parked on an empty
//! queue.

use super::BrokerError;
use parking_lot::Mutex;
use rendezvous_types::{CallId, RequestId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

/// Outcome delivered into a response slot.
pub(crate) type SlotResult<R> = Result<R, BrokerError>;

/// Item stored in the FIFO.
#[derive(Debug)]
pub(crate) struct Envelope<E> {
    pub call_id: CallId,
    pub event: E,
}

/// State of one registered response slot.
enum Slot<R> {
    /// A producer is waiting on the receiving half.
    Waiting(oneshot::Sender<SlotResult<R>>),
    /// The producer gave up; the response must be discarded.
    Abandoned,
}

/// What a consumer found when claiming the slot of a processed envelope.
pub(crate) enum Claim<R> {
    Waiting(oneshot::Sender<SlotResult<R>>),
    Abandoned,
    /// The channel was closed while the envelope was being handled.
    Closed,
    Missing,
}

struct SlotTable<R> {
    slots: HashMap<CallId, Slot<R>>,
    consumers: usize,
    closed: bool,
    last_activity: Instant,
}

impl<R> SlotTable<R> {
    fn has_waiting(&self) -> bool {
        self.slots.values().any(|slot| matches!(slot, Slot::Waiting(_)))
    }
}

/// Snapshot of a request channel's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Events pushed but not yet processed by a consumer.
    pub queued: u64,
    /// Producers currently waiting for a response.
    pub in_flight: usize,
    /// Slots whose producer timed out or was cancelled.
    pub abandoned: usize,
    /// Events fully processed by consumers.
    pub processed: u64,
    /// Consumers currently attached.
    pub consumers: usize,
    /// Time since the last registration or delivery.
    pub idle_for: Duration,
}

/// FIFO and slot table for one [`RequestId`].
pub(crate) struct RequestChannel<E, R> {
    request_id: RequestId,
    queue_tx: mpsc::UnboundedSender<Envelope<E>>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope<E>>>,
    table: Mutex<SlotTable<R>>,
    closed_tx: watch::Sender<bool>,
    enqueued: AtomicU64,
    processed: AtomicU64,
}

impl<E, R> RequestChannel<E, R> {
    pub fn new(request_id: RequestId) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);
        Self {
            request_id,
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            table: Mutex::new(SlotTable {
                slots: HashMap::new(),
                consumers: 0,
                closed: false,
                last_activity: Instant::now(),
            }),
            closed_tx,
            enqueued: AtomicU64::new(0),
            processed: AtomicU64::new(0),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Registers a response slot for `call_id`.
    ///
    /// Must happen before the matching envelope is enqueued.
    pub fn register(
        &self,
        call_id: CallId,
    ) -> Result<oneshot::Receiver<SlotResult<R>>, BrokerError> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(BrokerError::Closed(self.request_id.clone()));
        }
        let (tx, rx) = oneshot::channel();
        table.slots.insert(call_id, Slot::Waiting(tx));
        table.last_activity = Instant::now();
        Ok(rx)
    }

    /// Pushes an envelope onto the FIFO.
    pub fn enqueue(&self, envelope: Envelope<E>) -> Result<(), BrokerError> {
        // Count first so `queued` never underflows when a consumer wins the race.
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        if self.queue_tx.send(envelope).is_err() {
            self.enqueued.fetch_sub(1, Ordering::SeqCst);
            return Err(BrokerError::Closed(self.request_id.clone()));
        }
        Ok(())
    }

    /// Waits for the next envelope.
    ///
    /// Cancel safe: dropping the future never loses an envelope.
    pub async fn next_envelope(&self) -> Option<Envelope<E>> {
        let mut rx = self.queue_rx.lock().await;
        rx.recv().await
    }

    /// Removes the slot for `call_id` so its response can be delivered.
    pub fn claim(&self, call_id: CallId) -> Claim<R> {
        let mut table = self.table.lock();
        if table.closed {
            return Claim::Closed;
        }
        table.last_activity = Instant::now();
        match table.slots.remove(&call_id) {
            Some(Slot::Waiting(tx)) => Claim::Waiting(tx),
            Some(Slot::Abandoned) => Claim::Abandoned,
            None => Claim::Missing,
        }
    }

    /// Marks a still-registered slot as abandoned.
    ///
    /// No-op when the slot was already claimed.
    pub fn abandon(&self, call_id: CallId) {
        let mut table = self.table.lock();
        if let Some(slot) = table.slots.get_mut(&call_id) {
            if matches!(slot, Slot::Waiting(_)) {
                *slot = Slot::Abandoned;
                table.last_activity = Instant::now();
            }
        }
    }

    /// Records an attached consumer. Returns false if the channel is closed.
    pub fn attach_consumer(&self) -> bool {
        let mut table = self.table.lock();
        if table.closed {
            return false;
        }
        table.consumers += 1;
        true
    }

    pub fn detach_consumer(&self) {
        let mut table = self.table.lock();
        table.consumers = table.consumers.saturating_sub(1);
        table.last_activity = Instant::now();
    }

    /// Records that a consumer finished one envelope.
    pub fn mark_processed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    /// Closes the channel, failing every waiting producer.
    ///
    /// Returns the number of producers failed. Idempotent.
    pub fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut table = self.table.lock();
            if table.closed {
                return 0;
            }
            table.closed = true;
            table.slots.drain().collect()
        };

        let mut failed = 0;
        for (_, slot) in drained {
            if let Slot::Waiting(tx) = slot {
                if tx.send(Err(BrokerError::Closed(self.request_id.clone()))).is_ok() {
                    failed += 1;
                }
            }
        }
        self.closed_tx.send_replace(true);
        self.drain_queue();
        failed
    }

    /// Returns a receiver that observes the closed flag.
    pub fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// Closes the channel if no consumer is attached, no producer is
    /// waiting and there was no activity for at least `max_idle`.
    ///
    /// Abandoned slots and the queued events of abandoned calls do not keep
    /// the channel alive; they are discarded. Returns the number of queued
    /// events discarded, or `None` if the channel stays open.
    ///
    /// The check and the close happen under one lock, so a producer or a
    /// consumer either attaches first (and the channel stays open) or sees
    /// it closed.
    pub fn close_if_idle(&self, max_idle: Duration) -> Option<u64> {
        {
            let mut table = self.table.lock();
            if table.closed
                || table.consumers > 0
                || table.has_waiting()
                || table.last_activity.elapsed() < max_idle
            {
                return None;
            }
            table.closed = true;
            table.slots.clear();
        }
        self.closed_tx.send_replace(true);
        Some(self.drain_queue())
    }

    /// Drops every queued envelope. Skipped while a consumer holds the queue.
    fn drain_queue(&self) -> u64 {
        let Ok(mut rx) = self.queue_rx.try_lock() else {
            return 0;
        };
        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        self.enqueued.fetch_sub(drained, Ordering::SeqCst);
        drained
    }

    fn queued(&self) -> u64 {
        self.enqueued
            .load(Ordering::SeqCst)
            .saturating_sub(self.processed.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> ChannelStats {
        let table = self.table.lock();
        let abandoned = table
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Abandoned))
            .count();
        ChannelStats {
            queued: self.queued(),
            in_flight: table.slots.len() - abandoned,
            abandoned,
            processed: self.processed.load(Ordering::SeqCst),
            consumers: table.consumers,
            idle_for: table.last_activity.elapsed(),
        }
    }
}
