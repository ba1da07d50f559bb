//! Rendezvous Broker - synchronous calls over per-request event queues.
//!
//! A producer calls [`Broker::send`] with a [`RequestId`] and an event and
//! waits for the matching response. A consumer attached with
//! [`Broker::consume`] drains the events of that request id, computes a
//! response with its [`EventHandler`], and hands it back to the exact
//! producer call that is waiting.
//!
//! ```text
//! ┌──────────┐ send(rid, e1) ┌──────────────────────────┐
//! │ Producer │ ────────────► │ RequestChannel(rid)      │
//! └──────────┘               │  FIFO: [c1:e1, c2:e2]    │  consume(rid, h)
//! ┌──────────┐ send(rid, e2) │  slots: {c1→tx, c2→tx}   │ ◄───────────── Consumer
//! │ Producer │ ────────────► │                          │
//! └──────────┘               └──────────────────────────┘
//!      ▲  h(e1)                          │
//!      └─────────── slot c1 ◄────────────┘
//! ```
//!
//! # Pairing
//!
//! Each `send` gets a fresh [`CallId`]; its response slot is keyed by that
//! id, never by the event value, so equal payloads in flight under the same
//! request id are still answered to their own producers.
//!
//! # Lifecycle
//!
//! | From | To | Trigger |
//! |------|----|---------|
//! | absent | active | first `send` or `consume` for the id |
//! | active | closed | [`Broker::close`], [`Broker::shutdown`], idle sweep |
//!
//! A closed channel is evicted; touching the id again creates a new one.
//!
//! # Example
//!
//! ```
//! use rendezvous_runtime::broker::{Broker, HandlerError};
//! use rendezvous_types::RequestId;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let broker: Broker<String, String> = Broker::new();
//! let rid = RequestId::try_new("req-A")?;
//!
//! let consumer = broker.clone();
//! let consumer_rid = rid.clone();
//! tokio::spawn(async move {
//!     consumer
//!         .consume(&consumer_rid, |e: String| -> Result<String, HandlerError> {
//!             Ok(e.to_uppercase())
//!         })
//!         .await
//! });
//!
//! assert_eq!(broker.send(&rid, "step:1".into()).await?, "STEP:1");
//! # Ok(())
//! # }
//! ```

mod channel;
mod error;
mod handler;
mod sweeper;

pub use channel::ChannelStats;
pub use error::BrokerError;
pub use handler::{EventHandler, HandlerError};

use crate::config::BrokerConfig;
use channel::{Claim, Envelope, RequestChannel, SlotResult};
use parking_lot::{Mutex, RwLock};
use rendezvous_types::{BrokerId, CallId, RequestId};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

type ChannelDirectory<E, R> = RwLock<HashMap<RequestId, Arc<RequestChannel<E, R>>>>;

struct BrokerInner<E, R> {
    id: BrokerId,
    config: BrokerConfig,
    channels: ChannelDirectory<E, R>,
    next_call: AtomicU64,
}

/// In-process rendezvous broker.
///
/// Cheap to clone: every clone is a handle to the same set of request
/// channels. Pass a handle to each producer and consumer; independent
/// brokers never share state.
pub struct Broker<E = Value, R = Value> {
    inner: Arc<BrokerInner<E, R>>,
}

impl<E, R> Clone for Broker<E, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, R> fmt::Debug for Broker<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("id", &self.inner.id)
            .field("channels", &self.inner.channels.read().len())
            .finish_non_exhaustive()
    }
}

impl<E, R> Default for Broker<E, R>
where
    E: Send + 'static,
    R: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E, R> Broker<E, R>
where
    E: Send + 'static,
    R: Send + 'static,
{
    /// Creates a broker with [`BrokerConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Creates a broker with explicit timing configuration.
    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Self {
        let id = BrokerId::new();
        debug!(broker = %id, ?config, "Broker created");
        Self {
            inner: Arc::new(BrokerInner {
                id,
                config,
                channels: RwLock::new(HashMap::new()),
                next_call: AtomicU64::new(1),
            }),
        }
    }

    /// Returns this broker's identifier.
    #[must_use]
    pub fn id(&self) -> BrokerId {
        self.inner.id
    }

    /// Returns the timing configuration.
    #[must_use]
    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Sends `event` under `request_id` and waits for its response.
    ///
    /// The wait is bounded by [`BrokerConfig::send_timeout`]; use
    /// [`send_with_timeout`](Self::send_with_timeout) to override it.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::Timeout`] if no response arrived in time
    /// - [`BrokerError::Closed`] if the channel was closed
    /// - [`BrokerError::HandlerFailed`] if the handler failed or panicked
    /// - [`BrokerError::ResponseLost`] if the slot vanished without a value
    pub async fn send(&self, request_id: &RequestId, event: E) -> Result<R, BrokerError> {
        let timeout = self.inner.config.send_timeout();
        self.send_with_timeout(request_id, event, timeout).await
    }

    /// Sends `event` and waits at most `timeout` (`None` waits forever).
    ///
    /// Dropping the returned future abandons the call: a response produced
    /// later is discarded by the consumer.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn send_with_timeout(
        &self,
        request_id: &RequestId,
        event: E,
        timeout: Option<Duration>,
    ) -> Result<R, BrokerError> {
        let call_id = CallId::from_raw(self.inner.next_call.fetch_add(1, Ordering::Relaxed));

        // Slot first, then the event: a consumer can never dequeue an
        // envelope whose slot does not exist yet.
        let (channel, slot) = self.register(request_id, call_id)?;
        let _guard = AbandonOnDrop {
            channel: channel.as_ref(),
            call_id,
        };
        channel.enqueue(Envelope { call_id, event })?;
        debug!(broker = %self.inner.id, %request_id, %call_id, "Event enqueued");

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, slot).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(
                        broker = %self.inner.id,
                        %request_id,
                        %call_id,
                        timeout_ms = millis(limit),
                        "Send timed out"
                    );
                    return Err(BrokerError::Timeout {
                        request_id: request_id.clone(),
                        call_id,
                    });
                }
            },
            None => slot.await,
        };

        match received {
            Ok(outcome) => outcome,
            Err(_) => Err(BrokerError::ResponseLost {
                request_id: request_id.clone(),
                call_id,
            }),
        }
    }

    /// Drains the events of `request_id`, answering each with `handler`.
    ///
    /// The channel is created if no producer has touched it yet, so a
    /// consumer may start first. Runs until the channel is closed; an
    /// attached consumer keeps the channel safe from idle eviction.
    ///
    /// The handler runs inline on the consumer task. Use
    /// [`consume_blocking`](Self::consume_blocking) for handlers that block.
    ///
    /// Handler errors and panics are delivered to the waiting producer as
    /// [`BrokerError::HandlerFailed`]; the loop keeps running.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ProtocolViolation`] if an event is dequeued
    /// without a registered response slot. The loop stops in that case.
    pub async fn consume<H>(
        &self,
        request_id: &RequestId,
        mut handler: H,
    ) -> Result<(), BrokerError>
    where
        H: EventHandler<E, R>,
    {
        self.drive(request_id, |event| {
            std::future::ready(handler::invoke(&mut handler, event))
        })
        .await
    }

    /// Like [`consume`](Self::consume), but runs every handler call on
    /// Tokio's blocking pool.
    ///
    /// For handlers doing synchronous I/O or long computations; the async
    /// workers (and every producer sharing them) stay responsive.
    ///
    /// # Errors
    ///
    /// Same as [`consume`](Self::consume).
    pub async fn consume_blocking<H>(
        &self,
        request_id: &RequestId,
        handler: H,
    ) -> Result<(), BrokerError>
    where
        H: EventHandler<E, R> + 'static,
    {
        let handler = Arc::new(Mutex::new(handler));
        self.drive(request_id, |event| {
            let handler = Arc::clone(&handler);
            async move {
                tokio::task::spawn_blocking(move || handler::invoke(&mut *handler.lock(), event))
                    .await
                    .unwrap_or_else(|e| Err(HandlerError::new(format!("handler task failed: {e}"))))
            }
        })
        .await
    }

    /// Consume loop shared by [`consume`](Self::consume) and
    /// [`consume_blocking`](Self::consume_blocking).
    async fn drive<F, Fut>(&self, request_id: &RequestId, mut run: F) -> Result<(), BrokerError>
    where
        F: FnMut(E) -> Fut,
        Fut: Future<Output = Result<R, HandlerError>>,
    {
        let Some(channel) = self.attach(request_id) else {
            return Ok(());
        };
        let _attached = DetachOnDrop {
            channel: channel.as_ref(),
        };
        let mut closed = channel.subscribe_closed();
        info!(broker = %self.inner.id, %request_id, "Consumer attached");

        let result = loop {
            let envelope = tokio::select! {
                biased;

                _ = wait_closed(&mut closed) => break Ok(()),
                envelope = channel.next_envelope() => envelope,
            };
            // The channel owns a sender, so the queue only ends with the channel.
            let Some(Envelope { call_id, event }) = envelope else {
                break Ok(());
            };

            let outcome = run(event).await.map_err(|e| {
                warn!(broker = %self.inner.id, %request_id, %call_id, error = %e, "Handler failed");
                BrokerError::HandlerFailed(e.to_string())
            });

            let claim = channel.claim(call_id);
            channel.mark_processed();
            match claim {
                Claim::Waiting(tx) => {
                    if tx.send(outcome).is_err() {
                        debug!(%request_id, %call_id, "Producer went away, response dropped");
                    }
                }
                Claim::Abandoned => {
                    debug!(%request_id, %call_id, "Call abandoned, response discarded");
                }
                Claim::Closed => break Ok(()),
                Claim::Missing => {
                    error!(
                        broker = %self.inner.id,
                        %request_id,
                        %call_id,
                        "No response slot for processed event"
                    );
                    break Err(BrokerError::ProtocolViolation {
                        request_id: request_id.clone(),
                        call_id,
                    });
                }
            }
        };

        info!(broker = %self.inner.id, %request_id, "Consumer detached");
        result
    }

    /// Closes and evicts the channel for `request_id`.
    ///
    /// Waiting producers fail with [`BrokerError::Closed`] and attached
    /// consumers return. Returns the number of producers failed; closing an
    /// unknown id returns 0.
    pub fn close(&self, request_id: &RequestId) -> usize {
        let Some(channel) = self.inner.channels.write().remove(request_id) else {
            return 0;
        };
        let failed = channel.close();
        info!(broker = %self.inner.id, %request_id, failed, "Request channel closed");
        failed
    }

    /// Closes every channel. Returns the total number of producers failed.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<_> = self.inner.channels.write().drain().collect();
        let count = drained.len();
        let failed = drained.into_iter().map(|(_, ch)| ch.close()).sum();
        info!(broker = %self.inner.id, channels = count, failed, "Broker shut down");
        failed
    }

    /// Returns the number of live request channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.inner.channels.read().len()
    }

    /// Returns true if a channel exists for `request_id`.
    #[must_use]
    pub fn has_channel(&self, request_id: &RequestId) -> bool {
        self.inner.channels.read().contains_key(request_id)
    }

    /// Returns a snapshot of the counters of `request_id`'s channel.
    #[must_use]
    pub fn stats(&self, request_id: &RequestId) -> Option<ChannelStats> {
        self.inner
            .channels
            .read()
            .get(request_id)
            .map(|channel| channel.stats())
    }

    /// Fetches the channel for `request_id`, creating it on first touch.
    fn channel(&self, request_id: &RequestId) -> Arc<RequestChannel<E, R>> {
        if let Some(channel) = self.inner.channels.read().get(request_id) {
            return Arc::clone(channel);
        }

        let mut channels = self.inner.channels.write();
        let channel = channels.entry(request_id.clone()).or_insert_with(|| {
            debug!(broker = %self.inner.id, %request_id, "Request channel created");
            Arc::new(RequestChannel::new(request_id.clone()))
        });
        Arc::clone(channel)
    }

    /// Registers a response slot on the live channel for `request_id`.
    ///
    /// A channel evicted between lookup and registration is replaced by a
    /// fresh one; a closed channel still in the directory is an error.
    fn register(
        &self,
        request_id: &RequestId,
        call_id: CallId,
    ) -> Result<(Arc<RequestChannel<E, R>>, oneshot::Receiver<SlotResult<R>>), BrokerError> {
        loop {
            let channel = self.channel(request_id);
            match channel.register(call_id) {
                Ok(slot) => return Ok((channel, slot)),
                Err(e) if self.is_current(&channel) => return Err(e),
                Err(_) => {
                    debug!(%request_id, %call_id, "Channel evicted during send, retrying");
                }
            }
        }
    }

    /// Attaches a consumer to the live channel for `request_id`.
    ///
    /// Returns `None` only if the channel was closed while still listed.
    fn attach(&self, request_id: &RequestId) -> Option<Arc<RequestChannel<E, R>>> {
        loop {
            let channel = self.channel(request_id);
            if channel.attach_consumer() {
                return Some(channel);
            }
            if self.is_current(&channel) {
                return None;
            }
            debug!(%request_id, "Channel evicted during attach, retrying");
        }
    }

    fn is_current(&self, channel: &Arc<RequestChannel<E, R>>) -> bool {
        self.inner
            .channels
            .read()
            .get(channel.request_id())
            .is_some_and(|live| Arc::ptr_eq(live, channel))
    }
}

/// Marks the call's slot abandoned when `send` ends without a response.
///
/// After a delivery or a close the slot is already gone and this is a no-op.
struct AbandonOnDrop<'a, E, R> {
    channel: &'a RequestChannel<E, R>,
    call_id: CallId,
}

impl<E, R> Drop for AbandonOnDrop<'_, E, R> {
    fn drop(&mut self) {
        self.channel.abandon(self.call_id);
    }
}

/// Releases a consumer's hold on its channel when the consume loop ends.
struct DetachOnDrop<'a, E, R> {
    channel: &'a RequestChannel<E, R>,
}

impl<E, R> Drop for DetachOnDrop<'_, E, R> {
    fn drop(&mut self) {
        self.channel.detach_consumer();
    }
}

/// Whole milliseconds of `d` for log fields, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Resolves once the closed flag is set or its sender is gone.
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}
