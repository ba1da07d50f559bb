//! Idle channel eviction.

use super::{millis, Broker, BrokerInner};
use rendezvous_types::RequestId;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

impl<E, R> Broker<E, R>
where
    E: Send + 'static,
    R: Send + 'static,
{
    /// Closes and evicts every channel idle for at least `max_idle`.
    ///
    /// A channel is idle when no consumer is attached, no producer is
    /// waiting and nothing was registered, abandoned or delivered within
    /// `max_idle`. Events left behind by timed-out or cancelled sends are
    /// discarded with the channel.
    ///
    /// Returns the evicted request ids.
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<RequestId> {
        let mut evicted = Vec::new();
        self.inner.channels.write().retain(|request_id, channel| {
            match channel.close_if_idle(max_idle) {
                Some(discarded) => {
                    evicted.push((request_id.clone(), discarded));
                    false
                }
                None => true,
            }
        });

        evicted
            .into_iter()
            .map(|(request_id, discarded)| {
                debug!(broker = %self.inner.id, %request_id, discarded, "Idle channel evicted");
                request_id
            })
            .collect()
    }

    /// Starts a background task that runs [`sweep_idle`](Self::sweep_idle)
    /// every [`sweep_interval`](crate::config::BrokerConfig::sweep_interval).
    ///
    /// Returns `None` when idle eviction is disabled. The task holds only a
    /// weak reference and stops once every broker handle is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use = "dropping the handle detaches the sweeper; abort it to stop early"]
    pub fn spawn_idle_sweeper(&self) -> Option<JoinHandle<()>> {
        let max_idle = self.inner.config.idle_timeout()?;
        let period = self.inner.config.sweep_interval();
        let weak = Arc::downgrade(&self.inner);

        info!(
            broker = %self.inner.id,
            idle_timeout_ms = millis(max_idle),
            sweep_interval_ms = millis(period),
            "Idle sweeper started"
        );
        Some(tokio::spawn(run_sweeper(weak, max_idle, period)))
    }
}

async fn run_sweeper<E, R>(weak: Weak<BrokerInner<E, R>>, max_idle: Duration, period: Duration)
where
    E: Send + 'static,
    R: Send + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            debug!("Broker dropped, idle sweeper exiting");
            return;
        };
        let broker = Broker { inner };
        let evicted = broker.sweep_idle(max_idle);
        if !evicted.is_empty() {
            info!(broker = %broker.id(), count = evicted.len(), "Swept idle channels");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, HandlerError};
    use crate::config::BrokerConfig;

    type TestBroker = Broker<String, String>;

    fn rid(s: &str) -> RequestId {
        RequestId::try_new(s).unwrap()
    }

    #[test]
    fn sweep_evicts_untouched_channel() {
        let broker = TestBroker::new();
        let _ = broker.channel(&rid("a"));

        assert!(broker.sweep_idle(Duration::from_secs(60)).is_empty());
        assert_eq!(broker.sweep_idle(Duration::ZERO), vec![rid("a")]);
        assert_eq!(broker.channel_count(), 0);
    }

    #[tokio::test]
    async fn sweep_keeps_channel_with_waiting_producer() {
        let broker = TestBroker::new();
        let id = rid("busy");

        let waiting = {
            let broker = broker.clone();
            let id = id.clone();
            tokio::spawn(async move { broker.send_with_timeout(&id, "x".into(), None).await })
        };
        while broker.stats(&id).map_or(true, |s| s.in_flight == 0) {
            tokio::task::yield_now().await;
        }

        assert!(broker.sweep_idle(Duration::ZERO).is_empty());
        assert!(broker.has_channel(&id));

        broker.close(&id);
        assert!(waiting.await.unwrap().is_err());
    }

    fn spawn_echo(broker: &TestBroker, id: &RequestId) -> JoinHandle<Result<(), BrokerError>> {
        let broker = broker.clone();
        let id = id.clone();
        tokio::spawn(async move {
            broker
                .consume(&id, |e: String| -> Result<String, HandlerError> { Ok(e) })
                .await
        })
    }

    #[tokio::test]
    async fn sweep_spares_channel_with_consumer() {
        let broker = TestBroker::new();
        let id = rid("quiet");
        let consumer = spawn_echo(&broker, &id);
        while broker.stats(&id).map_or(true, |s| s.consumers == 0) {
            tokio::task::yield_now().await;
        }

        assert!(broker.sweep_idle(Duration::ZERO).is_empty());
        assert!(!consumer.is_finished());
        assert_eq!(broker.send(&id, "still here".into()).await.unwrap(), "still here");

        broker.close(&id);
        assert_eq!(consumer.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn sweep_evicts_channel_left_by_timed_out_sends() {
        let broker = TestBroker::new();
        let id = rid("forgotten");
        for _ in 0..3 {
            let err = broker
                .send_with_timeout(&id, "nobody".into(), Some(Duration::from_millis(5)))
                .await
                .unwrap_err();
            assert!(matches!(err, BrokerError::Timeout { .. }));
        }
        let stats = broker.stats(&id).unwrap();
        assert_eq!((stats.queued, stats.abandoned), (3, 3));

        assert_eq!(broker.sweep_idle(Duration::ZERO), vec![id.clone()]);
        assert!(!broker.has_channel(&id));
    }

    #[tokio::test]
    async fn detached_consumer_makes_channel_evictable() {
        let broker = TestBroker::new();
        let id = rid("left");
        let consumer = spawn_echo(&broker, &id);
        assert_eq!(broker.send(&id, "x".into()).await.unwrap(), "x");

        consumer.abort();
        let _ = consumer.await;
        assert_eq!(broker.stats(&id).unwrap().consumers, 0);
        assert_eq!(broker.sweep_idle(Duration::ZERO), vec![id]);
    }

    #[tokio::test]
    async fn sweeper_disabled_without_idle_timeout() {
        let broker = TestBroker::new();
        assert!(broker.spawn_idle_sweeper().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_keeps_consumer_attached_past_idle_timeout() {
        let broker = TestBroker::with_config(BrokerConfig {
            idle_timeout_ms: 50,
            sweep_interval_ms: 10,
            send_timeout_ms: 300,
        });
        let id = rid("session");
        let _sweeper = broker.spawn_idle_sweeper().unwrap();
        let consumer = spawn_echo(&broker, &id);

        assert_eq!(broker.send(&id, "step:1".into()).await.unwrap(), "step:1");
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!consumer.is_finished());
        assert_eq!(broker.send(&id, "step:2".into()).await.unwrap(), "step:2");
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_in_background_and_stops_with_broker() {
        let broker = TestBroker::with_config(BrokerConfig {
            idle_timeout_ms: 50,
            sweep_interval_ms: 10,
            ..BrokerConfig::default()
        });
        let _ = broker.channel(&rid("stale"));
        let handle = broker.spawn_idle_sweeper().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(broker.channel_count(), 0);

        drop(broker);
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.await.unwrap();
    }
}
